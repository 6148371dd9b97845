// src/application/usecase/price_watcher.rs
// Polls one symbol's price until a predicate holds

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::time::{Duration, Instant, MissedTickBehavior};

use crate::domain::context::{ExecContext, Interrupt};
use crate::domain::models::PriceSample;
use crate::domain::service::predicate::PricePredicate;
use crate::domain::service::PriceChecker;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Fired(PriceSample),
    DeadlineExceeded { last: Option<PriceSample> },
    Cancelled { last: Option<PriceSample> },
}

impl WatchOutcome {
    /// Price of the firing sample, or the last one seen before giving up.
    pub fn last_price(&self) -> Option<Decimal> {
        match self {
            WatchOutcome::Fired(sample) => Some(sample.price),
            WatchOutcome::DeadlineExceeded { last } | WatchOutcome::Cancelled { last } => {
                last.as_ref().map(|s| s.price)
            }
        }
    }

    fn interrupted(interrupt: Interrupt, last: Option<PriceSample>) -> Self {
        match interrupt {
            Interrupt::Cancelled => WatchOutcome::Cancelled { last },
            Interrupt::DeadlineExceeded => WatchOutcome::DeadlineExceeded { last },
        }
    }
}

pub fn effective_interval(requested: Option<Duration>) -> Duration {
    requested
        .filter(|d| !d.is_zero())
        .unwrap_or(DEFAULT_CHECK_INTERVAL)
        .max(MIN_CHECK_INTERVAL)
}

pub struct PriceWatcher {
    checker: Arc<dyn PriceChecker>,
}

impl PriceWatcher {
    pub fn new(checker: Arc<dyn PriceChecker>) -> Self {
        Self { checker }
    }

    /// Sample `symbol` every `check_interval` (first sample immediately)
    /// until `predicate` holds, `deadline` passes or `ctx` is cancelled.
    /// Price lookup failures are logged and the next tick tries again.
    pub async fn watch(
        &self,
        ctx: &ExecContext,
        symbol: &str,
        check_interval: Option<Duration>,
        deadline: Option<Instant>,
        predicate: &PricePredicate,
    ) -> WatchOutcome {
        let ctx = match deadline {
            Some(deadline) => ctx.with_deadline(deadline),
            None => ctx.clone(),
        };
        let interval = effective_interval(check_interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::debug!(
            "Watching {} every {:?} for {}",
            symbol,
            interval,
            predicate
        );

        let mut last: Option<PriceSample> = None;
        loop {
            if let Err(interrupt) = ctx.run(ticker.tick()).await {
                return WatchOutcome::interrupted(interrupt, last);
            }

            let price = match ctx.run(self.checker.current_price(symbol)).await {
                Err(interrupt) => return WatchOutcome::interrupted(interrupt, last),
                Ok(Err(e)) => {
                    log::warn!("Price check for {} failed: {}", symbol, e);
                    continue;
                }
                Ok(Ok(price)) => price,
            };

            let now = Utc::now();
            let observed_at = match &last {
                Some(previous) => now.max(previous.observed_at),
                None => now,
            };
            let sample = PriceSample {
                symbol: symbol.to_string(),
                price,
                observed_at,
            };

            if predicate.is_met(price) {
                log::info!("{} fired at {} ({})", symbol, price, predicate);
                return WatchOutcome::Fired(sample);
            }
            log::trace!("{} at {}, waiting for {}", symbol, price, predicate);
            last = Some(sample);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::CancelHandle;
    use crate::domain::errors::{ExchangeError, ExchangeResult};
    use crate::domain::service::predicate::ComparisonOperator;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays a script of prices, repeating the final entry forever.
    struct Scripted {
        script: Mutex<VecDeque<ExchangeResult<Decimal>>>,
        calls: Mutex<u32>,
    }

    impl Scripted {
        fn new(script: Vec<ExchangeResult<Decimal>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl PriceChecker for Scripted {
        async fn current_price(&self, _symbol: &str) -> ExchangeResult<Decimal> {
            *self.calls.lock().unwrap() += 1;
            let mut script = self.script.lock().unwrap();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn at_least(target: Decimal) -> PricePredicate {
        PricePredicate::new(target, ComparisonOperator::GreaterOrEqual)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_on_first_matching_sample() {
        let checker = Scripted::new(vec![Ok(dec!(49100)), Ok(dec!(49400)), Ok(dec!(49600))]);
        let watcher = PriceWatcher::new(checker.clone());
        let started = Instant::now();

        let outcome = watcher
            .watch(
                &ExecContext::background(),
                "BTCUSDT",
                Some(Duration::from_millis(100)),
                Some(Instant::now() + Duration::from_secs(10)),
                &at_least(dec!(49500)),
            )
            .await;

        match outcome {
            WatchOutcome::Fired(sample) => assert_eq!(sample.price, dec!(49600)),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(checker.calls(), 3);
        // First check is immediate, then two intervals.
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_reports_last_price() {
        let checker = Scripted::new(vec![Ok(dec!(10))]);
        let watcher = PriceWatcher::new(checker);

        let outcome = watcher
            .watch(
                &ExecContext::background(),
                "ABCUSDT",
                None,
                Some(Instant::now() + Duration::from_secs(2)),
                &at_least(dec!(11)),
            )
            .await;

        assert!(matches!(outcome, WatchOutcome::DeadlineExceeded { last: Some(_) }));
        assert_eq!(outcome.last_price(), Some(dec!(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_errors_do_not_stop_the_watch() {
        let checker = Scripted::new(vec![
            Err(ExchangeError::Connection("reset".into())),
            Err(ExchangeError::Server("502".into())),
            Ok(dec!(5)),
        ]);
        let watcher = PriceWatcher::new(checker.clone());

        let outcome = watcher
            .watch(
                &ExecContext::background(),
                "ABCUSDT",
                Some(Duration::from_millis(50)),
                None,
                &PricePredicate::new(dec!(5), ComparisonOperator::Equal),
            )
            .await;

        assert!(matches!(outcome, WatchOutcome::Fired(_)));
        assert_eq!(checker.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_the_watch() {
        let checker = Scripted::new(vec![Ok(dec!(1))]);
        let watcher = PriceWatcher::new(checker);
        let handle = CancelHandle::new();
        let ctx = handle.context();

        let task = tokio::spawn(async move {
            watcher
                .watch(&ctx, "ABCUSDT", None, None, &at_least(dec!(100)))
                .await
        });
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle.cancel();

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, WatchOutcome::Cancelled { last: Some(_) }));
        assert_eq!(outcome.last_price(), Some(dec!(1)));
    }

    #[test]
    fn interval_has_a_floor_and_a_default() {
        assert_eq!(effective_interval(None), DEFAULT_CHECK_INTERVAL);
        assert_eq!(effective_interval(Some(Duration::ZERO)), DEFAULT_CHECK_INTERVAL);
        assert_eq!(effective_interval(Some(Duration::from_millis(5))), MIN_CHECK_INTERVAL);
        assert_eq!(
            effective_interval(Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
    }
}
