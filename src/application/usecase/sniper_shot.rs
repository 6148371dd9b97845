// src/application/usecase/sniper_shot.rs
// One-shot conditional orders: wait for a price trigger, then submit

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

use crate::application::usecase::order_executor::{OrderExecutor, RetryBudget};
use crate::application::usecase::price_watcher::{PriceWatcher, WatchOutcome};
use crate::config::{NotYetTradableConfig, SniperConfig};
use crate::domain::context::ExecContext;
use crate::domain::errors::{ExecutionError, ExecutionResult, PersistenceWarning};
use crate::domain::models::{Order, OrderRequest, OrderResponse, OrderType};
use crate::domain::service::predicate::{apply_buffer, ComparisonOperator, PricePredicate};
use crate::domain::service::{PriceChecker, TriggerCallback};

/// When to fire, and who to tell.
#[derive(Clone)]
pub struct TriggerCondition {
    pub target_price: Decimal,
    pub operator: ComparisonOperator,
    /// Cap on the wait for the trigger, on top of the shot's time limit.
    pub max_timeout: Option<Duration>,
    /// Slippage fraction for limit orders; falls back to the configured default.
    pub price_buffer: Option<Decimal>,
    pub check_interval: Option<Duration>,
    /// Run in order, with the firing price.
    pub callbacks: Vec<Arc<dyn TriggerCallback>>,
}

impl TriggerCondition {
    pub fn new(target_price: Decimal, operator: ComparisonOperator) -> Self {
        Self {
            target_price,
            operator,
            max_timeout: None,
            price_buffer: None,
            check_interval: None,
            callbacks: Vec::new(),
        }
    }

    pub fn with_max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = Some(timeout);
        self
    }

    pub fn with_buffer(mut self, buffer: Decimal) -> Self {
        self.price_buffer = Some(buffer);
        self
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = Some(interval);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn TriggerCallback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn predicate(&self) -> PricePredicate {
        PricePredicate::new(self.target_price, self.operator)
    }
}

impl fmt::Debug for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerCondition")
            .field("target_price", &self.target_price)
            .field("operator", &self.operator)
            .field("max_timeout", &self.max_timeout)
            .field("price_buffer", &self.price_buffer)
            .field("check_interval", &self.check_interval)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SniperShotRequest {
    pub order: OrderRequest,
    /// Without a condition the order goes out immediately.
    pub condition: Option<TriggerCondition>,
    pub time_limit: Option<Duration>,
}

impl SniperShotRequest {
    pub fn immediate(order: OrderRequest) -> Self {
        Self {
            order,
            condition: None,
            time_limit: None,
        }
    }

    pub fn when(order: OrderRequest, condition: TriggerCondition) -> Self {
        Self {
            order,
            condition: Some(condition),
            time_limit: None,
        }
    }

    pub fn with_time_limit(mut self, time_limit: Duration) -> Self {
        self.time_limit = Some(time_limit);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotState {
    Armed,
    Waiting,
    Fired,
    Submitting,
    Completed,
    Failed,
    Cancelled,
}

impl ShotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ShotState::Completed | ShotState::Failed | ShotState::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SniperShotResult {
    pub success: bool,
    pub order: Option<Order>,
    pub error: Option<ExecutionError>,
    pub warning: Option<PersistenceWarning>,
    pub fired_at: Option<DateTime<Utc>>,
    pub firing_price: Option<Decimal>,
    /// Limit price actually sent, after the buffer.
    pub submitted_price: Option<Decimal>,
    pub attempts: u32,
    /// From the `fire` call until the shot finished.
    pub latency: Duration,
    pub state: ShotState,
}

impl SniperShotResult {
    fn armed() -> Self {
        Self {
            success: false,
            order: None,
            error: None,
            warning: None,
            fired_at: None,
            firing_price: None,
            submitted_price: None,
            attempts: 0,
            latency: Duration::ZERO,
            state: ShotState::Armed,
        }
    }
}

/// Serializes sniper shots: one outstanding shot per controller.
pub struct SniperShotController {
    watcher: PriceWatcher,
    executor: Arc<OrderExecutor>,
    config: SniperConfig,
    retries: NotYetTradableConfig,
    gate: Mutex<()>,
    state: std::sync::Mutex<ShotState>,
}

impl SniperShotController {
    pub fn new(
        prices: Arc<dyn PriceChecker>,
        executor: Arc<OrderExecutor>,
        config: SniperConfig,
        retries: NotYetTradableConfig,
    ) -> Self {
        Self {
            watcher: PriceWatcher::new(prices),
            executor,
            config,
            retries,
            gate: Mutex::new(()),
            state: std::sync::Mutex::new(ShotState::Armed),
        }
    }

    /// State of the current (or last) shot.
    pub fn state(&self) -> ShotState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn enter(&self, result: &mut SniperShotResult, next: ShotState) {
        log::debug!("Sniper shot {:?} -> {:?}", result.state, next);
        result.state = next;
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = next;
    }

    fn finish(
        &self,
        mut result: SniperShotResult,
        started: Instant,
        outcome: Result<(), ExecutionError>,
    ) -> SniperShotResult {
        let next = match &outcome {
            Ok(()) => ShotState::Completed,
            Err(ExecutionError::Cancelled) => ShotState::Cancelled,
            Err(_) => ShotState::Failed,
        };
        self.enter(&mut result, next);
        result.success = outcome.is_ok();
        result.error = outcome.err();
        result.latency = started.elapsed();
        result
    }

    pub async fn fire(&self, ctx: &ExecContext, request: SniperShotRequest) -> SniperShotResult {
        let started = Instant::now();
        let mut result = SniperShotResult::armed();

        let _guard = match ctx.run(self.gate.lock()).await {
            Ok(guard) => guard,
            Err(interrupt) => return self.finish(result, started, Err(interrupt.into())),
        };
        self.enter(&mut result, ShotState::Armed);

        let SniperShotRequest {
            mut order,
            condition,
            time_limit,
        } = request;

        if let Err(reason) = order.validate() {
            return self.finish(result, started, Err(ExecutionError::InvalidRequest(reason)));
        }

        let time_limit = time_limit.unwrap_or_else(|| self.config.default_timeout());
        let ctx = ctx.with_timeout(time_limit);
        log::info!(
            "Sniper armed: {} {} {} qty {} within {:?}{}",
            order.order_type,
            order.side,
            order.symbol,
            order.quantity,
            time_limit,
            condition
                .as_ref()
                .map(|c| format!(" when {}", c.predicate()))
                .unwrap_or_default()
        );

        match &condition {
            Some(condition) => {
                self.enter(&mut result, ShotState::Waiting);
                let deadline = match (ctx.deadline(), condition.max_timeout) {
                    (Some(d), Some(max)) => Some(d.min(Instant::now() + max)),
                    (d, None) => d,
                    (None, Some(max)) => Some(Instant::now() + max),
                };
                let check_interval = condition
                    .check_interval
                    .or_else(|| Some(self.config.default_check_interval()));

                let outcome = self
                    .watcher
                    .watch(&ctx, &order.symbol, check_interval, deadline, &condition.predicate())
                    .await;
                match outcome {
                    WatchOutcome::Fired(sample) => {
                        result.fired_at = Some(sample.observed_at);
                        result.firing_price = Some(sample.price);
                        self.enter(&mut result, ShotState::Fired);
                        dispatch_callbacks(&order.symbol, sample.price, &condition.callbacks);
                    }
                    WatchOutcome::Cancelled { .. } => {
                        return self.finish(result, started, Err(ExecutionError::Cancelled));
                    }
                    WatchOutcome::DeadlineExceeded { last } => {
                        let last_price = last.map(|s| s.price);
                        log::warn!(
                            "Sniper for {} expired before {} (last price {:?})",
                            order.symbol,
                            condition.predicate(),
                            last_price
                        );
                        return self.finish(
                            result,
                            started,
                            Err(ExecutionError::PredicateNeverFired { last_price }),
                        );
                    }
                }
            }
            None => {
                result.fired_at = Some(Utc::now());
                self.enter(&mut result, ShotState::Fired);
            }
        }

        let buffer = condition
            .as_ref()
            .and_then(|c| c.price_buffer)
            .unwrap_or(self.config.default_buffer);
        let reference = condition
            .as_ref()
            .map(|c| c.target_price)
            .unwrap_or(order.price);
        if let Some(adjusted) = apply_buffer(order.side, order.order_type, reference, buffer) {
            log::debug!(
                "Limit price for {} adjusted {} -> {} (buffer {})",
                order.symbol,
                order.price,
                adjusted,
                buffer
            );
            order.price = adjusted;
        }
        if order.order_type == OrderType::Limit {
            result.submitted_price = Some(order.price);
        }

        self.enter(&mut result, ShotState::Submitting);
        let budget = RetryBudget {
            max_attempts: self.retries.max_retries,
            base_delay: self.retries.retry_interval(),
            deadline: ctx.deadline(),
        };
        match self.executor.execute(&ctx, &order, &budget).await {
            Ok(outcome) => {
                result.attempts = outcome.attempts;
                result.order = Some(outcome.order);
                result.warning = outcome.warning;
                let result = self.finish(result, started, Ok(()));
                log::info!("Sniper for {} completed in {:?}", order.symbol, result.latency);
                result
            }
            Err(e) => self.finish(result, started, Err(e)),
        }
    }

    pub async fn cancel(&self, ctx: &ExecContext, symbol: &str, order_id: &str) -> ExecutionResult<()> {
        self.executor.cancel(ctx, symbol, order_id).await
    }

    pub async fn status(
        &self,
        ctx: &ExecContext,
        symbol: &str,
        order_id: &str,
    ) -> ExecutionResult<OrderResponse> {
        self.executor.status(ctx, symbol, order_id).await
    }
}

/// Runs the callbacks one after another on a detached task. Each runs in its
/// own task so an error or a panic is logged without stopping the rest.
fn dispatch_callbacks(symbol: &str, price: Decimal, callbacks: &[Arc<dyn TriggerCallback>]) {
    if callbacks.is_empty() {
        return;
    }
    let symbol = symbol.to_string();
    let callbacks = callbacks.to_vec();
    tokio::spawn(async move {
        for (index, callback) in callbacks.into_iter().enumerate() {
            let task_symbol = symbol.clone();
            let handle =
                tokio::spawn(async move { callback.on_trigger(&task_symbol, price).await });
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::warn!("Trigger callback #{} for {} failed: {}", index, symbol, e),
                Err(e) => log::error!("Trigger callback #{} for {} panicked: {}", index, symbol, e),
            }
        }
    });
}
