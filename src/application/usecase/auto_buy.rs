// src/application/usecase/auto_buy.rs
// Market-buys coins the moment they become tradable

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::application::usecase::order_executor::{OrderExecutor, RetryBudget};
use crate::config::AutoBuyConfig;
use crate::domain::context::{CancelSignal, ExecContext};
use crate::domain::errors::ConsumerError;
use crate::domain::models::{CoinEvent, CoinStatus, OrderRequest, OrderSide};
use crate::domain::service::{EventConsumer, Notifier};

/// Owner recorded on orders the reactor places.
pub const SYSTEM_USER: &str = "system";

/// Metadata flag on events for listings that predate this process.
pub const BASELINE_METADATA_KEY: &str = "baseline";

pub struct AutoBuyReactor {
    executor: Arc<OrderExecutor>,
    notifier: Arc<dyn Notifier>,
    config: AutoBuyConfig,
    shutdown: CancelSignal,
    /// Keyed by transition rather than event id: a coin enters a status at
    /// most once, so this is bounded by the number of coins.
    seen_transitions: Mutex<HashSet<(Uuid, CoinStatus)>>,
    buys: Arc<Mutex<HashMap<String, u32>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AutoBuyReactor {
    pub fn new(
        executor: Arc<OrderExecutor>,
        notifier: Arc<dyn Notifier>,
        config: AutoBuyConfig,
        shutdown: CancelSignal,
    ) -> Self {
        Self {
            executor,
            notifier,
            config,
            shutdown,
            seen_transitions: Mutex::new(HashSet::new()),
            buys: Arc::new(Mutex::new(HashMap::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Quote amount to spend: the event's `tradeAmount` when present,
    /// otherwise the default, capped at the configured maximum.
    pub fn trade_amount(&self, event: &CoinEvent) -> Decimal {
        event
            .trade_amount()
            .unwrap_or(self.config.default_amount)
            .min(self.config.max_amount)
    }

    /// Buys currently counted against `symbol`'s cap.
    pub fn buys_for(&self, symbol: &str) -> u32 {
        lock(&self.buys).get(symbol).copied().unwrap_or(0)
    }

    /// Hand over the in-flight buy tasks, e.g. to await them on shutdown.
    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        std::mem::take(&mut *lock(&self.tasks))
    }

    fn claim_slot(&self, symbol: &str) -> bool {
        let mut buys = lock(&self.buys);
        let count = buys.entry(symbol.to_string()).or_insert(0);
        if *count >= self.config.max_buys_per_symbol {
            return false;
        }
        *count += 1;
        true
    }

    fn spawn_buy(&self, event: CoinEvent) {
        let symbol = event.symbol.clone();
        let amount = self.trade_amount(&event);
        let executor = self.executor.clone();
        let notifier = self.notifier.clone();
        let buys = self.buys.clone();
        let config = self.config.clone();
        let ctx = ExecContext::new(self.shutdown.clone());

        let handle = tokio::spawn(async move {
            if ctx.sleep(config.trade_delay()).await.is_err() {
                log::info!("Auto-buy of {} abandoned during trade delay", symbol);
                release_slot(&buys, &symbol);
                return;
            }

            let request = OrderRequest::market(SYSTEM_USER, &symbol, OrderSide::Buy, amount)
                .with_quote_quantity();
            let budget = RetryBudget::within(
                config.max_attempts,
                config.retry_interval(),
                config.timeout(),
            );

            match executor.execute(&ctx, &request, &budget).await {
                Ok(outcome) => {
                    log::info!(
                        "Auto-bought {} for {} quote: order {} ({} attempt(s))",
                        symbol,
                        amount,
                        outcome.order.exchange_order_id,
                        outcome.attempts
                    );
                    if let Some(warning) = outcome.warning {
                        let alert = notifier
                            .notify_alert("warning", "Auto-buy not recorded", &warning.to_string())
                            .await;
                        if let Err(e) = alert {
                            log::warn!("Alert dropped: {}", e);
                        }
                    }
                }
                Err(e) => {
                    log::error!("Auto-buy of {} failed: {}", symbol, e);
                    release_slot(&buys, &symbol);
                }
            }
        });

        let mut tasks = lock(&self.tasks);
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn release_slot(buys: &Mutex<HashMap<String, u32>>, symbol: &str) {
    if let Some(count) = lock(buys).get_mut(symbol) {
        *count = count.saturating_sub(1);
    }
}

#[async_trait]
impl EventConsumer for AutoBuyReactor {
    fn name(&self) -> &str {
        "auto-buy"
    }

    async fn handle(&self, event: CoinEvent) -> Result<(), ConsumerError> {
        if !self.config.enabled || !event.became_tradable() {
            return Ok(());
        }
        if !lock(&self.seen_transitions).insert((event.coin_id, event.new_status)) {
            log::debug!("Ignoring redelivered transition {} for {}", event.id, event.symbol);
            return Ok(());
        }
        if event.metadata.get(BASELINE_METADATA_KEY) == Some(&serde_json::Value::Bool(true)) {
            log::debug!("{} was already listed at startup, not buying", event.symbol);
            return Ok(());
        }
        if self.config.is_blacklisted(&event.symbol) {
            log::info!("{} is blacklisted, skipping auto-buy", event.symbol);
            return Ok(());
        }
        if !self.claim_slot(&event.symbol) {
            log::info!(
                "Auto-buy cap of {} reached for {}",
                self.config.max_buys_per_symbol,
                event.symbol
            );
            return Ok(());
        }

        log::info!(
            "{} became tradable, buying {} quote in {:?}",
            event.symbol,
            self.trade_amount(&event),
            self.config.trade_delay()
        );
        self.spawn_buy(event);
        Ok(())
    }
}
