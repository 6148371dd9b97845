// src/domain/service/mod.rs
// Domain service interfaces

pub mod predicate;
pub mod retry;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::domain::context::CancelSignal;
use crate::domain::errors::{BusError, ConsumerError, ExchangeResult, ExecutionError, NotifyError};
use crate::domain::models::{CoinEvent, CoinEventKind, Order, OrderRequest};
use crate::domain::repository::ExchangeGateway;

/// Source of the latest traded price for a symbol.
#[async_trait]
pub trait PriceChecker: Send + Sync {
    async fn current_price(&self, symbol: &str) -> ExchangeResult<Decimal>;
}

/// Reads prices straight off an exchange gateway.
pub struct GatewayPriceChecker {
    gateway: Arc<dyn ExchangeGateway>,
}

impl GatewayPriceChecker {
    pub fn new(gateway: Arc<dyn ExchangeGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PriceChecker for GatewayPriceChecker {
    async fn current_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        self.gateway.latest_price(symbol).await
    }
}

/// Best-effort out-of-band alerts.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_trade(&self, order: &Order) -> Result<(), NotifyError>;

    async fn notify_failure(
        &self,
        request: &OrderRequest,
        error: &ExecutionError,
    ) -> Result<(), NotifyError>;

    async fn notify_alert(&self, level: &str, title: &str, message: &str) -> Result<(), NotifyError>;
}

/// Something that reacts to coin events delivered by the bus.
#[async_trait]
pub trait EventConsumer: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, event: CoinEvent) -> Result<(), ConsumerError>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: CoinEvent) -> Result<(), BusError>;

    /// Deliver every event of `kind` to `consumer` until `shutdown` fires.
    fn subscribe(
        &self,
        kind: CoinEventKind,
        consumer: Arc<dyn EventConsumer>,
        shutdown: CancelSignal,
    ) -> JoinHandle<()>;
}

pub type CallbackResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Invoked with the firing price once a sniper's trigger condition holds.
#[async_trait]
pub trait TriggerCallback: Send + Sync {
    async fn on_trigger(&self, symbol: &str, price: Decimal) -> CallbackResult;
}

/// Adapts a plain closure into a [`TriggerCallback`].
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> TriggerCallback for FnCallback<F>
where
    F: Fn(&str, Decimal) + Send + Sync,
{
    async fn on_trigger(&self, symbol: &str, price: Decimal) -> CallbackResult {
        (self.0)(symbol, price);
        Ok(())
    }
}
