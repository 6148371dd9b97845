//! Shared fakes for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use futures_util::stream::{self, BoxStream};
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::time::Instant;

use listing_sniper::config::Config;
use listing_sniper::domain::errors::{
    ExchangeError, ExchangeResult, ExecutionError, NotifyError, RepositoryError, RepositoryResult,
};
use listing_sniper::domain::models::{
    ListingAnnouncement, ListingEvent, Order, OrderRequest, OrderResponse, OrderStatus,
};
use listing_sniper::domain::repository::{ExchangeGateway, OrderRepository};
use listing_sniper::domain::service::{CallbackResult, Notifier, TriggerCallback};

/// A submitted order plus when it reached the gateway.
#[derive(Debug, Clone)]
pub struct Submission {
    pub request: OrderRequest,
    pub at: Instant,
}

/// Scriptable exchange gateway.
///
/// Prices replay in order and the last one repeats. Submissions consume the
/// failure script first and succeed once it is empty.
pub struct MockGateway {
    prices: Mutex<VecDeque<ExchangeResult<Decimal>>>,
    price_calls: Mutex<u32>,
    submit_failures: Mutex<VecDeque<ExchangeError>>,
    submissions: Mutex<Vec<Submission>>,
    cancel_failures: Mutex<VecDeque<ExchangeError>>,
    cancel_calls: Mutex<u32>,
    status_failures: Mutex<VecDeque<ExchangeError>>,
    status_calls: Mutex<u32>,
    listing_rx: Mutex<Option<mpsc::UnboundedReceiver<ListingEvent>>>,
    listing_tx: mpsc::UnboundedSender<ListingEvent>,
    listings: Mutex<Option<Vec<ListingAnnouncement>>>,
    status: Mutex<Option<OrderResponse>>,
    next_id: Mutex<u64>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        let (listing_tx, listing_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            prices: Mutex::new(VecDeque::new()),
            price_calls: Mutex::new(0),
            submit_failures: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            cancel_failures: Mutex::new(VecDeque::new()),
            cancel_calls: Mutex::new(0),
            status_failures: Mutex::new(VecDeque::new()),
            status_calls: Mutex::new(0),
            listing_rx: Mutex::new(Some(listing_rx)),
            listing_tx,
            listings: Mutex::new(None),
            status: Mutex::new(None),
            next_id: Mutex::new(1000),
        })
    }

    pub fn with_prices(self: Arc<Self>, prices: &[Decimal]) -> Arc<Self> {
        *self.prices.lock().unwrap() = prices.iter().map(|p| Ok(*p)).collect();
        self
    }

    pub fn fail_submissions(&self, errors: Vec<ExchangeError>) {
        self.submit_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_cancels(&self, errors: Vec<ExchangeError>) {
        self.cancel_failures.lock().unwrap().extend(errors);
    }

    pub fn fail_status_checks(&self, errors: Vec<ExchangeError>) {
        self.status_failures.lock().unwrap().extend(errors);
    }

    pub fn cancel_calls(&self) -> u32 {
        *self.cancel_calls.lock().unwrap()
    }

    pub fn status_calls(&self) -> u32 {
        *self.status_calls.lock().unwrap()
    }

    pub fn set_listings(&self, listings: Vec<ListingAnnouncement>) {
        *self.listings.lock().unwrap() = Some(listings);
    }

    pub fn set_status(&self, response: OrderResponse) {
        *self.status.lock().unwrap() = Some(response);
    }

    pub fn push_listing(&self, event: ListingEvent) {
        self.listing_tx.send(event).unwrap();
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn price_calls(&self) -> u32 {
        *self.price_calls.lock().unwrap()
    }
}

pub fn response_for(request: &OrderRequest, exchange_order_id: &str) -> OrderResponse {
    let now = Utc::now();
    OrderResponse {
        exchange_order_id: exchange_order_id.to_string(),
        client_order_id: format!("client-{}", exchange_order_id),
        symbol: request.symbol.clone(),
        side: request.side,
        order_type: request.order_type,
        status: OrderStatus::New,
        quantity: request.quantity,
        executed_qty: Decimal::ZERO,
        avg_fill_price: Decimal::ZERO,
        price: request.price,
        time_in_force: request.time_in_force,
        created_at: now,
        updated_at: now,
        exchange: "mock".to_string(),
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    fn name(&self) -> &str {
        "mock"
    }

    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse> {
        self.submissions.lock().unwrap().push(Submission {
            request: request.clone(),
            at: Instant::now(),
        });
        if let Some(error) = self.submit_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            *next
        };
        Ok(response_for(request, &id.to_string()))
    }

    async fn cancel_order(&self, _symbol: &str, _order_id: &str) -> ExchangeResult<()> {
        *self.cancel_calls.lock().unwrap() += 1;
        match self.cancel_failures.lock().unwrap().pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn order_status(&self, _symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse> {
        *self.status_calls.lock().unwrap() += 1;
        if let Some(error) = self.status_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExchangeError::Order(format!("unknown order {}", order_id)))
    }

    async fn latest_price(&self, symbol: &str) -> ExchangeResult<Decimal> {
        *self.price_calls.lock().unwrap() += 1;
        let mut prices = self.prices.lock().unwrap();
        match prices.len() {
            0 => Err(ExchangeError::InvalidSymbol(symbol.to_string())),
            1 => prices[0].clone(),
            _ => prices.pop_front().unwrap(),
        }
    }

    async fn listing_events(&self) -> ExchangeResult<BoxStream<'static, ListingEvent>> {
        let rx = self
            .listing_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ExchangeError::Connection("listing channel already taken".into()))?;
        let events = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        });
        Ok(Box::pin(events))
    }

    async fn list_listings(&self) -> ExchangeResult<Vec<ListingAnnouncement>> {
        self.listings
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ExchangeError::Unsupported("mock has no listings endpoint".into()))
    }
}

/// Order repository whose writes always fail.
pub struct FailingOrderRepository;

#[async_trait]
impl OrderRepository for FailingOrderRepository {
    async fn create_order(&self, _order: &Order) -> RepositoryResult<()> {
        Err(RepositoryError::Storage("disk full".into()))
    }

    async fn get_order_by_id(&self, _internal_id: uuid::Uuid) -> RepositoryResult<Option<Order>> {
        Ok(None)
    }

    async fn get_order_by_exchange_id(&self, _id: &str) -> RepositoryResult<Option<Order>> {
        Ok(None)
    }

    async fn update_order(&self, _order: &Order) -> RepositoryResult<()> {
        Err(RepositoryError::Storage("disk full".into()))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub trades: Mutex<Vec<Order>>,
    pub failures: Mutex<Vec<ExecutionError>>,
    pub alerts: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_trade(&self, order: &Order) -> Result<(), NotifyError> {
        self.trades.lock().unwrap().push(order.clone());
        // Delivery failures must never reach the caller.
        Err(NotifyError::Unavailable("webhook down".into()))
    }

    async fn notify_failure(
        &self,
        _request: &OrderRequest,
        error: &ExecutionError,
    ) -> Result<(), NotifyError> {
        self.failures.lock().unwrap().push(error.clone());
        Ok(())
    }

    async fn notify_alert(&self, _level: &str, title: &str, _message: &str) -> Result<(), NotifyError> {
        self.alerts.lock().unwrap().push(title.to_string());
        Ok(())
    }
}

/// Records every firing price it is handed.
#[derive(Default)]
pub struct RecordingCallback {
    pub calls: Mutex<Vec<(String, Decimal)>>,
}

impl RecordingCallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(String, Decimal)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TriggerCallback for RecordingCallback {
    async fn on_trigger(&self, symbol: &str, price: Decimal) -> CallbackResult {
        self.calls.lock().unwrap().push((symbol.to_string(), price));
        Ok(())
    }
}

/// A configuration with credentials filled in and every source off.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.exchange.api_key = "test-key".to_string();
    config.exchange.api_secret = "test-secret".to_string();
    config.detector.websocket_enabled = false;
    config.detector.poll_interval_secs = None;
    config
}

/// Let spawned tasks run until `done` holds, advancing paused time in small steps.
pub async fn wait_until<F: Fn() -> bool>(done: F) {
    for _ in 0..10_000 {
        if done() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
