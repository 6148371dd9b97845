// src/domain/repository/mod.rs
// Repository interfaces for domain entities

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::errors::{ExchangeError, ExchangeResult, RepositoryResult};
use crate::domain::models::{
    Coin, CoinEvent, CoinEventKind, CoinStatus, ListingAnnouncement, ListingEvent, Order,
    OrderRequest, OrderResponse,
};

/// Interface to a remote exchange
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn submit_order(&self, request: &OrderRequest) -> ExchangeResult<OrderResponse>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> ExchangeResult<()>;

    async fn order_status(&self, symbol: &str, order_id: &str) -> ExchangeResult<OrderResponse>;

    async fn latest_price(&self, symbol: &str) -> ExchangeResult<Decimal>;

    /// Push channel of new listings and symbol status changes, in venue order.
    async fn listing_events(&self) -> ExchangeResult<BoxStream<'static, ListingEvent>>;

    /// Listings endpoint, for venues that have one.
    async fn list_listings(&self) -> ExchangeResult<Vec<ListingAnnouncement>> {
        Err(ExchangeError::Unsupported(format!(
            "{} has no listings endpoint",
            self.name()
        )))
    }
}

/// Outcome of an upsert keyed by symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Upserted {
    pub coin: Coin,
    pub created: bool,
}

/// Persistent store of coins and their event history
#[async_trait]
pub trait CoinRepository: Send + Sync {
    /// Insert `coin` unless its symbol is already known; return the stored row.
    async fn upsert_coin_by_symbol(&self, coin: Coin) -> RepositoryResult<Upserted>;

    async fn get_coin_by_symbol(&self, symbol: &str) -> RepositoryResult<Option<Coin>>;

    /// Move `symbol` from `expected` to `new`. Fails with `Conflict` when the
    /// stored status is not `expected`.
    async fn update_coin_status(
        &self,
        symbol: &str,
        expected: CoinStatus,
        new: CoinStatus,
        at: chrono::DateTime<chrono::Utc>,
    ) -> RepositoryResult<Coin>;

    async fn save_event(&self, event: &CoinEvent) -> RepositoryResult<()>;

    async fn has_event(&self, coin_id: Uuid, kind: CoinEventKind) -> RepositoryResult<bool>;

    async fn events_for_coin(&self, coin_id: Uuid) -> RepositoryResult<Vec<CoinEvent>>;

    /// Create the coin and its `Detected` event together. Stores without
    /// transactions write the event last.
    async fn create_coin_with_event(
        &self,
        coin: Coin,
        event: &CoinEvent,
    ) -> RepositoryResult<Upserted> {
        let upserted = self.upsert_coin_by_symbol(coin).await?;
        if upserted.created {
            self.save_event(event).await?;
        }
        Ok(upserted)
    }

    /// Conditional status update plus its `StatusChanged` event, event last.
    async fn transition_with_event(
        &self,
        symbol: &str,
        expected: CoinStatus,
        event: &CoinEvent,
    ) -> RepositoryResult<Coin> {
        let coin = self
            .update_coin_status(symbol, expected, event.new_status, event.timestamp)
            .await?;
        self.save_event(event).await?;
        Ok(coin)
    }
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create_order(&self, order: &Order) -> RepositoryResult<()>;

    async fn get_order_by_id(&self, internal_id: Uuid) -> RepositoryResult<Option<Order>>;

    async fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> RepositoryResult<Option<Order>>;

    async fn update_order(&self, order: &Order) -> RepositoryResult<()>;
}
