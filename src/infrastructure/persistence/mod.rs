// src/infrastructure/persistence/mod.rs
// In-memory coin, event and order storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::domain::errors::{RepositoryError, RepositoryResult};
use crate::domain::models::{Coin, CoinEvent, CoinEventKind, CoinStatus, Order};
use crate::domain::repository::{CoinRepository, OrderRepository, Upserted};

#[derive(Default)]
struct State {
    coins: HashMap<String, Coin>,
    events: Vec<CoinEvent>,
    event_ids: HashSet<Uuid>,
    orders: HashMap<Uuid, Order>,
    orders_by_exchange_id: HashMap<String, Uuid>,
}

impl State {
    fn upsert(&mut self, coin: Coin) -> Upserted {
        if let Some(existing) = self.coins.get(&coin.symbol) {
            return Upserted {
                coin: existing.clone(),
                created: false,
            };
        }
        self.coins.insert(coin.symbol.clone(), coin.clone());
        Upserted { coin, created: true }
    }

    fn append_event(&mut self, event: &CoinEvent) {
        // Events are immutable; a replayed write is a no-op.
        if self.event_ids.insert(event.id) {
            self.events.push(event.clone());
        }
    }

    fn transition(
        &mut self,
        symbol: &str,
        expected: CoinStatus,
        new: CoinStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Coin> {
        let coin = self
            .coins
            .get_mut(symbol)
            .ok_or_else(|| RepositoryError::NotFound(format!("coin {}", symbol)))?;
        if coin.status != expected || !coin.transition(new, at) {
            return Err(RepositoryError::Conflict {
                symbol: symbol.to_string(),
                expected: expected.to_string(),
                actual: coin.status.to_string(),
            });
        }
        Ok(coin.clone())
    }
}

/// Process-local store. Every trait method runs under one lock, so the
/// combined coin-plus-event writes are atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn coins(&self) -> Vec<Coin> {
        let mut coins: Vec<Coin> = self.state().coins.values().cloned().collect();
        coins.sort_by(|a, b| a.first_seen_at.cmp(&b.first_seen_at).then(a.symbol.cmp(&b.symbol)));
        coins
    }

    /// Every stored event in write order.
    pub fn events(&self) -> Vec<CoinEvent> {
        self.state().events.clone()
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.values().cloned().collect()
    }
}

#[async_trait]
impl CoinRepository for InMemoryStore {
    async fn upsert_coin_by_symbol(&self, coin: Coin) -> RepositoryResult<Upserted> {
        Ok(self.state().upsert(coin))
    }

    async fn get_coin_by_symbol(&self, symbol: &str) -> RepositoryResult<Option<Coin>> {
        Ok(self.state().coins.get(symbol).cloned())
    }

    async fn update_coin_status(
        &self,
        symbol: &str,
        expected: CoinStatus,
        new: CoinStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Coin> {
        self.state().transition(symbol, expected, new, at)
    }

    async fn save_event(&self, event: &CoinEvent) -> RepositoryResult<()> {
        self.state().append_event(event);
        Ok(())
    }

    async fn has_event(&self, coin_id: Uuid, kind: CoinEventKind) -> RepositoryResult<bool> {
        Ok(self
            .state()
            .events
            .iter()
            .any(|e| e.coin_id == coin_id && e.kind == kind))
    }

    async fn events_for_coin(&self, coin_id: Uuid) -> RepositoryResult<Vec<CoinEvent>> {
        Ok(self
            .state()
            .events
            .iter()
            .filter(|e| e.coin_id == coin_id)
            .cloned()
            .collect())
    }

    async fn create_coin_with_event(&self, coin: Coin, event: &CoinEvent) -> RepositoryResult<Upserted> {
        let mut state = self.state();
        let upserted = state.upsert(coin);
        if upserted.created {
            state.append_event(event);
        }
        Ok(upserted)
    }

    async fn transition_with_event(
        &self,
        symbol: &str,
        expected: CoinStatus,
        event: &CoinEvent,
    ) -> RepositoryResult<Coin> {
        let mut state = self.state();
        let coin = state.transition(symbol, expected, event.new_status, event.timestamp)?;
        state.append_event(event);
        Ok(coin)
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn create_order(&self, order: &Order) -> RepositoryResult<()> {
        let mut state = self.state();
        if state.orders_by_exchange_id.contains_key(&order.exchange_order_id) {
            return Err(RepositoryError::Storage(format!(
                "order {} already stored",
                order.exchange_order_id
            )));
        }
        state
            .orders_by_exchange_id
            .insert(order.exchange_order_id.clone(), order.internal_id);
        state.orders.insert(order.internal_id, order.clone());
        Ok(())
    }

    async fn get_order_by_id(&self, internal_id: Uuid) -> RepositoryResult<Option<Order>> {
        Ok(self.state().orders.get(&internal_id).cloned())
    }

    async fn get_order_by_exchange_id(&self, exchange_order_id: &str) -> RepositoryResult<Option<Order>> {
        let state = self.state();
        Ok(state
            .orders_by_exchange_id
            .get(exchange_order_id)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn update_order(&self, order: &Order) -> RepositoryResult<()> {
        let mut state = self.state();
        match state.orders.get_mut(&order.internal_id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("order {}", order.internal_id))),
        }
    }
}
