// src/domain/models.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Exchange trading pair, e.g. `BTCUSDT`.
pub type Symbol = String;

/// Lifecycle of a listed coin. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinStatus {
    Pending,
    Tradable,
    Delisted,
}

impl CoinStatus {
    fn rank(self) -> u8 {
        match self {
            CoinStatus::Pending => 0,
            CoinStatus::Tradable => 1,
            CoinStatus::Delisted => 2,
        }
    }

    /// Transitions are forward-only: nothing goes back to `Pending`, and a
    /// delisted coin stays delisted.
    pub fn can_transition_to(self, next: CoinStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl fmt::Display for CoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoinStatus::Pending => write!(f, "PENDING"),
            CoinStatus::Tradable => write!(f, "TRADABLE"),
            CoinStatus::Delisted => write!(f, "DELISTED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    pub id: Uuid,
    pub symbol: Symbol,
    pub status: CoinStatus,
    pub first_seen_at: DateTime<Utc>,
    pub became_tradable_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Coin {
    /// A freshly sighted coin. It always starts out `Pending`; later statuses
    /// are reached through explicit transitions.
    pub fn sighted(symbol: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            status: CoinStatus::Pending,
            first_seen_at: at,
            became_tradable_at: None,
            updated_at: at,
        }
    }

    /// Apply a status change in place. Returns false (and leaves the coin
    /// untouched) when the transition is not allowed.
    pub fn transition(&mut self, next: CoinStatus, at: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        if next == CoinStatus::Tradable && self.became_tradable_at.is_none() {
            self.became_tradable_at = Some(at);
        }
        self.status = next;
        self.updated_at = self.updated_at.max(at);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinEventKind {
    Detected,
    StatusChanged,
}

impl fmt::Display for CoinEventKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CoinEventKind::Detected => write!(f, "DETECTED"),
            CoinEventKind::StatusChanged => write!(f, "STATUS_CHANGED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinEvent {
    pub id: Uuid,
    pub coin_id: Uuid,
    pub symbol: Symbol,
    pub kind: CoinEventKind,
    pub old_status: Option<CoinStatus>,
    pub new_status: CoinStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl CoinEvent {
    pub fn detected(coin: &Coin, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            coin_id: coin.id,
            symbol: coin.symbol.clone(),
            kind: CoinEventKind::Detected,
            old_status: None,
            new_status: coin.status,
            timestamp: at,
            metadata: HashMap::new(),
        }
    }

    pub fn status_changed(coin: &Coin, old: CoinStatus, new: CoinStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            coin_id: coin.id,
            symbol: coin.symbol.clone(),
            kind: CoinEventKind::StatusChanged,
            old_status: Some(old),
            new_status: new,
            timestamp: at,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    pub fn became_tradable(&self) -> bool {
        self.kind == CoinEventKind::StatusChanged
            && self.new_status == CoinStatus::Tradable
            && self.old_status != Some(CoinStatus::Tradable)
    }

    /// `metadata.tradeAmount`, when present, numeric and positive.
    pub fn trade_amount(&self) -> Option<Decimal> {
        let value = self.metadata.get("tradeAmount")?;
        let amount = match value {
            serde_json::Value::Number(n) => n.to_string().parse::<Decimal>().ok()?,
            serde_json::Value::String(s) => s.parse::<Decimal>().ok()?,
            _ => return None,
        };
        (amount > Decimal::ZERO).then_some(amount)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TimeInForce::Gtc => write!(f, "GTC"),
            TimeInForce::Ioc => write!(f, "IOC"),
            TimeInForce::Fok => write!(f, "FOK"),
        }
    }
}

/// Whether `quantity` counts base asset units or quote currency to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QuantityKind {
    #[default]
    Base,
    Quote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub user_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Ignored for market orders.
    pub price: Decimal,
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub quantity_kind: QuantityKind,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn market(user_id: &str, symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            user_id: user_id.to_string(),
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: Decimal::ZERO,
            time_in_force: TimeInForce::Gtc,
            quantity_kind: QuantityKind::Base,
            client_order_id: None,
        }
    }

    pub fn limit(user_id: &str, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price,
            ..Self::market(user_id, symbol, side, quantity)
        }
    }

    pub fn with_quote_quantity(mut self) -> Self {
        self.quantity_kind = QuantityKind::Quote;
        self
    }

    /// Reject requests the venue would refuse anyway.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("symbol is empty".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Err(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.price < Decimal::ZERO {
            return Err(format!("price must not be negative, got {}", self.price));
        }
        if self.order_type == OrderType::Limit && self.price.is_zero() {
            return Err("limit order requires a price".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            OrderStatus::New => write!(f, "NEW"),
            OrderStatus::PartiallyFilled => write!(f, "PARTIALLY_FILLED"),
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
            OrderStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// The gateway's view of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub exchange_order_id: String,
    pub client_order_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub price: Decimal,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exchange: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub internal_id: Uuid,
    pub exchange_order_id: String,
    pub client_order_id: String,
    pub user_id: String,
    pub symbol: Symbol,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub quantity: Decimal,
    pub executed_qty: Decimal,
    pub avg_fill_price: Decimal,
    pub price: Decimal,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub exchange: String,
}

impl Order {
    pub fn from_response(user_id: &str, response: OrderResponse) -> Self {
        Self {
            internal_id: Uuid::new_v4(),
            exchange_order_id: response.exchange_order_id,
            client_order_id: response.client_order_id,
            user_id: user_id.to_string(),
            symbol: response.symbol,
            side: response.side,
            order_type: response.order_type,
            status: response.status,
            quantity: response.quantity,
            executed_qty: response.executed_qty,
            avg_fill_price: response.avg_fill_price,
            price: response.price,
            time_in_force: response.time_in_force,
            created_at: response.created_at,
            updated_at: response.updated_at,
            exchange: response.exchange,
        }
    }

    /// Fold a fresher gateway view into this record. `updated_at` never
    /// moves backwards and a stale response does not overwrite newer state.
    pub fn apply_update(&mut self, response: &OrderResponse) {
        if response.updated_at < self.updated_at {
            return;
        }
        self.status = response.status;
        self.executed_qty = response.executed_qty;
        self.avg_fill_price = response.avg_fill_price;
        self.updated_at = response.updated_at;
    }
}

/// Records delivered by a gateway's listing channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingEvent {
    NewListing {
        symbol: Symbol,
        listed_at: DateTime<Utc>,
    },
    StatusChange {
        symbol: Symbol,
        old: CoinStatus,
        new: CoinStatus,
        at: DateTime<Utc>,
    },
}

/// One entry of a gateway's listings endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingAnnouncement {
    pub symbol: Symbol,
    pub status: CoinStatus,
    pub announced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub symbol: Symbol,
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}
