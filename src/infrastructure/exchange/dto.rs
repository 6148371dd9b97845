// src/infrastructure/exchange/dto.rs
// Binance REST payloads and their mapping onto domain types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::errors::ExchangeError;
use crate::domain::models::{
    CoinStatus, ListingAnnouncement, OrderResponse, OrderSide, OrderStatus, OrderType, TimeInForce,
};

/// Response from POST /api/v3/order and GET /api/v3/order.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderPayload {
    pub symbol: String,
    #[serde(rename = "orderId")]
    pub order_id: u64,
    #[serde(rename = "clientOrderId")]
    pub client_order_id: String,
    #[serde(rename = "transactTime", default)]
    pub transact_time: Option<i64>,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(rename = "updateTime", default)]
    pub update_time: Option<i64>,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
    #[serde(rename = "origQty", deserialize_with = "deserialize_decimal_from_str")]
    pub orig_qty: Decimal,
    #[serde(rename = "executedQty", deserialize_with = "deserialize_decimal_from_str")]
    pub executed_qty: Decimal,
    #[serde(
        rename = "cummulativeQuoteQty",
        deserialize_with = "deserialize_decimal_from_str"
    )]
    pub cummulative_quote_qty: Decimal,
    pub status: String,
    #[serde(rename = "timeInForce")]
    pub time_in_force: String,
    #[serde(rename = "type")]
    pub order_type: String,
    pub side: String,
}

impl OrderPayload {
    pub fn into_response(self, exchange: &str) -> Result<OrderResponse, ExchangeError> {
        let created_ms = self.transact_time.or(self.time).unwrap_or_default();
        let updated_ms = self.update_time.or(self.transact_time).unwrap_or(created_ms);
        let created_at = parse_millis(created_ms)?;
        let updated_at = parse_millis(updated_ms)?.max(created_at);

        let avg_fill_price = if self.executed_qty > Decimal::ZERO {
            (self.cummulative_quote_qty / self.executed_qty).normalize()
        } else {
            Decimal::ZERO
        };

        Ok(OrderResponse {
            exchange_order_id: self.order_id.to_string(),
            client_order_id: self.client_order_id,
            symbol: self.symbol,
            side: parse_side(&self.side)?,
            order_type: parse_order_type(&self.order_type)?,
            status: parse_order_status(&self.status)?,
            quantity: self.orig_qty,
            executed_qty: self.executed_qty,
            avg_fill_price,
            price: self.price,
            time_in_force: parse_time_in_force(&self.time_in_force),
            created_at,
            updated_at,
            exchange: exchange.to_string(),
        })
    }
}

/// Response from GET /api/v3/ticker/price?symbol=...
#[derive(Debug, Clone, Deserialize)]
pub struct TickerPricePayload {
    pub symbol: String,
    #[serde(deserialize_with = "deserialize_decimal_from_str")]
    pub price: Decimal,
}

/// The slice of GET /api/v3/exchangeInfo we care about.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfoPayload {
    #[serde(rename = "serverTime", default)]
    pub server_time: Option<i64>,
    pub symbols: Vec<SymbolPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SymbolPayload {
    pub symbol: String,
    pub status: String,
}

impl ExchangeInfoPayload {
    /// Symbols whose venue status maps onto a coin status. Post-trading,
    /// end-of-day and halted symbols say nothing about listing and are skipped.
    pub fn into_announcements(self) -> Vec<ListingAnnouncement> {
        let announced_at = self
            .server_time
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        self.symbols
            .into_iter()
            .filter_map(|s| {
                symbol_status(&s.status).map(|status| ListingAnnouncement {
                    symbol: s.symbol,
                    status,
                    announced_at,
                })
            })
            .collect()
    }
}

/// Binance lists upcoming symbols in `BREAK` until trading opens, so it counts
/// as pending. A tradable coin that goes back into `BREAK` is a halt, which
/// the forward-only status rules already ignore.
pub fn symbol_status(status: &str) -> Option<CoinStatus> {
    match status {
        "TRADING" => Some(CoinStatus::Tradable),
        "PRE_TRADING" | "AUCTION_MATCH" | "BREAK" => Some(CoinStatus::Pending),
        _ => None,
    }
}

fn parse_millis(ms: i64) -> Result<DateTime<Utc>, ExchangeError> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| ExchangeError::Api(format!("Invalid timestamp: {}", ms)))
}

fn parse_side(side: &str) -> Result<OrderSide, ExchangeError> {
    match side {
        "BUY" => Ok(OrderSide::Buy),
        "SELL" => Ok(OrderSide::Sell),
        other => Err(ExchangeError::Api(format!("Unknown order side: {}", other))),
    }
}

fn parse_order_type(order_type: &str) -> Result<OrderType, ExchangeError> {
    match order_type {
        "MARKET" => Ok(OrderType::Market),
        "LIMIT" | "LIMIT_MAKER" => Ok(OrderType::Limit),
        other => Err(ExchangeError::Api(format!("Unsupported order type: {}", other))),
    }
}

fn parse_order_status(status: &str) -> Result<OrderStatus, ExchangeError> {
    match status {
        "NEW" | "PENDING_NEW" => Ok(OrderStatus::New),
        "PARTIALLY_FILLED" => Ok(OrderStatus::PartiallyFilled),
        "FILLED" => Ok(OrderStatus::Filled),
        "CANCELED" | "PENDING_CANCEL" => Ok(OrderStatus::Cancelled),
        "REJECTED" => Ok(OrderStatus::Rejected),
        "EXPIRED" | "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => Err(ExchangeError::Api(format!("Unknown order status: {}", other))),
    }
}

fn parse_time_in_force(tif: &str) -> TimeInForce {
    match tif {
        "IOC" => TimeInForce::Ioc,
        "FOK" => TimeInForce::Fok,
        _ => TimeInForce::Gtc,
    }
}

/// Deserialize a Decimal from a string.
fn deserialize_decimal_from_str<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(deserializer)?;
    s.parse::<Decimal>().map_err(serde::de::Error::custom)
}
