// src/domain/errors.rs
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Unknown(s)
    }
}

/// Failures reported by an exchange gateway.
///
/// Gateways that can tell what went wrong should use the typed variants;
/// anything else lands in `Api`/`Order` and is classified by message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Order error: {0}")]
    Order(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Symbol not yet tradable: {0}")]
    NotYetTradable(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Request error: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Request cancelled")]
    Cancelled,
}

impl ExchangeError {
    /// Map a raw venue error text onto the closest typed variant.
    ///
    /// Used by adapters whose client library only hands back an opaque error.
    /// Binance error codes are recognised alongside plain HTTP status hints.
    pub fn from_venue_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if lower.contains("-1121") || lower.contains("invalid symbol") {
            ExchangeError::InvalidSymbol(message)
        } else if lower.contains("-2010") && lower.contains("insufficient")
            || lower.contains("insufficient balance")
        {
            ExchangeError::InsufficientFunds(message)
        } else if lower.contains("-2014")
            || lower.contains("-2015")
            || lower.contains("-1022")
            || lower.contains("api-key")
        {
            ExchangeError::Authentication(message)
        } else if lower.contains("-1003")
            || lower.contains("status_code: 429")
            || lower.contains("status_code: 418")
            || lower.contains("too many requests")
        {
            ExchangeError::RateLimit(message)
        } else if lower.contains("status_code: 5") {
            ExchangeError::Server(message)
        } else if lower.starts_with("send(") || lower.contains("connection") {
            ExchangeError::Connection(message)
        } else {
            ExchangeError::Api(message)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflicting update for {symbol}: expected {expected}, found {actual}")]
    Conflict {
        symbol: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Errors surfaced to callers of the order executor and sniper controller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Trigger condition never fired (last price: {last_price:?})")]
    PredicateNeverFired { last_price: Option<Decimal> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Exchange unavailable after {attempts} attempts: {reason}")]
    ExchangeUnavailable { attempts: u32, reason: String },

    #[error("Symbol still not tradable after {attempts} attempts: {reason}")]
    NotYetTradableExhausted { attempts: u32, reason: String },
}

impl ExecutionError {
    /// Whether a caller could reasonably try again with a fresh deadline.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExecutionError::DeadlineExceeded
                | ExecutionError::PredicateNeverFired { .. }
                | ExecutionError::ExchangeUnavailable { .. }
                | ExecutionError::NotYetTradableExhausted { .. }
        )
    }
}

/// The order went through but the local record could not be written.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Order {exchange_order_id} executed but was not persisted: {reason}")]
pub struct PersistenceWarning {
    pub exchange_order_id: String,
    pub reason: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("No subscribers for event {0}")]
    NoSubscribers(String),

    #[error("Event bus closed")]
    Closed,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConsumerError {
    #[error("Event rejected: {0}")]
    Rejected(String),

    #[error("Consumer failed: {0}")]
    Failed(String),
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type ExchangeResult<T> = Result<T, ExchangeError>;
pub type RepositoryResult<T> = Result<T, RepositoryError>;
pub type ExecutionResult<T> = Result<T, ExecutionError>;
