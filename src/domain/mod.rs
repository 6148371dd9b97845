// src/domain/mod.rs
pub mod context;
pub mod errors;
pub mod models;
pub mod repository;
pub mod service;

// Re-export common types for convenience
pub use context::{CancelHandle, CancelSignal, ExecContext, Interrupt};
pub use errors::{
    AppError, AppResult, ExchangeError, ExchangeResult, ExecutionError, ExecutionResult,
    PersistenceWarning, RepositoryError, RepositoryResult,
};
pub use models::{
    Coin, CoinEvent, CoinEventKind, CoinStatus, ListingAnnouncement, ListingEvent, Order,
    OrderRequest, OrderResponse, OrderSide, OrderStatus, OrderType, PriceSample, QuantityKind,
    Symbol, TimeInForce,
};
