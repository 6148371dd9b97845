// src/infrastructure/mod.rs
pub mod event_bus;
pub mod exchange;
pub mod notification;
pub mod persistence;

pub use event_bus::BroadcastEventBus;
pub use exchange::BinanceGateway;
pub use notification::LogNotifier;
pub use persistence::InMemoryStore;
