// src/infrastructure/exchange/mod.rs
// Exchange gateway implementations

pub mod binance;
pub mod dto;

pub use binance::BinanceGateway;
