// src/main.rs
use listing_sniper::adapter::ExecutionCore;
use listing_sniper::config::Config;
use listing_sniper::domain::errors::{AppError, AppResult};
use listing_sniper::domain::repository::ExchangeGateway;
use listing_sniper::infrastructure::{BinanceGateway, BroadcastEventBus, InMemoryStore, LogNotifier};

use std::sync::Arc;
use tokio::signal::ctrl_c;

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting listing_sniper v{}", env!("CARGO_PKG_VERSION"));
    log::info!(
        "Using {} exchange{}",
        config.exchange.name,
        if config.exchange.testnet { " (testnet)" } else { "" }
    );

    // Create exchange gateway
    let gateway = create_exchange_gateway(&config)?;

    let store = Arc::new(InMemoryStore::new());
    let bus = Arc::new(BroadcastEventBus::new(config.queue.capacity));
    let notifier = Arc::new(LogNotifier::new());

    let mut core = ExecutionCore::new(
        config.clone(),
        gateway,
        store.clone(),
        store,
        bus,
        notifier,
    );
    core.start()?;

    log::info!("Press Ctrl+C to stop");
    ctrl_c().await?;

    log::info!("Shutting down...");
    core.stop().await;
    log::info!("Shutdown complete");

    Ok(())
}

/// Create exchange gateway based on configuration
fn create_exchange_gateway(config: &Config) -> AppResult<Arc<dyn ExchangeGateway>> {
    match config.exchange.name.to_lowercase().as_str() {
        "binance" => Ok(Arc::new(BinanceGateway::new(
            &config.exchange.api_key,
            &config.exchange.api_secret,
            config.exchange.testnet,
        ))),
        other => Err(AppError::Config(format!("Unsupported exchange: {}", other))),
    }
}
