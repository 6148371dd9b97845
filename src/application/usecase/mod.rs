pub mod auto_buy;
pub mod order_executor;
pub mod price_watcher;
pub mod sniper_shot;

// Re-export public API
pub use auto_buy::AutoBuyReactor;
pub use order_executor::{ExecutionOutcome, OrderExecutor, RetryBudget};
pub use price_watcher::{PriceWatcher, WatchOutcome};
pub use sniper_shot::{
    ShotState, SniperShotController, SniperShotRequest, SniperShotResult, TriggerCondition,
};
