// src/infrastructure/notification.rs
// Notifier that writes to the application log

use async_trait::async_trait;

use crate::domain::errors::{ExecutionError, NotifyError};
use crate::domain::models::{Order, OrderRequest};
use crate::domain::service::Notifier;

#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_trade(&self, order: &Order) -> Result<(), NotifyError> {
        log::info!(
            "[trade] {} {} {} on {}: order {} {} filled {}/{} @ {}",
            order.user_id,
            order.side,
            order.symbol,
            order.exchange,
            order.exchange_order_id,
            order.status,
            order.executed_qty,
            order.quantity,
            order.avg_fill_price
        );
        Ok(())
    }

    async fn notify_failure(
        &self,
        request: &OrderRequest,
        error: &ExecutionError,
    ) -> Result<(), NotifyError> {
        log::warn!(
            "[trade failed] {} {} {} {} qty {}: {}",
            request.user_id,
            request.order_type,
            request.side,
            request.symbol,
            request.quantity,
            error
        );
        Ok(())
    }

    async fn notify_alert(&self, level: &str, title: &str, message: &str) -> Result<(), NotifyError> {
        match level {
            "error" | "critical" => log::error!("[alert] {}: {}", title, message),
            "warning" | "warn" => log::warn!("[alert] {}: {}", title, message),
            _ => log::info!("[alert] {}: {}", title, message),
        }
        Ok(())
    }
}
