// src/application/usecase/order_executor.rs
// Order submission with retries, persistence and notification

use std::future::Future;
use std::sync::Arc;
use tokio::time::{Duration, Instant};

use crate::domain::context::ExecContext;
use crate::domain::errors::{ExchangeResult, ExecutionError, ExecutionResult, PersistenceWarning};
use crate::domain::models::{Order, OrderRequest, OrderResponse};
use crate::domain::repository::{ExchangeGateway, OrderRepository};
use crate::domain::service::retry::{ErrorClass, RetryPolicy};
use crate::domain::service::Notifier;

/// Limits for one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryBudget {
    /// Total submissions, first one included.
    pub max_attempts: u32,
    /// Spacing between "not yet tradable" retries.
    pub base_delay: Duration,
    pub deadline: Option<Instant>,
}

impl RetryBudget {
    pub fn new(max_attempts: u32, base_delay: Duration, deadline: Instant) -> Self {
        Self {
            max_attempts,
            base_delay,
            deadline: Some(deadline),
        }
    }

    /// Budget whose deadline is `timeout` from now.
    pub fn within(max_attempts: u32, base_delay: Duration, timeout: Duration) -> Self {
        Self::new(max_attempts, base_delay, Instant::now() + timeout)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub order: Order,
    pub attempts: u32,
    /// Set when the order went through but could not be stored locally.
    pub warning: Option<PersistenceWarning>,
}

pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
    policy: RetryPolicy,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn Notifier>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            orders,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Submit `request`, retrying while the venue reports the symbol as not
    /// yet tradable or fails transiently, then persist the resulting order.
    pub async fn execute(
        &self,
        ctx: &ExecContext,
        request: &OrderRequest,
        budget: &RetryBudget,
    ) -> ExecutionResult<ExecutionOutcome> {
        let (response, attempts) = match self.submit_with_retry(ctx, request, budget).await {
            Ok(submitted) => submitted,
            Err(e) => {
                log::error!(
                    "{} {} {} for {} failed: {}",
                    request.order_type,
                    request.side,
                    request.symbol,
                    request.user_id,
                    e
                );
                if e != ExecutionError::Cancelled {
                    if let Err(notify_err) = self.notifier.notify_failure(request, &e).await {
                        log::warn!("Failure notification dropped: {}", notify_err);
                    }
                }
                return Err(e);
            }
        };

        let order = Order::from_response(&request.user_id, response);
        log::info!(
            "Order {} placed on {}: {} {} {} qty {} status {} after {} attempt(s)",
            order.exchange_order_id,
            order.exchange,
            order.order_type,
            order.side,
            order.symbol,
            order.quantity,
            order.status,
            attempts
        );

        // The trade already happened; a storage failure is reported, not raised.
        let warning = match self.orders.create_order(&order).await {
            Ok(()) => None,
            Err(e) => {
                log::error!(
                    "Order {} executed but could not be stored: {}",
                    order.exchange_order_id,
                    e
                );
                Some(PersistenceWarning {
                    exchange_order_id: order.exchange_order_id.clone(),
                    reason: e.to_string(),
                })
            }
        };

        if let Err(e) = self.notifier.notify_trade(&order).await {
            log::warn!("Trade notification dropped: {}", e);
        }

        Ok(ExecutionOutcome {
            order,
            attempts,
            warning,
        })
    }

    async fn submit_with_retry(
        &self,
        ctx: &ExecContext,
        request: &OrderRequest,
        budget: &RetryBudget,
    ) -> ExecutionResult<(OrderResponse, u32)> {
        request.validate().map_err(ExecutionError::InvalidRequest)?;

        let ctx = match budget.deadline {
            Some(deadline) => ctx.with_deadline(deadline),
            None => ctx.clone(),
        };
        let max_attempts = budget.max_attempts.max(1);
        let mut not_yet_tradable = self.policy.not_yet_tradable_backoff(budget.base_delay);
        let mut transient = self.policy.transient_backoff();
        let mut transient_failures = 0u32;
        let mut attempts = 0u32;

        loop {
            ctx.check()?;
            attempts += 1;

            let error = match ctx.run(self.gateway.submit_order(request)).await? {
                Ok(response) => return Ok((response, attempts)),
                Err(e) => e,
            };

            let delay = match self.policy.classify(&error) {
                ErrorClass::Permanent => return Err(self.policy.terminal_error(&error)),
                ErrorClass::Cancelled => return Err(ExecutionError::Cancelled),
                ErrorClass::NotYetTradable => {
                    if attempts >= max_attempts {
                        return Err(ExecutionError::NotYetTradableExhausted {
                            attempts,
                            reason: error.to_string(),
                        });
                    }
                    not_yet_tradable.next_delay()
                }
                ErrorClass::Transient => {
                    transient_failures += 1;
                    if transient_failures > self.policy.transient_max_retries()
                        || attempts >= max_attempts
                    {
                        return Err(ExecutionError::ExchangeUnavailable {
                            attempts,
                            reason: error.to_string(),
                        });
                    }
                    transient.next_delay()
                }
            };

            if let Some(deadline) = ctx.deadline() {
                if Instant::now() + delay > deadline {
                    log::warn!(
                        "Giving up on {} after {} attempt(s): next retry would pass the deadline ({})",
                        request.symbol,
                        attempts,
                        error
                    );
                    return Err(ExecutionError::DeadlineExceeded);
                }
            }

            log::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempts,
                max_attempts,
                request.symbol,
                error,
                delay
            );
            ctx.sleep(delay).await?;
        }
    }

    /// Retry `call` on transient failures only. Anything else is terminal.
    async fn with_transient_retry<T, F, Fut>(
        &self,
        ctx: &ExecContext,
        what: &str,
        call: F,
    ) -> ExecutionResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ExchangeResult<T>>,
    {
        let mut backoff = self.policy.transient_backoff();
        let mut failures = 0u32;
        loop {
            let error = match ctx.run(call()).await? {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };
            match self.policy.classify(&error) {
                ErrorClass::Transient if failures < self.policy.transient_max_retries() => {
                    failures += 1;
                    let delay = backoff.next_delay();
                    log::warn!("{} failed ({}), retrying in {:?}", what, error, delay);
                    ctx.sleep(delay).await?;
                }
                ErrorClass::Transient => {
                    return Err(ExecutionError::ExchangeUnavailable {
                        attempts: failures + 1,
                        reason: error.to_string(),
                    })
                }
                ErrorClass::Cancelled => return Err(ExecutionError::Cancelled),
                ErrorClass::NotYetTradable | ErrorClass::Permanent => {
                    return Err(self.policy.terminal_error(&error))
                }
            }
        }
    }

    pub async fn cancel(&self, ctx: &ExecContext, symbol: &str, order_id: &str) -> ExecutionResult<()> {
        let what = format!("Cancel of order {} on {}", order_id, symbol);
        self.with_transient_retry(ctx, &what, move || self.gateway.cancel_order(symbol, order_id))
            .await?;
        log::info!("Cancelled order {} on {}", order_id, symbol);
        Ok(())
    }

    /// Fetch the venue's view of an order and fold it into the stored record.
    pub async fn status(
        &self,
        ctx: &ExecContext,
        symbol: &str,
        order_id: &str,
    ) -> ExecutionResult<OrderResponse> {
        let what = format!("Status of order {} on {}", order_id, symbol);
        let response = self
            .with_transient_retry(ctx, &what, move || self.gateway.order_status(symbol, order_id))
            .await?;

        match self.orders.get_order_by_exchange_id(order_id).await {
            Ok(Some(mut order)) => {
                order.apply_update(&response);
                if let Err(e) = self.orders.update_order(&order).await {
                    log::warn!("Could not refresh stored order {}: {}", order_id, e);
                }
            }
            Ok(None) => log::debug!("Order {} is not tracked locally", order_id),
            Err(e) => log::warn!("Could not load stored order {}: {}", order_id, e),
        }

        Ok(response)
    }
}
