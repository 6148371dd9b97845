// src/domain/context.rs
// Cancellation and deadline handling shared by every blocking call

use std::future::Future;
use tokio::sync::watch;
use tokio::time::{Duration, Instant};

use crate::domain::errors::ExecutionError;

/// Why a wait was cut short.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    Cancelled,
    DeadlineExceeded,
}

impl From<Interrupt> for ExecutionError {
    fn from(interrupt: Interrupt) -> Self {
        match interrupt {
            Interrupt::Cancelled => ExecutionError::Cancelled,
            Interrupt::DeadlineExceeded => ExecutionError::DeadlineExceeded,
        }
    }
}

/// Owning side of a cancellation signal. Dropping it does not cancel.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// A fresh context bound to this handle with no deadline.
    pub fn context(&self) -> ExecContext {
        ExecContext {
            deadline: None,
            cancel: self.signal(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation has been requested. Pends forever if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Deadline plus cancellation, passed down through every operation.
#[derive(Debug, Clone)]
pub struct ExecContext {
    deadline: Option<Instant>,
    cancel: CancelSignal,
}

impl ExecContext {
    /// No deadline, never cancelled.
    pub fn background() -> Self {
        Self {
            deadline: None,
            cancel: CancelSignal::never(),
        }
    }

    pub fn new(cancel: CancelSignal) -> Self {
        Self { deadline: None, cancel }
    }

    /// Child context whose deadline is the earlier of ours and `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        };
        Self {
            deadline: Some(deadline),
            cancel: self.cancel.clone(),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Cancellation wins over an expired deadline so callers can tell the two apart.
    pub fn check(&self) -> Result<(), Interrupt> {
        if self.cancel.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Interrupt::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Drive `fut` to completion unless cancelled or out of time first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupt> {
        self.check()?;
        let deadline = self.deadline;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupt::Cancelled),
            _ = sleep_until_opt(deadline) => Err(Interrupt::DeadlineExceeded),
            output = fut => Ok(output),
        }
    }

    /// Interruptible sleep.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Interrupt> {
        self.run(tokio::time::sleep(duration)).await
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn deadline_and_cancel_are_distinguishable() {
        let handle = CancelHandle::new();
        let ctx = handle.context().with_timeout(Duration::from_millis(100));

        let slept = ctx.sleep(Duration::from_secs(1)).await;
        assert_eq!(slept, Err(Interrupt::DeadlineExceeded));

        let ctx = handle.context().with_timeout(Duration::from_secs(10));
        handle.cancel();
        assert_eq!(ctx.sleep(Duration::from_secs(1)).await, Err(Interrupt::Cancelled));
        assert_eq!(ctx.check(), Err(Interrupt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn child_deadline_never_extends_parent() {
        let parent = ExecContext::background().with_timeout(Duration::from_secs(1));
        let child = parent.with_timeout(Duration::from_secs(30));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_wait_wakes_the_waiter() {
        let handle = CancelHandle::new();
        let ctx = handle.context();
        let waiter = tokio::spawn(async move { ctx.sleep(Duration::from_secs(3600)).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();
        assert_eq!(waiter.await.unwrap(), Err(Interrupt::Cancelled));
    }

    #[tokio::test]
    async fn never_signal_does_not_fire() {
        let ctx = ExecContext::background();
        assert!(ctx.check().is_ok());
        let out = ctx.run(async { 7 }).await;
        assert_eq!(out, Ok(7));
    }
}
