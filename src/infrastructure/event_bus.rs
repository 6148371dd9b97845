// src/infrastructure/event_bus.rs
// Fire-and-forget coin event fan-out over a tokio broadcast channel

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::domain::context::CancelSignal;
use crate::domain::errors::BusError;
use crate::domain::models::{CoinEvent, CoinEventKind};
use crate::domain::service::{EventBus, EventConsumer};

pub struct BroadcastEventBus {
    tx: broadcast::Sender<CoinEvent>,
}

impl BroadcastEventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl EventBus for BroadcastEventBus {
    async fn publish(&self, event: CoinEvent) -> Result<(), BusError> {
        let label = format!("{} {}", event.kind, event.symbol);
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers(label))
    }

    fn subscribe(
        &self,
        kind: CoinEventKind,
        consumer: Arc<dyn EventConsumer>,
        shutdown: CancelSignal,
    ) -> JoinHandle<()> {
        let mut rx = self.tx.subscribe();
        tokio::spawn(async move {
            log::info!("{} subscribed to {} events", consumer.name(), kind);
            loop {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(event) if event.kind == kind => {
                        let (id, symbol) = (event.id, event.symbol.clone());
                        if let Err(e) = consumer.handle(event).await {
                            log::error!(
                                "{} failed on event {} for {}: {}",
                                consumer.name(),
                                id,
                                symbol,
                                e
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::warn!("{} lagged behind, {} event(s) lost", consumer.name(), skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            log::info!("{} unsubscribed from {} events", consumer.name(), kind);
        })
    }
}
