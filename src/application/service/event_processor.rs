// src/application/service/event_processor.rs
// Single writer that drains the event queue into storage and onto the bus

use std::sync::Arc;
use tokio::time::{Duration, MissedTickBehavior};

use crate::application::queue::{EventQueue, QueueAction, QueueItem};
use crate::domain::context::CancelSignal;
use crate::domain::errors::{BusError, RepositoryError, RepositoryResult};
use crate::domain::models::{Coin, CoinEvent, CoinEventKind, CoinStatus};
use crate::domain::repository::CoinRepository;
use crate::domain::service::EventBus;

pub struct EventProcessor {
    queue: Arc<EventQueue>,
    coins: Arc<dyn CoinRepository>,
    bus: Arc<dyn EventBus>,
    drain_interval: Duration,
}

impl EventProcessor {
    pub fn new(
        queue: Arc<EventQueue>,
        coins: Arc<dyn CoinRepository>,
        bus: Arc<dyn EventBus>,
        drain_interval: Duration,
    ) -> Self {
        Self {
            queue,
            coins,
            bus,
            drain_interval,
        }
    }

    /// Drain the queue every `drain_interval` until `shutdown` fires.
    /// Whatever is still queued at that point is dropped.
    pub async fn run(self: Arc<Self>, shutdown: CancelSignal) {
        let mut ticker = tokio::time::interval(self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Event processor started (drain every {:?})", self.drain_interval);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.drain().await;
                }
            }
        }

        let abandoned = self.queue.len();
        if abandoned > 0 {
            log::warn!("Event processor stopped with {} queued item(s) dropped", abandoned);
        } else {
            log::info!("Event processor stopped");
        }
    }

    /// Process everything currently queued. Returns how many items were handled.
    pub async fn drain(&self) -> usize {
        let mut handled = 0;
        while let Some(item) = self.queue.pop() {
            let symbol = item.coin.symbol.clone();
            let action = item.action;
            if let Err(e) = self.process_item(item).await {
                log::error!("Failed to apply {:?} for {}: {}", action, symbol, e);
            }
            handled += 1;
        }
        handled
    }

    pub async fn process_item(&self, item: QueueItem) -> RepositoryResult<()> {
        let target = item.event.new_status;
        let coin = match item.action {
            QueueAction::CreateCoin => self.ensure_coin(&item).await?,
            QueueAction::UpdateCoin => match self.coins.get_coin_by_symbol(&item.coin.symbol).await? {
                Some(coin) => coin,
                None => {
                    log::info!("Status update for unseen {}, creating it first", item.coin.symbol);
                    self.ensure_coin(&item).await?
                }
            },
        };
        self.transition(coin, target, &item.event).await
    }

    /// Store the coin with its `Detected` event unless it is already known.
    /// A known coin whose `Detected` event is missing gets it now.
    async fn ensure_coin(&self, item: &QueueItem) -> RepositoryResult<Coin> {
        let fresh = Coin::sighted(&item.coin.symbol, item.coin.first_seen_at);
        let mut detected = CoinEvent::detected(&fresh, item.event.timestamp);
        detected.metadata = item.event.metadata.clone();

        let upserted = self.coins.create_coin_with_event(fresh, &detected).await?;
        if upserted.created {
            log::info!("New coin detected: {}", upserted.coin.symbol);
            self.publish(detected).await;
            return Ok(upserted.coin);
        }

        if !self
            .coins
            .has_event(upserted.coin.id, CoinEventKind::Detected)
            .await?
        {
            log::warn!(
                "{} was stored without its detection event, writing it now",
                upserted.coin.symbol
            );
            let mut repaired = CoinEvent::detected(&upserted.coin, upserted.coin.first_seen_at);
            repaired.new_status = CoinStatus::Pending;
            repaired.metadata = item.event.metadata.clone();
            self.coins.save_event(&repaired).await?;
            self.publish(repaired).await;
        }
        Ok(upserted.coin)
    }

    async fn transition(&self, coin: Coin, target: CoinStatus, source: &CoinEvent) -> RepositoryResult<()> {
        if coin.status == target {
            log::debug!("{} already {}, nothing to do", coin.symbol, target);
            return Ok(());
        }
        if !coin.status.can_transition_to(target) {
            log::warn!(
                "Ignoring {} -> {} for {}: status only moves forward",
                coin.status,
                target,
                coin.symbol
            );
            return Ok(());
        }

        let mut event = CoinEvent::status_changed(&coin, coin.status, target, source.timestamp);
        event.metadata = source.metadata.clone();

        match self
            .coins
            .transition_with_event(&coin.symbol, coin.status, &event)
            .await
        {
            Ok(updated) => {
                log::info!("{} moved {} -> {}", updated.symbol, coin.status, updated.status);
                self.publish(event).await;
                Ok(())
            }
            Err(RepositoryError::Conflict { actual, .. }) => {
                log::debug!(
                    "{} changed underneath us (now {}), dropping {} update",
                    coin.symbol,
                    actual,
                    target
                );
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn publish(&self, event: CoinEvent) {
        let (kind, symbol) = (event.kind, event.symbol.clone());
        match self.bus.publish(event).await {
            Ok(()) => {}
            Err(BusError::NoSubscribers(_)) => {
                log::debug!("No subscribers for {} of {}", kind, symbol);
            }
            Err(e) => log::warn!("Failed to publish {} of {}: {}", kind, symbol, e),
        }
    }
}
