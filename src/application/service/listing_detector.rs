// src/application/service/listing_detector.rs
// Feeds new listings and status changes from the exchange into the event queue

use chrono::Utc;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};

use crate::application::queue::{EventQueue, QueueAction, QueueItem, PRIORITY_POLL, PRIORITY_PUSH};
use crate::application::usecase::auto_buy::BASELINE_METADATA_KEY;
use crate::config::DetectorConfig;
use crate::domain::context::{CancelSignal, ExecContext};
use crate::domain::errors::{ExchangeError, ExchangeResult};
use crate::domain::models::{
    Coin, CoinEvent, CoinStatus, ListingAnnouncement, ListingEvent, Symbol,
};
use crate::domain::repository::{CoinRepository, ExchangeGateway};

pub struct ListingDetector {
    gateway: Arc<dyn ExchangeGateway>,
    coins: Arc<dyn CoinRepository>,
    queue: Arc<EventQueue>,
    config: DetectorConfig,
    /// Symbols already past `Pending` on the first poll that are not stored
    /// yet. `None` until that poll has run.
    baseline: Mutex<Option<HashSet<Symbol>>>,
}

impl ListingDetector {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        coins: Arc<dyn CoinRepository>,
        queue: Arc<EventQueue>,
        config: DetectorConfig,
    ) -> Self {
        Self {
            gateway,
            coins,
            queue,
            config,
            baseline: Mutex::new(None),
        }
    }

    /// Spawn the enabled sources. Push and poll run side by side.
    pub fn start(self: &Arc<Self>, shutdown: CancelSignal) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.websocket_enabled {
            let detector = self.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move { detector.run_push(shutdown).await }));
        }

        if let Some(interval) = self.config.poll_interval() {
            let detector = self.clone();
            handles.push(tokio::spawn(async move {
                detector.run_poll(interval, shutdown).await
            }));
        }

        if handles.is_empty() {
            log::warn!("Listing detector has no enabled source");
        }
        handles
    }

    async fn run_push(self: Arc<Self>, shutdown: CancelSignal) {
        let ctx = ExecContext::new(shutdown);
        let venue = self.gateway.name().to_string();

        loop {
            match ctx.run(self.gateway.listing_events()).await {
                Err(_) => break,
                Ok(Err(ExchangeError::Unsupported(reason))) => {
                    log::info!("Push listing source disabled for {}: {}", venue, reason);
                    return;
                }
                Ok(Err(e)) => {
                    log::warn!("Could not subscribe to {} listings: {}", venue, e);
                }
                Ok(Ok(mut stream)) => {
                    log::info!("Subscribed to {} listing channel", venue);
                    loop {
                        match ctx.run(stream.next()).await {
                            Err(_) => {
                                log::info!("Listing push source stopped");
                                return;
                            }
                            Ok(Some(event)) => {
                                self.handle_listing_event(event);
                            }
                            Ok(None) => {
                                log::warn!("{} listing channel closed", venue);
                                break;
                            }
                        }
                    }
                }
            }

            let delay = self.config.reconnect_delay();
            log::info!("Resubscribing to {} listings in {:?}", venue, delay);
            if ctx.sleep(delay).await.is_err() {
                break;
            }
        }
        log::info!("Listing push source stopped");
    }

    async fn run_poll(self: Arc<Self>, interval: Duration, shutdown: CancelSignal) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Polling {} listings every {:?}", self.gateway.name(), interval);

        let ctx = ExecContext::new(shutdown);
        loop {
            if ctx.run(ticker.tick()).await.is_err() {
                break;
            }
            match ctx.run(self.poll_once()).await {
                Err(_) => break,
                Ok(Ok(queued)) if queued > 0 => log::info!("Listing poll queued {} item(s)", queued),
                Ok(Ok(_)) => {}
                Ok(Err(ExchangeError::Unsupported(reason))) => {
                    log::info!("Poll listing source disabled: {}", reason);
                    return;
                }
                Ok(Err(e)) => log::warn!("Listing poll failed: {}", e),
            }
        }
        log::info!("Listing poll source stopped");
    }

    /// Translate one push record into a queue item at push priority.
    pub fn handle_listing_event(&self, event: ListingEvent) -> bool {
        let item = match event {
            ListingEvent::NewListing { symbol, listed_at } => {
                log::info!("New listing announced: {}", symbol);
                let coin = Coin::sighted(&symbol, listed_at);
                QueueItem {
                    event: CoinEvent::detected(&coin, listed_at)
                        .with_metadata("source", serde_json::json!("push")),
                    coin,
                    priority: PRIORITY_PUSH,
                    action: QueueAction::CreateCoin,
                }
            }
            ListingEvent::StatusChange { symbol, old, new, at } => {
                log::info!("{} status {} -> {}", symbol, old, new);
                let mut coin = Coin::sighted(&symbol, at);
                coin.status = old;
                QueueItem {
                    event: CoinEvent::status_changed(&coin, old, new, at)
                        .with_metadata("source", serde_json::json!("push")),
                    coin,
                    priority: PRIORITY_PUSH,
                    action: QueueAction::UpdateCoin,
                }
            }
        };
        self.queue.push(item)
    }

    /// One pass over the listings endpoint. Listings already past `Pending`
    /// on the first pass are tagged as baseline so they are recorded but not
    /// bought. The tag sticks to the symbol until it is stored, so items the
    /// queue drops are still tagged when a later pass sees them again.
    pub async fn poll_once(&self) -> ExchangeResult<usize> {
        let listings = self.gateway.list_listings().await?;
        self.latch_baseline(&listings);
        let mut queued = 0;

        for announcement in listings {
            let stored = match self.coins.get_coin_by_symbol(&announcement.symbol).await {
                Ok(stored) => stored,
                Err(e) => {
                    log::warn!("Could not look up {}: {}", announcement.symbol, e);
                    continue;
                }
            };
            let item = match stored {
                None => {
                    let baseline = self.is_baseline(&announcement.symbol);
                    Some(self.poll_item(&announcement, QueueAction::CreateCoin, CoinStatus::Pending, baseline))
                }
                Some(coin) => {
                    self.release_baseline(&coin.symbol);
                    if coin.status != announcement.status
                        && coin.status.can_transition_to(announcement.status)
                    {
                        Some(self.poll_item(&announcement, QueueAction::UpdateCoin, coin.status, false))
                    } else {
                        None
                    }
                }
            };
            if let Some(item) = item {
                if self.queue.push(item) {
                    queued += 1;
                }
            }
        }
        Ok(queued)
    }

    fn baseline(&self) -> MutexGuard<'_, Option<HashSet<Symbol>>> {
        self.baseline.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn latch_baseline(&self, listings: &[ListingAnnouncement]) {
        let mut baseline = self.baseline();
        if baseline.is_none() {
            let symbols: HashSet<Symbol> = listings
                .iter()
                .filter(|a| a.status != CoinStatus::Pending)
                .map(|a| a.symbol.clone())
                .collect();
            log::info!("{} listing(s) present at startup will not be bought", symbols.len());
            *baseline = Some(symbols);
        }
    }

    fn is_baseline(&self, symbol: &str) -> bool {
        self.baseline()
            .as_ref()
            .map_or(false, |symbols| symbols.contains(symbol))
    }

    fn release_baseline(&self, symbol: &str) {
        if let Some(symbols) = self.baseline().as_mut() {
            symbols.remove(symbol);
        }
    }

    fn poll_item(
        &self,
        announcement: &ListingAnnouncement,
        action: QueueAction,
        old: CoinStatus,
        baseline: bool,
    ) -> QueueItem {
        let now = Utc::now();
        let mut coin = Coin::sighted(&announcement.symbol, announcement.announced_at.min(now));
        coin.status = old;
        let mut event = match action {
            QueueAction::CreateCoin => {
                let mut event = CoinEvent::detected(&coin, now);
                event.new_status = announcement.status;
                event
            }
            QueueAction::UpdateCoin => CoinEvent::status_changed(&coin, old, announcement.status, now),
        }
        .with_metadata("source", serde_json::json!("poll"));
        if baseline && announcement.status != CoinStatus::Pending {
            event = event.with_metadata(BASELINE_METADATA_KEY, serde_json::json!(true));
        }
        QueueItem {
            event,
            coin,
            priority: PRIORITY_POLL,
            action,
        }
    }
}
