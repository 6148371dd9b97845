//! Listing detection through storage, the event bus and auto-buy.

mod common;

use chrono::Utc;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use common::{test_config, wait_until, MockGateway, RecordingNotifier};
use listing_sniper::adapter::ExecutionCore;
use listing_sniper::application::queue::{EventQueue, QueueAction, QueueItem, PRIORITY_PUSH};
use listing_sniper::application::service::EventProcessor;
use listing_sniper::application::usecase::{AutoBuyReactor, OrderExecutor};
use listing_sniper::config::Config;
use listing_sniper::domain::context::CancelSignal;
use listing_sniper::domain::models::{
    Coin, CoinEvent, CoinEventKind, CoinStatus, ListingAnnouncement, ListingEvent, OrderSide,
    OrderType, QuantityKind,
};
use listing_sniper::domain::repository::CoinRepository;
use listing_sniper::domain::service::EventConsumer;
use listing_sniper::infrastructure::exchange::dto::ExchangeInfoPayload;
use listing_sniper::infrastructure::{BroadcastEventBus, InMemoryStore};

fn core(config: Config, gateway: Arc<MockGateway>, store: Arc<InMemoryStore>) -> ExecutionCore {
    ExecutionCore::new(
        config,
        gateway,
        store.clone(),
        store,
        Arc::new(BroadcastEventBus::new(64)),
        RecordingNotifier::new(),
    )
}

fn push_config() -> Config {
    let mut config = test_config();
    config.detector.websocket_enabled = true;
    config
}

fn events_for(store: &InMemoryStore, symbol: &str) -> Vec<CoinEvent> {
    store
        .events()
        .into_iter()
        .filter(|e| e.symbol == symbol)
        .collect()
}

fn coin(store: &InMemoryStore, symbol: &str) -> Option<Coin> {
    store.coins().into_iter().find(|c| c.symbol == symbol)
}

#[tokio::test(start_paused = true)]
async fn new_listing_is_bought_once_it_becomes_tradable() {
    let gateway = MockGateway::new();
    let store = Arc::new(InMemoryStore::new());
    let mut core = core(push_config(), gateway.clone(), store.clone());
    core.start().unwrap();

    let listed_at = Utc::now();
    gateway.push_listing(ListingEvent::NewListing {
        symbol: "ABCUSDT".into(),
        listed_at,
    });
    wait_until(|| coin(&store, "ABCUSDT").is_some()).await;
    assert_eq!(coin(&store, "ABCUSDT").unwrap().status, CoinStatus::Pending);

    tokio::time::sleep(Duration::from_secs(2)).await;
    let opened_at = listed_at + chrono::Duration::seconds(2);
    let pushed = Instant::now();
    gateway.push_listing(ListingEvent::StatusChange {
        symbol: "ABCUSDT".into(),
        old: CoinStatus::Pending,
        new: CoinStatus::Tradable,
        at: opened_at,
    });

    wait_until(|| !gateway.submissions().is_empty()).await;

    let events = events_for(&store, "ABCUSDT");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind, CoinEventKind::Detected);
    assert_eq!(events[1].kind, CoinEventKind::StatusChanged);
    assert_eq!(events[1].old_status, Some(CoinStatus::Pending));
    assert_eq!(events[1].new_status, CoinStatus::Tradable);

    let stored = coin(&store, "ABCUSDT").unwrap();
    assert_eq!(stored.status, CoinStatus::Tradable);
    assert_eq!(stored.became_tradable_at, Some(opened_at));

    let submission = &gateway.submissions()[0];
    assert_eq!(submission.request.symbol, "ABCUSDT");
    assert_eq!(submission.request.side, OrderSide::Buy);
    assert_eq!(submission.request.order_type, OrderType::Market);
    assert_eq!(submission.request.quantity, dec!(10));
    assert_eq!(submission.request.quantity_kind, QuantityKind::Quote);
    assert!(submission.at - pushed >= Duration::from_millis(500));

    wait_until(|| store.orders().len() == 1).await;
    core.stop().await;
    assert!(!core.is_running());
}

#[tokio::test(start_paused = true)]
async fn duplicate_status_change_is_applied_once() {
    let gateway = MockGateway::new();
    let store = Arc::new(InMemoryStore::new());
    let mut config = push_config();
    config.auto_buy.max_buys_per_symbol = 5;
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    let at = Utc::now();
    for _ in 0..2 {
        gateway.push_listing(ListingEvent::StatusChange {
            symbol: "DUPUSDT".into(),
            old: CoinStatus::Pending,
            new: CoinStatus::Tradable,
            at,
        });
    }

    wait_until(|| !gateway.submissions().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let kinds: Vec<CoinEventKind> = events_for(&store, "DUPUSDT").iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![CoinEventKind::Detected, CoinEventKind::StatusChanged]);
    assert_eq!(gateway.submissions().len(), 1);
    core.stop().await;
}

#[tokio::test(start_paused = true)]
async fn listings_present_at_startup_are_not_bought() {
    let gateway = MockGateway::new();
    let now = Utc::now();
    gateway.set_listings(vec![
        ListingAnnouncement {
            symbol: "OLDUSDT".into(),
            status: CoinStatus::Tradable,
            announced_at: now,
        },
        ListingAnnouncement {
            symbol: "NEWUSDT".into(),
            status: CoinStatus::Pending,
            announced_at: now,
        },
    ]);
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config();
    config.detector.poll_interval_secs = Some(1);
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    wait_until(|| {
        coin(&store, "OLDUSDT").map(|c| c.status) == Some(CoinStatus::Tradable)
            && coin(&store, "NEWUSDT").is_some()
    })
    .await;
    let old_events = events_for(&store, "OLDUSDT");
    assert_eq!(old_events.len(), 2);
    assert_eq!(old_events[1].metadata.get("baseline"), Some(&serde_json::json!(true)));

    gateway.set_listings(vec![
        ListingAnnouncement {
            symbol: "OLDUSDT".into(),
            status: CoinStatus::Tradable,
            announced_at: now,
        },
        ListingAnnouncement {
            symbol: "NEWUSDT".into(),
            status: CoinStatus::Tradable,
            announced_at: now,
        },
    ]);

    wait_until(|| !gateway.submissions().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;

    let bought: Vec<String> = gateway
        .submissions()
        .iter()
        .map(|s| s.request.symbol.clone())
        .collect();
    assert_eq!(bought, vec!["NEWUSDT".to_string()]);
    core.stop().await;
}

#[tokio::test(start_paused = true)]
async fn catalogue_larger_than_the_queue_is_still_not_bought() {
    let gateway = MockGateway::new();
    let now = Utc::now();
    let mut listings: Vec<ListingAnnouncement> = (0..5)
        .map(|i| ListingAnnouncement {
            symbol: format!("OLD{}USDT", i),
            status: CoinStatus::Tradable,
            announced_at: now,
        })
        .collect();
    gateway.set_listings(listings.clone());
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config();
    config.queue.capacity = 2;
    config.detector.poll_interval_secs = Some(1);
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    wait_until(|| {
        let coins = store.coins();
        coins.len() == 5 && coins.iter().all(|c| c.status == CoinStatus::Tradable)
    })
    .await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(gateway.submissions().is_empty());

    listings.push(ListingAnnouncement {
        symbol: "NEWUSDT".into(),
        status: CoinStatus::Tradable,
        announced_at: now,
    });
    gateway.set_listings(listings);

    wait_until(|| !gateway.submissions().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    let bought: Vec<String> = gateway
        .submissions()
        .iter()
        .map(|s| s.request.symbol.clone())
        .collect();
    assert_eq!(bought, vec!["NEWUSDT".to_string()]);
    core.stop().await;
}

fn exchange_info(symbol: &str, status: &str) -> Vec<ListingAnnouncement> {
    let body = format!(
        r#"{{"timezone":"UTC","serverTime":1700000000000,"symbols":[{{"symbol":"{}","status":"{}","baseAsset":"NEW","quoteAsset":"USDT"}}]}}"#,
        symbol, status
    );
    serde_json::from_str::<ExchangeInfoPayload>(&body)
        .unwrap()
        .into_announcements()
}

#[tokio::test(start_paused = true)]
async fn symbol_opening_from_break_is_bought() {
    let gateway = MockGateway::new();
    gateway.set_listings(exchange_info("NEWUSDT", "BREAK"));
    let store = Arc::new(InMemoryStore::new());
    let mut config = test_config();
    config.detector.poll_interval_secs = Some(1);
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    wait_until(|| coin(&store, "NEWUSDT").is_some()).await;
    assert_eq!(coin(&store, "NEWUSDT").unwrap().status, CoinStatus::Pending);

    gateway.set_listings(exchange_info("NEWUSDT", "TRADING"));
    wait_until(|| !gateway.submissions().is_empty()).await;

    assert_eq!(coin(&store, "NEWUSDT").unwrap().status, CoinStatus::Tradable);
    assert_eq!(gateway.submissions()[0].request.symbol, "NEWUSDT");
    core.stop().await;
}

#[tokio::test(start_paused = true)]
async fn blacklisted_symbols_are_recorded_but_not_bought() {
    let gateway = MockGateway::new();
    let store = Arc::new(InMemoryStore::new());
    let mut config = push_config();
    config.auto_buy.blacklist = vec!["SCAMUSDT".into()];
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    gateway.push_listing(ListingEvent::StatusChange {
        symbol: "SCAMUSDT".into(),
        old: CoinStatus::Pending,
        new: CoinStatus::Tradable,
        at: Utc::now(),
    });

    wait_until(|| events_for(&store, "SCAMUSDT").len() == 2).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(gateway.submissions().is_empty());
    assert_eq!(core.reactor().buys_for("SCAMUSDT"), 0);
    core.stop().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_abandons_buys_still_in_their_trade_delay() {
    let gateway = MockGateway::new();
    let store = Arc::new(InMemoryStore::new());
    let mut config = push_config();
    config.auto_buy.trade_delay_ms = 60_000;
    let mut core = core(config, gateway.clone(), store.clone());
    core.start().unwrap();

    gateway.push_listing(ListingEvent::StatusChange {
        symbol: "SLOWUSDT".into(),
        old: CoinStatus::Pending,
        new: CoinStatus::Tradable,
        at: Utc::now(),
    });
    let reactor = core.reactor();
    wait_until(|| reactor.buys_for("SLOWUSDT") == 1).await;

    core.stop().await;
    assert!(gateway.submissions().is_empty());
    assert_eq!(reactor.buys_for("SLOWUSDT"), 0);
    assert!(!core.is_running());
}

#[tokio::test(start_paused = true)]
async fn core_cannot_start_twice() {
    let gateway = MockGateway::new();
    let mut core = core(test_config(), gateway, Arc::new(InMemoryStore::new()));
    core.start().unwrap();
    assert!(core.start().is_err());
    core.stop().await;
}

fn tradable_event(symbol: &str) -> CoinEvent {
    let coin = Coin::sighted(symbol, Utc::now());
    CoinEvent::status_changed(&coin, CoinStatus::Pending, CoinStatus::Tradable, Utc::now())
}

fn reactor(gateway: Arc<MockGateway>, config: &Config) -> AutoBuyReactor {
    let executor = Arc::new(OrderExecutor::new(
        gateway,
        Arc::new(InMemoryStore::new()),
        RecordingNotifier::new(),
        config.executor.retry_policy(),
    ));
    AutoBuyReactor::new(
        executor,
        RecordingNotifier::new(),
        config.auto_buy.clone(),
        CancelSignal::never(),
    )
}

#[tokio::test(start_paused = true)]
async fn redelivered_event_buys_once() {
    let gateway = MockGateway::new();
    let mut config = test_config();
    config.auto_buy.max_buys_per_symbol = 5;
    let reactor = reactor(gateway.clone(), &config);

    let event = tradable_event("ONCEUSDT");
    reactor.handle(event.clone()).await.unwrap();
    reactor.handle(event).await.unwrap();

    wait_until(|| !gateway.submissions().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.submissions().len(), 1);
    assert_eq!(reactor.buys_for("ONCEUSDT"), 1);
}

#[tokio::test(start_paused = true)]
async fn same_transition_under_a_new_event_id_buys_once() {
    let gateway = MockGateway::new();
    let mut config = test_config();
    config.auto_buy.max_buys_per_symbol = 5;
    let reactor = reactor(gateway.clone(), &config);

    let coin = Coin::sighted("TWICEUSDT", Utc::now());
    let first = CoinEvent::status_changed(&coin, CoinStatus::Pending, CoinStatus::Tradable, Utc::now());
    let second = CoinEvent::status_changed(&coin, CoinStatus::Pending, CoinStatus::Tradable, Utc::now());
    assert_ne!(first.id, second.id);

    reactor.handle(first).await.unwrap();
    reactor.handle(second).await.unwrap();

    wait_until(|| !gateway.submissions().is_empty()).await;
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(gateway.submissions().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn event_trade_amount_overrides_the_default_up_to_the_cap() {
    let gateway = MockGateway::new();
    let config = test_config();
    let reactor = reactor(gateway.clone(), &config);

    let modest = tradable_event("AAAUSDT").with_metadata("tradeAmount", serde_json::json!(25));
    let greedy = tradable_event("BBBUSDT").with_metadata("tradeAmount", serde_json::json!("5000"));
    assert_eq!(reactor.trade_amount(&modest), dec!(25));
    assert_eq!(reactor.trade_amount(&greedy), dec!(100));

    reactor.handle(modest).await.unwrap();
    wait_until(|| !gateway.submissions().is_empty()).await;
    assert_eq!(gateway.submissions()[0].request.quantity, dec!(25));
}

#[tokio::test(start_paused = true)]
async fn failed_buy_frees_the_symbol_slot() {
    let gateway = MockGateway::new();
    gateway.fail_submissions(vec![listing_sniper::domain::errors::ExchangeError::Authentication(
        "Invalid API-key".into(),
    )]);
    let config = test_config();
    let reactor = reactor(gateway.clone(), &config);

    reactor.handle(tradable_event("FAILUSDT")).await.unwrap();
    assert_eq!(reactor.buys_for("FAILUSDT"), 1);
    wait_until(|| reactor.buys_for("FAILUSDT") == 0).await;

    reactor.handle(tradable_event("FAILUSDT")).await.unwrap();
    wait_until(|| gateway.submissions().len() == 2).await;
}

#[tokio::test(start_paused = true)]
async fn processor_restores_a_missing_detection_event() {
    let store = Arc::new(InMemoryStore::new());
    let first_seen = Utc::now();
    let orphan = Coin::sighted("XYZUSDT", first_seen);
    store.upsert_coin_by_symbol(orphan.clone()).await.unwrap();
    assert!(events_for(&store, "XYZUSDT").is_empty());

    let queue = Arc::new(EventQueue::new(16));
    let processor = EventProcessor::new(
        queue.clone(),
        store.clone(),
        Arc::new(BroadcastEventBus::new(16)),
        Duration::from_millis(100),
    );

    let sighted = Coin::sighted("XYZUSDT", Utc::now());
    assert!(queue.push(QueueItem {
        event: CoinEvent::detected(&sighted, Utc::now()),
        coin: sighted,
        priority: PRIORITY_PUSH,
        action: QueueAction::CreateCoin,
    }));
    assert_eq!(processor.drain().await, 1);

    let events = events_for(&store, "XYZUSDT");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, CoinEventKind::Detected);
    assert_eq!(events[0].coin_id, orphan.id);
    assert_eq!(events[0].new_status, CoinStatus::Pending);
    assert_eq!(events[0].timestamp, first_seen);
}
