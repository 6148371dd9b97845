// src/adapter/coordinator.rs
// Execution core coordinator: wires the detector, queue, processor and reactor

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::application::queue::EventQueue;
use crate::application::service::{EventProcessor, ListingDetector};
use crate::application::usecase::{AutoBuyReactor, OrderExecutor, SniperShotController};
use crate::config::Config;
use crate::domain::context::{CancelHandle, CancelSignal};
use crate::domain::errors::{AppError, AppResult};
use crate::domain::models::CoinEventKind;
use crate::domain::repository::{CoinRepository, ExchangeGateway, OrderRepository};
use crate::domain::service::{EventBus, GatewayPriceChecker, Notifier};

pub struct ExecutionCore {
    config: Config,
    bus: Arc<dyn EventBus>,
    queue: Arc<EventQueue>,
    executor: Arc<OrderExecutor>,
    sniper: Arc<SniperShotController>,
    detector: Arc<ListingDetector>,
    processor: Arc<EventProcessor>,
    reactor: Arc<AutoBuyReactor>,
    shutdown: CancelHandle,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl ExecutionCore {
    pub fn new(
        config: Config,
        gateway: Arc<dyn ExchangeGateway>,
        coins: Arc<dyn CoinRepository>,
        orders: Arc<dyn OrderRepository>,
        bus: Arc<dyn EventBus>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let shutdown = CancelHandle::new();

        let executor = Arc::new(OrderExecutor::new(
            gateway.clone(),
            orders,
            notifier.clone(),
            config.executor.retry_policy(),
        ));

        let sniper = Arc::new(SniperShotController::new(
            Arc::new(GatewayPriceChecker::new(gateway.clone())),
            executor.clone(),
            config.sniper.clone(),
            config.executor.not_yet_tradable.clone(),
        ));

        let queue = Arc::new(EventQueue::new(config.queue.capacity));

        let detector = Arc::new(ListingDetector::new(
            gateway,
            coins.clone(),
            queue.clone(),
            config.detector.clone(),
        ));

        let processor = Arc::new(EventProcessor::new(
            queue.clone(),
            coins,
            bus.clone(),
            config.queue.drain_interval(),
        ));

        let reactor = Arc::new(AutoBuyReactor::new(
            executor.clone(),
            notifier,
            config.auto_buy.clone(),
            shutdown.signal(),
        ));

        Self {
            config,
            bus,
            queue,
            executor,
            sniper,
            detector,
            processor,
            reactor,
            shutdown,
            tasks: Vec::new(),
            running: false,
        }
    }

    pub fn start(&mut self) -> AppResult<()> {
        if self.running {
            return Err(AppError::Unknown("Execution core already started".to_string()));
        }
        let signal = self.shutdown.signal();

        // Subscribe before anything can publish.
        if self.config.auto_buy.enabled {
            self.tasks.push(self.bus.subscribe(
                CoinEventKind::StatusChanged,
                self.reactor.clone(),
                signal.clone(),
            ));
        } else {
            log::info!("Auto-buy disabled");
        }

        let processor = self.processor.clone();
        let processor_signal = signal.clone();
        self.tasks
            .push(tokio::spawn(async move { processor.run(processor_signal).await }));

        self.tasks.extend(self.detector.start(signal));

        self.running = true;
        log::info!("Execution core started");
        Ok(())
    }

    /// Signal every task to stop, wait up to the configured grace period,
    /// then abort whatever is still running.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        self.shutdown.cancel();

        let mut tasks = std::mem::take(&mut self.tasks);
        tasks.extend(self.reactor.take_tasks());

        let grace = self.config.shutdown.grace_period();
        let deadline = Instant::now() + grace;
        let mut aborted = 0;
        for mut task in tasks {
            if tokio::time::timeout_at(deadline, &mut task).await.is_err() {
                task.abort();
                aborted += 1;
            }
        }

        if aborted > 0 {
            log::warn!("Aborted {} task(s) still running after {:?}", aborted, grace);
        }
        if !self.queue.is_empty() {
            log::info!("{} queued event(s) discarded at shutdown", self.queue.len());
        }
        self.running = false;
        log::info!("Execution core stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn shutdown_signal(&self) -> CancelSignal {
        self.shutdown.signal()
    }

    pub fn sniper(&self) -> Arc<SniperShotController> {
        self.sniper.clone()
    }

    pub fn executor(&self) -> Arc<OrderExecutor> {
        self.executor.clone()
    }

    pub fn queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    pub fn detector(&self) -> Arc<ListingDetector> {
        self.detector.clone()
    }

    pub fn reactor(&self) -> Arc<AutoBuyReactor> {
        self.reactor.clone()
    }
}
