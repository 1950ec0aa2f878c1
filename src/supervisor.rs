//! Multi-venue supervision
//!
//! One pipeline per venue: adapter, book, apply task, reinit timer.
//! Books never share state; the registry map and collector registry
//! have their own locks, always taken before any book lock. One
//! broadcast shutdown serves every task, and the supervisor joins all
//! pipelines before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::db::Collector;
use crate::display;
use crate::exchange::{Exchange, ExchangeName};
use crate::factory;
use crate::orderbook::OrderBook;
use crate::SharedBook;

type BookRegistry = Arc<Mutex<HashMap<ExchangeName, SharedBook>>>;

pub struct Supervisor {
    config: Config,
    collector: Option<Arc<Collector>>,
    shutdown: broadcast::Sender<()>,
}

impl Supervisor {
    pub fn new(
        config: Config,
        collector: Option<Arc<Collector>>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            config,
            collector,
            shutdown,
        }
    }

    /// Run every pipeline plus the shared consumers until shutdown
    pub async fn run(&self) {
        let books: BookRegistry = Arc::new(Mutex::new(HashMap::new()));

        let mut consumers = Vec::new();
        if let Some(collector) = &self.collector {
            let collector = collector.clone();
            let shutdown = self.shutdown.subscribe();
            consumers.push(tokio::spawn(async move {
                collector.run(shutdown).await;
            }));
        }
        consumers.push(tokio::spawn(run_stats_printer(
            books.clone(),
            self.config.log_interval,
            self.shutdown.subscribe(),
        )));

        info!(
            symbol = %self.config.symbol,
            exchanges = self.config.exchanges.len(),
            "starting exchanges"
        );
        let mut pipelines = Vec::new();
        for &name in &self.config.exchanges {
            pipelines.push(tokio::spawn(run_pipeline(
                name,
                self.config.clone(),
                books.clone(),
                self.collector.clone(),
                self.shutdown.clone(),
            )));
        }

        for pipeline in pipelines {
            let _ = pipeline.await;
        }
        // Shared consumers exit on the shutdown signal
        for consumer in consumers {
            let _ = consumer.await;
        }
    }
}

/// One venue: connect, buffer, snapshot, replay, register, then serve
/// the reinit timer until shutdown or stream end.
async fn run_pipeline(
    name: ExchangeName,
    config: Config,
    books: BookRegistry,
    collector: Option<Arc<Collector>>,
    shutdown: broadcast::Sender<()>,
) {
    info!(exchange = %name, "starting connection");

    // Subscribe before the handshake so a shutdown fired during
    // startup is not missed.
    let mut shutdown_rx = shutdown.subscribe();

    let mut adapter = factory::new_exchange(name, &config.symbol);
    if let Err(e) = adapter.connect().await {
        error!(exchange = %name, error = %e, "failed to connect");
        return;
    }
    let mut updates = adapter.updates();
    let adapter: Arc<dyn Exchange> = Arc::from(adapter);
    let book: SharedBook = Arc::new(RwLock::new(OrderBook::new(adapter.mode())));

    // The stream is live; buffer updates while the snapshot is fetched
    let apply_book = book.clone();
    let mut apply = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            apply_book.write().await.handle_depth_update(update);
        }
    });

    match adapter.get_snapshot().await {
        Ok(snapshot) => {
            let mut guard = book.write().await;
            guard.load_snapshot(snapshot);
            guard.process_buffered_events();
        }
        Err(e) => {
            error!(exchange = %name, error = %e, "failed to get snapshot");
            adapter.close().await;
            let _ = apply.await;
            return;
        }
    }
    info!(exchange = %name, "orderbook initialized");

    books.lock().await.insert(name, book.clone());
    if let Some(collector) = &collector {
        collector.register(name, book.clone()).await;
    }

    let mut ticker = interval_at(
        Instant::now() + config.reinit_check_interval,
        config.reinit_check_interval,
    );
    let mut stream_ended = false;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                check_and_reinitialize(&book, adapter.as_ref(), config.max_staleness).await;
            }
            _ = shutdown_rx.recv() => {
                info!(exchange = %name, "shutting down");
                adapter.close().await;
                break;
            }
            _ = &mut apply => {
                info!(exchange = %name, "connection closed");
                stream_ended = true;
                break;
            }
        }
    }
    if !stream_ended {
        // Let the apply task finish draining the channel
        let _ = apply.await;
    }

    if let Some(collector) = &collector {
        collector.unregister(name).await;
    }
    books.lock().await.remove(&name);
}

/// Fetch a fresh snapshot and rebuild book state when the book asks
/// for it. The stream stays up; only book state is rebuilt.
async fn check_and_reinitialize(book: &SharedBook, adapter: &dyn Exchange, max_age: Duration) {
    if !book.read().await.needs_resync(max_age) {
        return;
    }
    info!(exchange = %adapter.name(), "resynchronizing orderbook");
    match adapter.get_snapshot().await {
        Ok(snapshot) => {
            book.write().await.resync(snapshot);
            info!(exchange = %adapter.name(), "orderbook resynchronized");
        }
        Err(e) => {
            // needs_reinit stays set; the next tick retries
            warn!(exchange = %adapter.name(), error = %e, "snapshot refetch failed");
        }
    }
}

async fn run_stats_printer(
    books: BookRegistry,
    period: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut entries = Vec::new();
                {
                    let registry = books.lock().await;
                    for name in ExchangeName::all() {
                        if let Some(book) = registry.get(name) {
                            let guard = book.read().await;
                            if guard.is_initialized() {
                                entries.push((name.to_string(), guard.get_stats()));
                            }
                        }
                    }
                }
                display::print_combined_stats(&entries);
            }
            _ = shutdown.recv() => return,
        }
    }
}
