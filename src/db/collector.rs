//! Periodic stats collection into Supabase
//!
//! A pure consumer: samples every registered initialized book on a
//! timer, ships one batch, and never blocks or influences ingestion.
//! A failed batch is logged and discarded; the next tick samples
//! fresh data.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use super::{BookRow, SupabaseClient};
use crate::exchange::ExchangeName;
use crate::SharedBook;

pub struct Collector {
    client: SupabaseClient,
    symbol: String,
    interval: Duration,
    books: RwLock<HashMap<ExchangeName, SharedBook>>,
}

impl Collector {
    pub fn new(client: SupabaseClient, symbol: &str, interval: Duration) -> Self {
        Self {
            client,
            symbol: symbol.to_string(),
            interval,
            books: RwLock::new(HashMap::new()),
        }
    }

    pub async fn register(&self, exchange: ExchangeName, book: SharedBook) {
        self.books.write().await.insert(exchange, book);
        info!(exchange = %exchange, "registered orderbook for collection");
    }

    pub async fn unregister(&self, exchange: ExchangeName) {
        self.books.write().await.remove(&exchange);
        info!(exchange = %exchange, "unregistered orderbook from collection");
    }

    /// Tick until shutdown
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        // First batch after one full interval, like a ticker
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        info!(
            symbol = %self.symbol,
            interval_secs = self.interval.as_secs(),
            "starting data collection"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => self.collect_and_store().await,
                _ = shutdown.recv() => {
                    info!("data collection stopped");
                    return;
                }
            }
        }
    }

    async fn collect_and_store(&self) {
        // Sample under a short registry read; concurrent register and
        // unregister only affect the next tick.
        let books: Vec<(ExchangeName, SharedBook)> = self
            .books
            .read()
            .await
            .iter()
            .map(|(name, book)| (*name, book.clone()))
            .collect();

        if books.is_empty() {
            debug!("no orderbooks registered, skipping collection");
            return;
        }

        let mut rows = Vec::with_capacity(books.len());
        for (exchange, book) in books {
            let guard = book.read().await;
            if !guard.is_initialized() {
                debug!(exchange = %exchange, "skipping uninitialized orderbook");
                continue;
            }
            debug!(
                exchange = %exchange,
                bids = guard.get_bids().len(),
                asks = guard.get_asks().len(),
                "sampling orderbook"
            );
            rows.push(BookRow::from_stats(
                exchange.as_str(),
                &self.symbol,
                &guard.get_stats(),
            ));
        }

        if rows.is_empty() {
            warn!("no valid rows to store");
            return;
        }

        match self.client.insert_rows(&rows).await {
            Ok(()) => info!(count = rows.len(), "stored stats batch"),
            Err(e) => error!(count = rows.len(), error = %e, "failed to store stats batch"),
        }
    }
}
