//! Coinbase Exchange adapter
//!
//! Event-clock sequencing: `l2update` messages carry an RFC 3339 `time`
//! and absolute sizes per changed level; there are no usable sequence
//! ids on the level2 channel. Sentinels: all id fields are `0`, and
//! the snapshot's `last_update_id` comes from the REST book's
//! `sequence` for logging only.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use super::ws::{spawn_reader, WsConn};
use super::{split_symbol, Exchange, ExchangeName, UPDATE_CHANNEL_CAPACITY};
use crate::error::{MonitorError, Result};
use crate::types::{DepthUpdate, PriceLevel, SequencingMode, Snapshot};

const WS_ENDPOINT: &str = "wss://ws-feed.exchange.coinbase.com";
const REST_ENDPOINT: &str = "https://api.exchange.coinbase.com";
const USER_AGENT: &str = "orderbook-monitor/0.1";

#[derive(Debug, Deserialize)]
struct L2Update {
    #[serde(rename = "type")]
    message_type: String,
    time: String,
    /// `[side, price, size]` triples
    changes: Vec<[String; 3]>,
}

/// REST book levels are `[price, size, num_orders]` with a numeric
/// third element, so the shared string-pair deserializer does not fit.
#[derive(Debug, Deserialize)]
struct RestBook {
    sequence: u64,
    bids: Vec<(String, String, serde_json::Value)>,
    asks: Vec<(String, String, serde_json::Value)>,
}

fn rest_levels(raw: Vec<(String, String, serde_json::Value)>) -> Result<Vec<PriceLevel>> {
    raw.into_iter()
        .map(|(price, size, _)| {
            Ok(PriceLevel {
                price: Decimal::from_str(&price)
                    .map_err(|e| MonitorError::Parse(e.to_string()))?,
                quantity: Decimal::from_str(&size)
                    .map_err(|e| MonitorError::Parse(e.to_string()))?,
            })
        })
        .collect()
}

pub struct CoinbaseAdapter {
    product_id: String,
    http: reqwest::Client,
    updates_rx: Option<mpsc::Receiver<DepthUpdate>>,
    close_tx: watch::Sender<bool>,
}

impl CoinbaseAdapter {
    pub fn new(symbol: &str) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            product_id: product_id_for(symbol),
            http: reqwest::Client::new(),
            updates_rx: None,
            close_tx,
        }
    }
}

/// `BTCUSDT` -> `BTC-USD` (Coinbase quotes its majors in USD)
fn product_id_for(symbol: &str) -> String {
    match split_symbol(&symbol.to_uppercase()) {
        Some((base, quote)) => {
            let quote = match quote {
                "USDT" | "USDC" | "BUSD" => "USD",
                other => other,
            };
            format!("{base}-{quote}")
        }
        None => symbol.to_uppercase(),
    }
}

fn parse_message(raw: &str) -> Option<DepthUpdate> {
    let update: L2Update = match serde_json::from_str(raw) {
        Ok(update) => update,
        Err(_) => {
            trace!(msg = raw, "ignoring non-l2update message");
            return None;
        }
    };
    if update.message_type != "l2update" {
        // The channel's own snapshot message is superseded by the
        // REST book; subscriptions and heartbeats carry no levels.
        return None;
    }

    let event_time = chrono::DateTime::parse_from_rfc3339(&update.time)
        .ok()?
        .timestamp_millis()
        .max(0) as u64;

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    for [side, price, size] in &update.changes {
        let price = Decimal::from_str(price).ok()?;
        let quantity = Decimal::from_str(size).ok()?;
        match side.as_str() {
            "buy" => bids.push(PriceLevel::new(price, quantity)),
            "sell" => asks.push(PriceLevel::new(price, quantity)),
            _ => return None,
        }
    }

    Some(DepthUpdate {
        event_time,
        bids,
        asks,
        ..Default::default()
    })
}

#[async_trait]
impl Exchange for CoinbaseAdapter {
    fn name(&self) -> ExchangeName {
        ExchangeName::Coinbase
    }

    fn mode(&self) -> SequencingMode {
        SequencingMode::EventClock
    }

    async fn connect(&mut self) -> Result<()> {
        let mut conn = WsConn::connect(WS_ENDPOINT).await?;

        let subscribe = serde_json::json!({
            "type": "subscribe",
            "product_ids": [self.product_id],
            "channels": ["level2_batch"],
        });
        conn.send_text(subscribe.to_string()).await?;

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        self.updates_rx = Some(rx);
        spawn_reader(conn, self.name(), tx, self.close_tx.subscribe(), parse_message);
        Ok(())
    }

    async fn get_snapshot(&self) -> Result<Snapshot> {
        let url = format!(
            "{REST_ENDPOINT}/products/{}/book?level=2",
            self.product_id
        );
        let book: RestBook = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitorError::Snapshot(e.to_string()))?
            .json()
            .await?;

        Ok(Snapshot {
            last_update_id: book.sequence,
            bids: rest_levels(book.bids)?,
            asks: rest_levels(book.asks)?,
        })
    }

    fn updates(&mut self) -> mpsc::Receiver<DepthUpdate> {
        self.updates_rx.take().unwrap_or_else(|| {
            let (_, rx) = mpsc::channel(1);
            rx
        })
    }

    async fn close(&self) {
        self.close_tx.send_replace(true);
    }
}
