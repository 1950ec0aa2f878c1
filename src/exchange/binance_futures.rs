//! Binance USD-M futures adapter
//!
//! Prev-link sequencing: futures depth events carry `pu`, the final id
//! of the previous event, which must equal the book's last applied
//! id. `first_update_id` is still populated from `U` for logging.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use super::ws::{spawn_reader, WsConn};
use super::{Exchange, ExchangeName, UPDATE_CHANNEL_CAPACITY};
use crate::error::{MonitorError, Result};
use crate::types::{
    deserialize_price_levels, DepthUpdate, PriceLevel, SequencingMode, Snapshot,
};

const WS_ENDPOINT: &str = "wss://fstream.binance.com/ws";
const REST_ENDPOINT: &str = "https://fapi.binance.com/fapi/v1";
const SNAPSHOT_DEPTH: u32 = 1000;

#[derive(Debug, Deserialize)]
struct DiffDepthEvent {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "E")]
    event_time: u64,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    final_update_id: u64,
    #[serde(rename = "pu")]
    prev_final_update_id: u64,
    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,
    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
}

#[derive(Debug, Deserialize)]
struct RestSnapshot {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    #[serde(deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,
    #[serde(deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
}

pub struct BinanceFuturesAdapter {
    symbol: String,
    http: reqwest::Client,
    updates_rx: Option<mpsc::Receiver<DepthUpdate>>,
    close_tx: watch::Sender<bool>,
}

impl BinanceFuturesAdapter {
    pub fn new(symbol: &str) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            symbol: symbol.to_uppercase(),
            http: reqwest::Client::new(),
            updates_rx: None,
            close_tx,
        }
    }
}

fn parse_message(raw: &str) -> Option<DepthUpdate> {
    let event: DiffDepthEvent = match serde_json::from_str(raw) {
        Ok(event) => event,
        Err(_) => {
            trace!(msg = raw, "ignoring non-depth message");
            return None;
        }
    };
    if event.event_type != "depthUpdate" {
        return None;
    }
    Some(DepthUpdate {
        first_update_id: event.first_update_id,
        last_update_id: event.final_update_id,
        prev_last_update_id: event.prev_final_update_id,
        event_time: event.event_time,
        bids: event.bids,
        asks: event.asks,
    })
}

#[async_trait]
impl Exchange for BinanceFuturesAdapter {
    fn name(&self) -> ExchangeName {
        ExchangeName::BinanceFutures
    }

    fn mode(&self) -> SequencingMode {
        SequencingMode::PrevLink
    }

    async fn connect(&mut self) -> Result<()> {
        let url = format!(
            "{WS_ENDPOINT}/{}@depth@100ms",
            self.symbol.to_lowercase()
        );
        let conn = WsConn::connect(&url).await?;

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        self.updates_rx = Some(rx);
        spawn_reader(conn, self.name(), tx, self.close_tx.subscribe(), parse_message);
        Ok(())
    }

    async fn get_snapshot(&self) -> Result<Snapshot> {
        let url = format!(
            "{REST_ENDPOINT}/depth?symbol={}&limit={SNAPSHOT_DEPTH}",
            self.symbol
        );
        let snapshot: RestSnapshot = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitorError::Snapshot(e.to_string()))?
            .json()
            .await?;

        Ok(Snapshot {
            last_update_id: snapshot.last_update_id,
            bids: snapshot.bids,
            asks: snapshot.asks,
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
