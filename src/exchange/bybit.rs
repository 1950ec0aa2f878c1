//! Bybit v5 adapter (spot and linear)
//!
//! Prev-link sequencing: the `orderbook.*` topic's `u` is sequential
//! per book, so each delta links to `u - 1`. A `type: "snapshot"`
//! message mid-stream (service restart) resets `u`; the resulting
//! link break is what flags the book for reinit. The REST book's `u`
//! seeds `last_update_id`.

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

const WS_ENDPOINT: &str = "wss://stream.bybit.com/v5/public";
const REST_ENDPOINT: &str = "https://api.bybit.com/v5/market";
const BOOK_DEPTH: u32 = 50;

/// Bybit market category, selecting endpoint and venue name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BybitCategory {
    Spot,
    Linear,
}

impl BybitCategory {
    fn as_str(&self) -> &'static str {
        match self {
            BybitCategory::Spot => "spot",
            BybitCategory::Linear => "linear",
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopicMessage {
    topic: String,
    #[serde(rename = "type")]
    message_type: String,
    ts: u64,
    data: BookData,
}

#[derive(Debug, Deserialize)]
struct BookData {
    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,
    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
    #[serde(rename = "u")]
    update_id: u64,
}

#[derive(Debug, Deserialize)]
struct RestBookResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    result: Option<RestBook>,
}

#[derive(Debug, Deserialize)]
struct RestBook {
    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    bids: Vec<PriceLevel>,
    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    asks: Vec<PriceLevel>,
    #[serde(rename = "u")]
    update_id: u64,
}

pub struct BybitAdapter {
    symbol: String,
    category: BybitCategory,
    http: reqwest::Client,
    updates_rx: Option<mpsc::Receiver<DepthUpdate>>,
    close_tx: watch::Sender<bool>,
}

impl BybitAdapter {
    pub fn new(symbol: &str, category: BybitCategory) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            symbol: symbol.to_uppercase(),
            category,
            http: reqwest::Client::new(),
            updates_rx: None,
            close_tx,
        }
    }
}

fn parse_message(raw: &str) -> Option<DepthUpdate> {
    let message: TopicMessage = match serde_json::from_str(raw) {
        Ok(message) => message,
        Err(_) => {
            trace!(msg = raw, "ignoring non-book message");
            return None;
        }
    };
    if !message.topic.starts_with("orderbook.") {
        return None;
    }
    if message.message_type == "snapshot" {
        trace!(topic = %message.topic, "stream snapshot, sequence restarts");
    }
    // Snapshots restart the sequence; deltas chain one by one. Either
    // way the update links to the id right before it.
    let update_id = message.data.update_id;
    Some(DepthUpdate {
        first_update_id: update_id,
        last_update_id: update_id,
        prev_last_update_id: update_id.saturating_sub(1),
        event_time: message.ts,
        bids: message.data.bids,
        asks: message.data.asks,
    })
}

#[async_trait]
impl Exchange for BybitAdapter {
    fn name(&self) -> ExchangeName {
        match self.category {
            BybitCategory::Spot => ExchangeName::Bybit,
            BybitCategory::Linear => ExchangeName::BybitFutures,
        }
    }

    fn mode(&self) -> SequencingMode {
        SequencingMode::PrevLink
    }

    async fn connect(&mut self) -> Result<()> {
        let url = format!("{WS_ENDPOINT}/{}", self.category.as_str());
        let mut conn = WsConn::connect(&url).await?;

        let subscribe = serde_json::json!({
            "op": "subscribe",
            "args": [format!("orderbook.{BOOK_DEPTH}.{}", self.symbol)],
        });
        conn.send_text(subscribe.to_string()).await?;

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        self.updates_rx = Some(rx);
        spawn_reader(conn, self.name(), tx, self.close_tx.subscribe(), parse_message);
        Ok(())
    }

    async fn get_snapshot(&self) -> Result<Snapshot> {
        let url = format!(
            "{REST_ENDPOINT}/orderbook?category={}&symbol={}&limit={BOOK_DEPTH}",
            self.category.as_str(),
            self.symbol
        );
        let response: RestBookResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitorError::Snapshot(e.to_string()))?
            .json()
            .await?;

        if response.ret_code != 0 {
            return Err(MonitorError::Snapshot(format!(
                "bybit retCode {}: {}",
                response.ret_code, response.ret_msg
            )));
        }
        let book = response
            .result
            .ok_or_else(|| MonitorError::Snapshot("bybit response missing result".to_string()))?;

        Ok(Snapshot {
            last_update_id: book.update_id,
            bids: book.bids,
            asks: book.asks,
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
