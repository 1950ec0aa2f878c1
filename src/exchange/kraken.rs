//! Kraken adapter
//!
//! Event-clock sequencing: the `book-N` feed frames its payloads as
//! JSON arrays and stamps every level with a decimal epoch-seconds
//! timestamp; the update's event time is the newest level timestamp.
//! Sentinels: all id fields are `0`, including the REST snapshot's
//! `last_update_id` (the Depth endpoint is unsequenced).

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::{mpsc, watch};
use tracing::trace;

use super::ws::{spawn_reader, WsConn};
use super::{split_symbol, Exchange, ExchangeName, UPDATE_CHANNEL_CAPACITY};
use crate::error::{MonitorError, Result};
use crate::types::{DepthUpdate, PriceLevel, SequencingMode, Snapshot};

const WS_ENDPOINT: &str = "wss://ws.kraken.com";
const REST_ENDPOINT: &str = "https://api.kraken.com/0/public";
const BOOK_DEPTH: u32 = 100;

#[derive(Debug, Deserialize)]
struct DepthResponse {
    error: Vec<String>,
    result: Option<HashMap<String, DepthResult>>,
}

#[derive(Debug, Deserialize)]
struct DepthResult {
    bids: Vec<(String, String, Value)>,
    asks: Vec<(String, String, Value)>,
}

pub struct KrakenAdapter {
    /// Websocket notation, e.g. `XBT/USD`
    ws_pair: String,
    /// REST notation, e.g. `XBTUSD`
    rest_pair: String,
    http: reqwest::Client,
    updates_rx: Option<mpsc::Receiver<DepthUpdate>>,
    close_tx: watch::Sender<bool>,
}

impl KrakenAdapter {
    pub fn new(symbol: &str) -> Self {
        let (close_tx, _) = watch::channel(false);
        let (base, quote) = kraken_pair(symbol);
        Self {
            ws_pair: format!("{base}/{quote}"),
            rest_pair: format!("{base}{quote}"),
            http: reqwest::Client::new(),
            updates_rx: None,
            close_tx,
        }
    }
}

/// `BTCUSDT` -> (`XBT`, `USD`)
fn kraken_pair(symbol: &str) -> (String, String) {
    let upper = symbol.to_uppercase();
    let (base, quote) = split_symbol(&upper).unwrap_or((upper.as_str(), ""));
    let base = match base {
        "BTC" => "XBT",
        other => other,
    };
    let quote = match quote {
        "USDT" | "USDC" | "BUSD" => "USD",
        other => other,
    };
    (base.to_string(), quote.to_string())
}

/// One `["price", "volume", "timestamp", ...]` entry; republished
/// levels carry a trailing `"r"` flag which is ignored.
fn parse_level(entry: &Value) -> Option<(PriceLevel, f64)> {
    let fields = entry.as_array()?;
    if fields.len() < 3 {
        return None;
    }
    let price = Decimal::from_str(fields[0].as_str()?).ok()?;
    let quantity = Decimal::from_str(fields[1].as_str()?).ok()?;
    let time: f64 = fields[2].as_str()?.parse().ok()?;
    Some((PriceLevel::new(price, quantity), time))
}

fn parse_message(raw: &str) -> Option<DepthUpdate> {
    let value: Value = serde_json::from_str(raw).ok()?;
    // Event messages (heartbeat, subscriptionStatus) are objects;
    // book payloads are arrays of [channelID, payload..., name, pair].
    let frame = value.as_array()?;
    if frame.len() < 4 {
        return None;
    }

    let mut bids = Vec::new();
    let mut asks = Vec::new();
    let mut newest = 0.0_f64;
    for payload in &frame[1..frame.len() - 2] {
        let object = payload.as_object()?;
        if object.contains_key("as") || object.contains_key("bs") {
            // Initial feed snapshot; the REST book supersedes it
            return None;
        }
        for (key, side) in [("b", &mut bids), ("a", &mut asks)] {
            if let Some(entries) = object.get(key).and_then(Value::as_array) {
                for entry in entries {
                    let (level, time) = parse_level(entry)?;
                    newest = newest.max(time);
                    side.push(level);
                }
            }
        }
    }
    if bids.is_empty() && asks.is_empty() {
        trace!(msg = raw, "book frame without levels");
        return None;
    }

    Some(DepthUpdate {
        event_time: (newest * 1000.0) as u64,
        bids,
        asks,
        ..Default::default()
    })
}

fn rest_levels(raw: Vec<(String, String, Value)>) -> Result<Vec<PriceLevel>> {
    raw.into_iter()
        .map(|(price, volume, _)| {
            Ok(PriceLevel {
                price: Decimal::from_str(&price)
                    .map_err(|e| MonitorError::Parse(e.to_string()))?,
                quantity: Decimal::from_str(&volume)
                    .map_err(|e| MonitorError::Parse(e.to_string()))?,
            })
        })
        .collect()
}

#[async_trait]
impl Exchange for KrakenAdapter {
    fn name(&self) -> ExchangeName {
        ExchangeName::Kraken
    }

    fn mode(&self) -> SequencingMode {
        SequencingMode::EventClock
    }

    async fn connect(&mut self) -> Result<()> {
        let mut conn = WsConn::connect(WS_ENDPOINT).await?;

        let subscribe = serde_json::json!({
            "event": "subscribe",
            "pair": [self.ws_pair],
            "subscription": {"name": "book", "depth": BOOK_DEPTH},
        });
        conn.send_text(subscribe.to_string()).await?;

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        self.updates_rx = Some(rx);
        spawn_reader(conn, self.name(), tx, self.close_tx.subscribe(), parse_message);
        Ok(())
    }

    async fn get_snapshot(&self) -> Result<Snapshot> {
        let url = format!(
            "{REST_ENDPOINT}/Depth?pair={}&count={BOOK_DEPTH}",
            self.rest_pair
        );
        let response: DepthResponse = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| MonitorError::Snapshot(e.to_string()))?
            .json()
            .await?;

        if !response.error.is_empty() {
            return Err(MonitorError::Snapshot(response.error.join(", ")));
        }
        // The result is keyed by Kraken's internal pair name
        // (e.g. XXBTZUSD); a single pair was requested.
        let book = response
            .result
            .and_then(|mut result| result.drain().next().map(|(_, book)| book))
            .ok_or_else(|| MonitorError::Snapshot("kraken response missing result".to_string()))?;

        Ok(Snapshot {
            last_update_id: 0,
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pair_mapping() {
        assert_eq!(
            kraken_pair("BTCUSDT"),
            ("XBT".to_string(), "USD".to_string())
        );
        assert_eq!(
            kraken_pair("ETHEUR"),
            ("ETH".to_string(), "EUR".to_string())
        );
    }

    #[test]
    fn test_parse_book_update() {
        let raw = r#"[1234,
            {"b": [["5541.30000", "2.50700000", "1534614248.456738"]],
             "c": "974942666"},
            "book-100",
            "XBT/USD"]"#;

        let update = parse_message(raw).unwrap();
        assert_eq!(update.bids[0], PriceLevel::new(dec!(5541.30000), dec!(2.50700000)));
        assert!(update.asks.is_empty());
        assert_eq!(update.event_time, 1534614248456);
    }

    #[test]
    fn test_parse_split_sides_takes_newest_time() {
        let raw = r#"[1234,
            {"a": [["5541.30000", "2.50700000", "1534614248.123456"]]},
            {"b": [["5541.20000", "0.00000000", "1534614248.789012"]]},
            "book-100",
            "XBT/USD"]"#;

        let update = parse_message(raw).unwrap();
        assert_eq!(update.asks.len(), 1);
        assert_eq!(update.bids[0].quantity, dec!(0));
        assert_eq!(update.event_time, 1534614248789);
    }

    #[test]
    fn test_feed_snapshot_and_events_ignored() {
        let snapshot = r#"[1234,
            {"as": [["5541.30000", "2.50700000", "1534614248.123678"]],
             "bs": [["5541.20000", "1.52900000", "1534614248.765567"]]},
            "book-100",
            "XBT/USD"]"#;
        assert!(parse_message(snapshot).is_none());

        let heartbeat = r#"{"event":"heartbeat"}"#;
        assert!(parse_message(heartbeat).is_none());
    }

    #[test]
    fn test_republished_levels_keep_extra_flag() {
        let raw = r#"[1234,
            {"a": [["5541.30000", "2.50700000", "1534614248.123456", "r"]]},
            "book-100",
            "XBT/USD"]"#;
        let update = parse_message(raw).unwrap();
        assert_eq!(update.asks.len(), 1);
    }

    #[test]
    fn test_rest_depth_decodes() {
        let raw = r#"{
            "error": [],
            "result": {
                "XXBTZUSD": {
                    "asks": [["52523.00000", "1.199", 1616663113]],
                    "bids": [["52522.90000", "0.753", 1616663112]]
                }
            }
        }"#;
        let response: DepthResponse = serde_json::from_str(raw).unwrap();
        let book = response.result.unwrap().remove("XXBTZUSD").unwrap();
        assert_eq!(rest_levels(book.asks).unwrap()[0].price, dec!(52523.00000));
    }
}
