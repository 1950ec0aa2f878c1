//! Supabase REST API client
//!
//! Ships stats rows to the `orderbook_snapshots` table through the
//! PostgREST endpoint. Decimals leave the exact domain here: row
//! fields are nullable binary floats.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::orderbook::Stats;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const TABLE: &str = "orderbook_snapshots";

/// One persisted stats sample
#[derive(Debug, Clone, Serialize)]
pub struct BookRow {
    pub exchange: String,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,
    pub mid_price: Option<f64>,
    pub spread: Option<f64>,
    pub bid_liquidity_05_pct: Option<f64>,
    pub ask_liquidity_05_pct: Option<f64>,
    pub bid_liquidity_2_pct: Option<f64>,
    pub ask_liquidity_2_pct: Option<f64>,
    pub bid_liquidity_10_pct: Option<f64>,
    pub ask_liquidity_10_pct: Option<f64>,
    pub total_bids_qty: Option<f64>,
    pub total_asks_qty: Option<f64>,
}

impl BookRow {
    pub fn from_stats(exchange: &str, symbol: &str, stats: &Stats) -> Self {
        // A crossed or one-sided book stores no mid
        let mid_price = match (stats.best_bid, stats.best_ask) {
            (Some(bid), Some(ask)) if ask > bid => stats.mid.and_then(|m| m.to_f64()),
            _ => None,
        };

        Self {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            best_bid: stats.best_bid.and_then(|v| v.to_f64()),
            best_ask: stats.best_ask.and_then(|v| v.to_f64()),
            mid_price,
            spread: stats.spread.and_then(|v| v.to_f64()),
            bid_liquidity_05_pct: stats.bid_liquidity_05_pct.to_f64(),
            ask_liquidity_05_pct: stats.ask_liquidity_05_pct.to_f64(),
            bid_liquidity_2_pct: stats.bid_liquidity_2_pct.to_f64(),
            ask_liquidity_2_pct: stats.ask_liquidity_2_pct.to_f64(),
            bid_liquidity_10_pct: stats.bid_liquidity_10_pct.to_f64(),
            ask_liquidity_10_pct: stats.ask_liquidity_10_pct.to_f64(),
            total_bids_qty: stats.total_bids_qty.to_f64(),
            total_asks_qty: stats.total_asks_qty.to_f64(),
        }
    }
}

pub struct SupabaseClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            http,
        })
    }

    /// Verify the table is reachable with the configured credentials
    pub async fn test_connection(&self) -> Result<()> {
        let url = format!("{}/rest/v1/{TABLE}?select=id&limit=1", self.base_url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;
        Self::check_status(response).await
    }

    /// Insert one batch of rows; all-or-nothing on the server side
    pub async fn insert_rows(&self, rows: &[BookRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let url = format!("{}/rest/v1/{TABLE}", self.base_url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await
            .map_err(|e| MonitorError::Persistence(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(MonitorError::Persistence(format!(
            "request failed with status {status}: {body}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{Side, SideBook};
    use rust_decimal_macros::dec;

    fn stats() -> Stats {
        let mut bids = SideBook::new(Side::Bid);
        let mut asks = SideBook::new(Side::Ask);
        bids.set(dec!(99.50), dec!(2));
        asks.set(dec!(100.50), dec!(1));
        Stats::compute(&bids, &asks)
    }

    #[test]
    fn test_row_field_names_match_table() {
        let row = BookRow::from_stats("binance", "BTCUSDT", &stats());
        let json = serde_json::to_value(&row).unwrap();
        for field in [
            "exchange",
            "symbol",
            "timestamp",
            "best_bid",
            "best_ask",
            "mid_price",
            "spread",
            "bid_liquidity_05_pct",
            "ask_liquidity_05_pct",
            "bid_liquidity_2_pct",
            "ask_liquidity_2_pct",
            "bid_liquidity_10_pct",
            "ask_liquidity_10_pct",
            "total_bids_qty",
            "total_asks_qty",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }

    #[test]
    fn test_timestamp_serializes_as_rfc3339() {
        let row = BookRow::from_stats("binance", "BTCUSDT", &stats());
        let json = serde_json::to_value(&row).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        assert!(DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn test_mid_present_only_for_uncrossed_two_sided_book() {
        let row = BookRow::from_stats("binance", "BTCUSDT", &stats());
        assert_eq!(row.mid_price, Some(100.0));
        assert_eq!(row.spread, Some(1.0));

        let mut bids = SideBook::new(Side::Bid);
        let asks = SideBook::new(Side::Ask);
        bids.set(dec!(99.50), dec!(2));
        let one_sided = Stats::compute(&bids, &asks);
        let row = BookRow::from_stats("binance", "BTCUSDT", &one_sided);
        assert_eq!(row.mid_price, None);
        assert_eq!(row.best_ask, None);
        assert_eq!(row.best_bid, Some(99.5));
    }

    #[test]
    fn test_liquidity_converts_to_float() {
        let row = BookRow::from_stats("binance", "BTCUSDT", &stats());
        assert_eq!(row.total_bids_qty, Some(2.0));
        assert_eq!(row.bid_liquidity_2_pct, Some(199.0));
    }
}
