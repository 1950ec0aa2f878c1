//! Exchange adapter contract and venue registry
//!
//! Each venue connector normalizes its wire protocol into
//! [`DepthUpdate`]s in one declared [`SequencingMode`]; the order book
//! engine dispatches on the mode and never on venue identity.

mod binance;
mod binance_futures;
mod bybit;
mod coinbase;
mod kraken;
pub(crate) mod ws;

pub use binance::BinanceAdapter;
pub use binance_futures::BinanceFuturesAdapter;
pub use bybit::{BybitAdapter, BybitCategory};
pub use coinbase::CoinbaseAdapter;
pub use kraken::KrakenAdapter;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{MonitorError, Result};
use crate::types::{DepthUpdate, SequencingMode, Snapshot};

/// Capacity of the per-adapter update channel. Slow consumption shows
/// up as socket-level pushback, not unbounded memory growth.
pub(crate) const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Supported venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExchangeName {
    Binance,
    BinanceFutures,
    Bybit,
    BybitFutures,
    Coinbase,
    Kraken,
}

impl ExchangeName {
    pub fn all() -> &'static [ExchangeName] {
        &[
            ExchangeName::BinanceFutures,
            ExchangeName::Binance,
            ExchangeName::BybitFutures,
            ExchangeName::Bybit,
            ExchangeName::Coinbase,
            ExchangeName::Kraken,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeName::Binance => "binance",
            ExchangeName::BinanceFutures => "binancef",
            ExchangeName::Bybit => "bybit",
            ExchangeName::BybitFutures => "bybitf",
            ExchangeName::Coinbase => "coinbase",
            ExchangeName::Kraken => "kraken",
        }
    }
}

impl fmt::Display for ExchangeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeName {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "binance" => Ok(ExchangeName::Binance),
            "binancef" => Ok(ExchangeName::BinanceFutures),
            "bybit" => Ok(ExchangeName::Bybit),
            "bybitf" => Ok(ExchangeName::BybitFutures),
            "coinbase" => Ok(ExchangeName::Coinbase),
            "kraken" => Ok(ExchangeName::Kraken),
            other => Err(MonitorError::Config(format!("unknown exchange: {other}"))),
        }
    }
}

/// Per-venue connector
///
/// Lifecycle: `connect` opens the stream and starts the internal
/// reader; `updates` hands out the single consumer end; `get_snapshot`
/// is independent of the stream and may be called at any time after
/// construction; `close` is idempotent and safe to call concurrently
/// with a consumer still draining.
#[async_trait]
pub trait Exchange: Send + Sync {
    fn name(&self) -> ExchangeName;

    fn mode(&self) -> SequencingMode;

    /// Establish the stream; updates begin flowing into the channel
    /// returned by [`updates`](Exchange::updates) immediately.
    async fn connect(&mut self) -> Result<()>;

    /// Point-in-time REST snapshot of the full book
    async fn get_snapshot(&self) -> Result<Snapshot>;

    /// The update stream. Single consumer; channel closure signals
    /// disconnect (explicit close and stream exhaustion look alike).
    fn updates(&mut self) -> mpsc::Receiver<DepthUpdate>;

    /// Stop the reader and release the connection
    async fn close(&self);
}

/// Split a monitor symbol like `BTCUSDT` into base and quote
pub(crate) fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    const QUOTES: &[&str] = &["USDT", "USDC", "BUSD", "USD", "EUR", "BTC", "ETH"];
    for quote in QUOTES {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return Some((base, quote));
            }
        }
    }
    None
}
