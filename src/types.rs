//! Normalized market data types shared by all exchange adapters
//!
//! Every venue-specific message is decoded into [`DepthUpdate`] or
//! [`Snapshot`] before it reaches the order book. Identifier fields a
//! venue does not populate are set to the `0` sentinel; each adapter
//! documents which fields it fills.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Price level (price, quantity pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// How a venue sequences its depth updates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencingMode {
    /// Updates carry a `[first, last]` id range (Binance spot)
    UpdateRange,
    /// Each update links to the previous one's final id (Binance
    /// futures `pu`, Bybit sequential `u`)
    PrevLink,
    /// No usable ids; the venue event clock must not go backwards
    /// (Coinbase, Kraken)
    EventClock,
}

/// Incremental depth change set, normalized across venues
///
/// `first_update_id`/`last_update_id` are filled in range and
/// prev-link modes, `prev_last_update_id` only in prev-link mode, and
/// `event_time` (venue clock, milliseconds) wherever the venue sends
/// one. Unused fields are `0`.
#[derive(Debug, Clone, Default)]
pub struct DepthUpdate {
    pub first_update_id: u64,
    pub last_update_id: u64,
    pub prev_last_update_id: u64,
    pub event_time: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Full book state at one sequenced instant
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Deserialize a Decimal from its string representation
pub(crate) fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let s: &str = Deserialize::deserialize(deserializer)?;
    Decimal::from_str(s).map_err(serde::de::Error::custom)
}

/// Deserialize price levels from an array of `["price", "qty"]` pairs
pub(crate) fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("invalid price level format"));
            }
            Ok(PriceLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                quantity: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}
