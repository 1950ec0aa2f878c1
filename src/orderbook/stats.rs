//! Derived order book statistics
//!
//! Pure read-only derivation from the two side books; callers hold a
//! read lock for the duration of one call, so each `Stats` value is a
//! consistent per-book view.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::SideBook;

/// Snapshot of derived book statistics
///
/// Liquidity fields are quote-currency sums (price * qty) within the
/// named band of the best price on that side; totals are raw
/// quantities. Deltas are bid minus ask liquidity for the band.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub spread: Option<Decimal>,

    pub bid_liquidity_05_pct: Decimal,
    pub ask_liquidity_05_pct: Decimal,
    pub delta_liquidity_05_pct: Decimal,

    pub bid_liquidity_2_pct: Decimal,
    pub ask_liquidity_2_pct: Decimal,
    pub delta_liquidity_2_pct: Decimal,

    pub bid_liquidity_10_pct: Decimal,
    pub ask_liquidity_10_pct: Decimal,
    pub delta_liquidity_10_pct: Decimal,

    pub total_bids_qty: Decimal,
    pub total_asks_qty: Decimal,
}

impl Stats {
    pub fn compute(bids: &SideBook, asks: &SideBook) -> Self {
        let band_05 = Decimal::new(5, 3); // 0.5%
        let band_2 = Decimal::new(2, 2); // 2%
        let band_10 = Decimal::new(1, 1); // 10%

        let best_bid = bids.best().map(|(p, _)| p);
        let best_ask = asks.best().map(|(p, _)| p);

        let (mid, spread) = match (best_bid, best_ask) {
            (Some(bb), Some(ba)) => (Some((bb + ba) / Decimal::TWO), Some(ba - bb)),
            _ => (None, None),
        };

        let bid_band = |pct| best_bid.map_or(Decimal::ZERO, |bb| bids.sum_within(bb, pct));
        let ask_band = |pct| best_ask.map_or(Decimal::ZERO, |ba| asks.sum_within(ba, pct));

        let bid_liquidity_05_pct = bid_band(band_05);
        let ask_liquidity_05_pct = ask_band(band_05);
        let bid_liquidity_2_pct = bid_band(band_2);
        let ask_liquidity_2_pct = ask_band(band_2);
        let bid_liquidity_10_pct = bid_band(band_10);
        let ask_liquidity_10_pct = ask_band(band_10);

        Self {
            best_bid,
            best_ask,
            mid,
            spread,
            delta_liquidity_05_pct: bid_liquidity_05_pct - ask_liquidity_05_pct,
            delta_liquidity_2_pct: bid_liquidity_2_pct - ask_liquidity_2_pct,
            delta_liquidity_10_pct: bid_liquidity_10_pct - ask_liquidity_10_pct,
            bid_liquidity_05_pct,
            ask_liquidity_05_pct,
            bid_liquidity_2_pct,
            ask_liquidity_2_pct,
            bid_liquidity_10_pct,
            ask_liquidity_10_pct,
            total_bids_qty: bids.total_qty(),
            total_asks_qty: asks.total_qty(),
        }
    }
}
