//! Per-side price level store
//!
//! Uses BTreeMap for efficient sorted price level management. Bids
//! iterate highest-first, asks lowest-first; the direction is a
//! property of the container.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

use super::Side;
use crate::types::PriceLevel;

/// Ordered price -> quantity store for one side of the book
///
/// No stored quantity is ever zero: `set` with a zero quantity
/// deletes the level.
#[derive(Debug, Clone)]
pub struct SideBook {
    side: Side,
    levels: BTreeMap<Decimal, Decimal>,
}

impl SideBook {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    /// Insert or overwrite a level; zero quantity removes it
    pub fn set(&mut self, price: Decimal, quantity: Decimal) {
        if quantity.is_zero() {
            self.levels.remove(&price);
        } else {
            self.levels.insert(price, quantity);
        }
    }

    /// Best price and its quantity, if any
    pub fn best(&self) -> Option<(Decimal, Decimal)> {
        let entry = match self.side {
            Side::Bid => self.levels.last_key_value(),
            Side::Ask => self.levels.first_key_value(),
        };
        entry.map(|(p, q)| (*p, *q))
    }

    /// Levels in traversal order, best first
    pub fn iter_from_best(&self) -> Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> {
        match self.side {
            Side::Bid => Box::new(self.levels.iter().rev()),
            Side::Ask => Box::new(self.levels.iter()),
        }
    }

    /// Quote-currency liquidity within `pct` of `reference`
    ///
    /// Sums `price * qty` over `[reference * (1 - pct), reference]`
    /// for bids and `[reference, reference * (1 + pct)]` for asks.
    pub fn sum_within(&self, reference: Decimal, pct: Decimal) -> Decimal {
        let one = Decimal::ONE;
        let range = match self.side {
            Side::Bid => self.levels.range(reference * (one - pct)..=reference),
            Side::Ask => self.levels.range(reference..=reference * (one + pct)),
        };
        range.map(|(p, q)| *p * *q).sum()
    }

    /// Sum of all quantities on this side
    pub fn total_qty(&self) -> Decimal {
        self.levels.values().copied().sum()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Materialize the side as price levels, best first
    pub fn to_levels(&self) -> Vec<PriceLevel> {
        self.iter_from_best()
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bid_ordering_highest_first() {
        let mut bids = SideBook::new(Side::Bid);
        bids.set(dec!(99), dec!(1));
        bids.set(dec!(101), dec!(2));
        bids.set(dec!(100), dec!(3));

        assert_eq!(bids.best(), Some((dec!(101), dec!(2))));
        let prices: Vec<Decimal> = bids.iter_from_best().map(|(p, _)| *p).collect();
        assert_eq!(prices, vec![dec!(101), dec!(100), dec!(99)]);
    }

    #[test]
    fn test_ask_ordering_lowest_first() {
        let mut asks = SideBook::new(Side::Ask);
        asks.set(dec!(101), dec!(1));
        asks.set(dec!(99), dec!(2));
        asks.set(dec!(100), dec!(3));

        assert_eq!(asks.best(), Some((dec!(99), dec!(2))));
        let prices: Vec<Decimal> = asks.iter_from_best().map(|(p, _)| *p).collect();
        assert_eq!(prices, vec![dec!(99), dec!(100), dec!(101)]);
    }

    #[test]
    fn test_zero_quantity_removes_level() {
        let mut bids = SideBook::new(Side::Bid);
        bids.set(dec!(100), dec!(5));
        assert_eq!(bids.len(), 1);

        bids.set(dec!(100), Decimal::ZERO);
        assert_eq!(bids.len(), 0);

        // Removing an absent level is a no-op
        bids.set(dec!(100), Decimal::ZERO);
        assert_eq!(bids.len(), 0);
        assert!(bids.best().is_none());
    }

    #[test]
    fn test_set_overwrites() {
        let mut asks = SideBook::new(Side::Ask);
        asks.set(dec!(100), dec!(5));
        asks.set(dec!(100), dec!(7));
        assert_eq!(asks.best(), Some((dec!(100), dec!(7))));
        assert_eq!(asks.len(), 1);
    }

    #[test]
    fn test_sum_within_bid_band() {
        let mut bids = SideBook::new(Side::Bid);
        bids.set(dec!(100), dec!(1)); // in band: 100
        bids.set(dec!(99), dec!(2)); // in band: 198
        bids.set(dec!(98), dec!(1)); // 2% band floor for ref 100 is 98
        bids.set(dec!(90), dec!(10)); // out of band

        let sum = bids.sum_within(dec!(100), dec!(0.02));
        assert_eq!(sum, dec!(100) + dec!(198) + dec!(98));
    }

    #[test]
    fn test_sum_within_ask_band() {
        let mut asks = SideBook::new(Side::Ask);
        asks.set(dec!(100), dec!(1)); // in band
        asks.set(dec!(102), dec!(2)); // 2% band ceiling for ref 100
        asks.set(dec!(110), dec!(5)); // out of band

        let sum = asks.sum_within(dec!(100), dec!(0.02));
        assert_eq!(sum, dec!(100) + dec!(204));
    }

    #[test]
    fn test_total_qty() {
        let mut bids = SideBook::new(Side::Bid);
        bids.set(dec!(100), dec!(1.5));
        bids.set(dec!(99), dec!(2.5));
        assert_eq!(bids.total_qty(), dec!(4.0));
    }
}
