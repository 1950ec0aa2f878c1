//! Core order book engine
//!
//! State machine over the two side books: buffer early updates, load
//! a snapshot, replay the buffer, detect sequence gaps, and flag the
//! book for resynchronization. Contiguity is the only correctness
//! criterion; level ordering inside one update is immaterial.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{Side, SideBook, Stats};
use crate::types::{DepthUpdate, PriceLevel, SequencingMode, Snapshot};

/// Updates received before initialization completes are buffered up
/// to this many entries; beyond it the newest are dropped.
const MAX_PENDING_UPDATES: usize = 512;

/// How an update relates to the current sequence position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sequencing {
    /// Contiguous with the book; safe to apply
    Contiguous,
    /// Entirely behind the book; drop silently
    Stale,
    /// Non-contiguous; the book missed something
    Gap,
}

/// Level-2 order book for one venue
#[derive(Debug)]
pub struct OrderBook {
    mode: SequencingMode,
    bids: SideBook,
    asks: SideBook,
    /// False until a snapshot has been applied and the buffer replayed
    initialized: bool,
    /// Highest sequence id successfully applied (modes A and B)
    last_update_id: u64,
    /// Venue clock of the last applied update, ms (event-clock contiguity)
    last_event_time: u64,
    /// Local wall clock of the last successful apply
    last_applied_at: Option<Instant>,
    /// Set on gap detection, cleared by a successful snapshot reload
    needs_reinit: bool,
    pending: VecDeque<DepthUpdate>,
}

impl OrderBook {
    pub fn new(mode: SequencingMode) -> Self {
        Self {
            mode,
            bids: SideBook::new(Side::Bid),
            asks: SideBook::new(Side::Ask),
            initialized: false,
            last_update_id: 0,
            last_event_time: 0,
            last_applied_at: None,
            needs_reinit: false,
            pending: VecDeque::new(),
        }
    }

    /// Replace the side books with snapshot state
    ///
    /// Does not mark the book initialized; the pending buffer must be
    /// replayed first via [`process_buffered_events`].
    ///
    /// [`process_buffered_events`]: OrderBook::process_buffered_events
    pub fn load_snapshot(&mut self, snapshot: Snapshot) {
        self.bids.clear();
        self.asks.clear();

        for level in snapshot.bids {
            if !level.quantity.is_zero() {
                self.bids.set(level.price, level.quantity);
            }
        }
        for level in snapshot.asks {
            if !level.quantity.is_zero() {
                self.asks.set(level.price, level.quantity);
            }
        }

        self.last_update_id = snapshot.last_update_id;
        self.last_event_time = 0;
        self.needs_reinit = false;
    }

    /// Drain the pending buffer in arrival order
    ///
    /// Stale entries are discarded; a gap stops the drain and flags
    /// the book for reinit. A clean drain marks the book initialized.
    pub fn process_buffered_events(&mut self) {
        while let Some(update) = self.pending.pop_front() {
            match self.classify(&update) {
                Sequencing::Stale => continue,
                Sequencing::Contiguous => self.apply(update),
                Sequencing::Gap => {
                    warn!(
                        last_update_id = self.last_update_id,
                        first_update_id = update.first_update_id,
                        "gap while replaying buffered updates, reinit required"
                    );
                    self.needs_reinit = true;
                    return;
                }
            }
        }
        self.initialized = true;
        self.last_applied_at = Some(Instant::now());
    }

    /// Hot path: buffer, drop, apply, or flag a gap
    pub fn handle_depth_update(&mut self, update: DepthUpdate) {
        if !self.initialized {
            if self.pending.len() >= MAX_PENDING_UPDATES {
                warn!(
                    capacity = MAX_PENDING_UPDATES,
                    "pending update buffer full, dropping newest update"
                );
                return;
            }
            self.pending.push_back(update);
            return;
        }

        match self.classify(&update) {
            Sequencing::Stale => {
                debug!(
                    last_update_id = self.last_update_id,
                    update_last_id = update.last_update_id,
                    "dropping stale update"
                );
            }
            Sequencing::Contiguous => self.apply(update),
            Sequencing::Gap => {
                warn!(
                    last_update_id = self.last_update_id,
                    last_event_time = self.last_event_time,
                    first_update_id = update.first_update_id,
                    prev_last_update_id = update.prev_last_update_id,
                    event_time = update.event_time,
                    "sequence gap detected, reinit required"
                );
                self.needs_reinit = true;
                self.initialized = false;
            }
        }
    }

    fn classify(&self, update: &DepthUpdate) -> Sequencing {
        match self.mode {
            SequencingMode::UpdateRange => {
                if update.last_update_id <= self.last_update_id {
                    Sequencing::Stale
                } else if update.first_update_id <= self.last_update_id + 1 {
                    Sequencing::Contiguous
                } else {
                    Sequencing::Gap
                }
            }
            SequencingMode::PrevLink => {
                if update.last_update_id <= self.last_update_id {
                    Sequencing::Stale
                } else if update.prev_last_update_id == self.last_update_id {
                    Sequencing::Contiguous
                } else {
                    Sequencing::Gap
                }
            }
            SequencingMode::EventClock => {
                if update.event_time >= self.last_event_time {
                    Sequencing::Contiguous
                } else {
                    Sequencing::Gap
                }
            }
        }
    }

    fn apply(&mut self, update: DepthUpdate) {
        for level in &update.bids {
            self.bids.set(level.price, level.quantity);
        }
        for level in &update.asks {
            self.asks.set(level.price, level.quantity);
        }

        if self.mode != SequencingMode::EventClock {
            self.last_update_id = update.last_update_id;
        }
        self.last_event_time = update.event_time;
        self.last_applied_at = Some(Instant::now());
    }

    /// Whether the supervisor should fetch a fresh snapshot
    ///
    /// True when a gap was flagged, when no update has been applied
    /// for `max_age`, or when the book is crossed.
    pub fn needs_resync(&self, max_age: Duration) -> bool {
        if self.needs_reinit {
            return true;
        }
        if !self.initialized {
            return false;
        }
        if let Some(applied_at) = self.last_applied_at {
            if applied_at.elapsed() > max_age {
                return true;
            }
        }
        if let (Some((best_bid, _)), Some((best_ask, _))) = (self.bids.best(), self.asks.best()) {
            if best_bid >= best_ask {
                return true;
            }
        }
        false
    }

    /// Rebuild book state from a fresh snapshot and replay the buffer
    ///
    /// The stream is untouched; only the book state is rebuilt.
    pub fn resync(&mut self, snapshot: Snapshot) {
        self.initialized = false;
        self.load_snapshot(snapshot);
        self.process_buffered_events();
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn needs_reinit(&self) -> bool {
        self.needs_reinit
    }

    pub fn last_update_id(&self) -> u64 {
        self.last_update_id
    }

    pub fn get_stats(&self) -> Stats {
        Stats::compute(&self.bids, &self.asks)
    }

    /// Bid levels, highest price first
    pub fn get_bids(&self) -> Vec<PriceLevel> {
        self.bids.to_levels()
    }

    /// Ask levels, lowest price first
    pub fn get_asks(&self) -> Vec<PriceLevel> {
        self.asks.to_levels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn snapshot(last_update_id: u64) -> Snapshot {
        Snapshot {
            last_update_id,
            bids: vec![
                PriceLevel::new(dec!(100), dec!(1)),
                PriceLevel::new(dec!(99), dec!(2)),
            ],
            asks: vec![
                PriceLevel::new(dec!(101), dec!(1)),
                PriceLevel::new(dec!(102), dec!(2)),
            ],
        }
    }

    fn range_update(first: u64, last: u64, bid_price: Decimal, bid_qty: Decimal) -> DepthUpdate {
        DepthUpdate {
            first_update_id: first,
            last_update_id: last,
            event_time: 1_700_000_000_000,
            bids: vec![PriceLevel::new(bid_price, bid_qty)],
            ..Default::default()
        }
    }

    fn linked_update(prev: u64, last: u64) -> DepthUpdate {
        DepthUpdate {
            first_update_id: prev + 1,
            last_update_id: last,
            prev_last_update_id: prev,
            event_time: 1_700_000_000_000,
            bids: vec![PriceLevel::new(dec!(100), dec!(5))],
            ..Default::default()
        }
    }

    fn clock_update(event_time: u64, bid_qty: Decimal) -> DepthUpdate {
        DepthUpdate {
            event_time,
            bids: vec![PriceLevel::new(dec!(100), bid_qty)],
            ..Default::default()
        }
    }

    #[test]
    fn test_range_mode_clean_startup() {
        // Scenario: snapshot id 100, buffered [95..98, 99..101, 102..103]
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.handle_depth_update(range_update(95, 98, dec!(100), dec!(9)));
        book.handle_depth_update(range_update(99, 101, dec!(100), dec!(3)));
        book.handle_depth_update(range_update(102, 103, dec!(98), dec!(4)));

        book.load_snapshot(snapshot(100));
        book.process_buffered_events();

        assert!(book.is_initialized());
        assert!(!book.needs_reinit());
        assert_eq!(book.last_update_id(), 103);
        // 95..98 was stale; 99..101 and 102..103 applied
        let bids = book.get_bids();
        assert_eq!(bids[0], PriceLevel::new(dec!(100), dec!(3)));
        assert!(bids.contains(&PriceLevel::new(dec!(98), dec!(4))));
    }

    #[test]
    fn test_range_mode_pre_snapshot_gap() {
        // Scenario: snapshot id 100, buffered [90..95, 102..105]
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.handle_depth_update(range_update(90, 95, dec!(100), dec!(9)));
        book.handle_depth_update(range_update(102, 105, dec!(100), dec!(9)));

        book.load_snapshot(snapshot(100));
        book.process_buffered_events();

        assert!(!book.is_initialized());
        assert!(book.needs_reinit());
        assert_eq!(book.last_update_id(), 100);
        // Book still reflects the snapshot, not the gapped update
        assert_eq!(book.get_bids()[0], PriceLevel::new(dec!(100), dec!(1)));
    }

    #[test]
    fn test_prev_link_break() {
        let mut book = OrderBook::new(SequencingMode::PrevLink);
        book.load_snapshot(snapshot(50));
        book.process_buffered_events();

        book.handle_depth_update(linked_update(50, 51));
        assert_eq!(book.last_update_id(), 51);

        // Expected prev=51, got prev=52
        book.handle_depth_update(linked_update(52, 53));
        assert!(book.needs_reinit());
        assert!(!book.is_initialized());
        assert_eq!(book.last_update_id(), 51);
    }

    #[test]
    fn test_event_clock_reversal() {
        let mut book = OrderBook::new(SequencingMode::EventClock);
        book.load_snapshot(snapshot(0));
        book.process_buffered_events();

        book.handle_depth_update(clock_update(1000, dec!(5)));
        assert!(!book.needs_reinit());

        book.handle_depth_update(clock_update(999, dec!(7)));
        assert!(book.needs_reinit());
        // The gapped update must not have mutated the book
        assert_eq!(book.get_bids()[0], PriceLevel::new(dec!(100), dec!(5)));
    }

    #[test]
    fn test_event_clock_equal_time_applies() {
        let mut book = OrderBook::new(SequencingMode::EventClock);
        book.load_snapshot(snapshot(0));
        book.process_buffered_events();

        book.handle_depth_update(clock_update(1000, dec!(5)));
        book.handle_depth_update(clock_update(1000, dec!(6)));
        assert!(!book.needs_reinit());
        assert_eq!(book.get_bids()[0], PriceLevel::new(dec!(100), dec!(6)));
    }

    #[test]
    fn test_delete_level() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();
        let before = book.get_bids().len();

        book.handle_depth_update(range_update(101, 101, dec!(100), Decimal::ZERO));
        assert_eq!(book.get_bids().len(), before - 1);

        // Re-applying the delete is stale and changes nothing
        book.handle_depth_update(range_update(101, 101, dec!(100), Decimal::ZERO));
        assert_eq!(book.get_bids().len(), before - 1);
        assert!(!book.needs_reinit());
    }

    #[test]
    fn test_stale_update_is_idempotent_no_op() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();
        book.handle_depth_update(range_update(101, 102, dec!(100), dec!(9)));
        let bids = book.get_bids();
        let id = book.last_update_id();

        let stale = range_update(101, 102, dec!(100), dec!(42));
        book.handle_depth_update(stale.clone());
        book.handle_depth_update(stale);

        assert_eq!(book.get_bids(), bids);
        assert_eq!(book.last_update_id(), id);
    }

    #[test]
    fn test_updates_buffer_before_init() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.handle_depth_update(range_update(101, 102, dec!(100), dec!(9)));
        assert!(!book.is_initialized());
        assert!(book.get_bids().is_empty());
    }

    #[test]
    fn test_pending_buffer_drops_newest_at_capacity() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        for i in 0..MAX_PENDING_UPDATES as u64 + 10 {
            book.handle_depth_update(range_update(101 + i, 101 + i, dec!(100), dec!(9)));
        }
        assert_eq!(book.pending.len(), MAX_PENDING_UPDATES);
        // The oldest buffered update survived the overflow
        assert_eq!(book.pending[0].first_update_id, 101);
    }

    #[test]
    fn test_monotonic_last_update_id() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();

        let mut seen = book.last_update_id();
        for (first, last) in [(101, 103), (104, 104), (90, 95), (105, 110)] {
            book.handle_depth_update(range_update(first, last, dec!(100), dec!(1)));
            assert!(book.last_update_id() >= seen);
            seen = book.last_update_id();
        }
        assert_eq!(seen, 110);
    }

    #[test]
    fn test_all_stored_quantities_positive() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(Snapshot {
            last_update_id: 100,
            bids: vec![
                PriceLevel::new(dec!(100), dec!(1)),
                PriceLevel::new(dec!(99), Decimal::ZERO),
            ],
            asks: vec![PriceLevel::new(dec!(101), dec!(1))],
        });
        book.process_buffered_events();
        book.handle_depth_update(range_update(101, 101, dec!(98), Decimal::ZERO));

        for level in book.get_bids().iter().chain(book.get_asks().iter()) {
            assert!(level.quantity > Decimal::ZERO);
        }
    }

    #[test]
    fn test_replay_equals_direct_apply() {
        // Buffered replay must produce the same book as applying the
        // same trace directly to an already-live book.
        let trace = vec![
            range_update(99, 101, dec!(100), dec!(3)),
            range_update(102, 103, dec!(98), dec!(4)),
            range_update(104, 106, dec!(97), dec!(1)),
        ];

        let mut buffered = OrderBook::new(SequencingMode::UpdateRange);
        for update in &trace {
            buffered.handle_depth_update(update.clone());
        }
        buffered.load_snapshot(snapshot(100));
        buffered.process_buffered_events();

        let mut direct = OrderBook::new(SequencingMode::UpdateRange);
        direct.load_snapshot(snapshot(100));
        direct.process_buffered_events();
        for update in &trace {
            direct.handle_depth_update(update.clone());
        }

        assert_eq!(buffered.get_bids(), direct.get_bids());
        assert_eq!(buffered.get_asks(), direct.get_asks());
        assert_eq!(buffered.last_update_id(), direct.last_update_id());
    }

    #[test]
    fn test_needs_resync_on_crossed_book() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();
        assert!(!book.needs_resync(Duration::from_secs(30)));

        // Bid crosses the best ask
        book.handle_depth_update(range_update(101, 101, dec!(101.5), dec!(1)));
        assert!(book.needs_resync(Duration::from_secs(30)));
    }

    #[test]
    fn test_needs_resync_on_staleness() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();
        assert!(book.needs_resync(Duration::ZERO));
        assert!(!book.needs_resync(Duration::from_secs(3600)));
    }

    #[test]
    fn test_resync_after_gap() {
        let mut book = OrderBook::new(SequencingMode::UpdateRange);
        book.load_snapshot(snapshot(100));
        book.process_buffered_events();

        book.handle_depth_update(range_update(150, 155, dec!(100), dec!(9)));
        assert!(book.needs_reinit());

        // Updates arriving while flagged are buffered for the replay
        book.handle_depth_update(range_update(201, 203, dec!(95), dec!(1)));

        book.resync(Snapshot {
            last_update_id: 200,
            bids: vec![PriceLevel::new(dec!(100), dec!(2))],
            asks: vec![PriceLevel::new(dec!(101), dec!(2))],
        });

        assert!(book.is_initialized());
        assert!(!book.needs_reinit());
        assert_eq!(book.last_update_id(), 203);
        assert!(book.get_bids().contains(&PriceLevel::new(dec!(95), dec!(1))));
    }
}
