//! Order book module
//!
//! Maintains synchronized order book state from venue depth updates.

mod book;
mod levels;
mod stats;

pub use book::OrderBook;
pub use levels::SideBook;
pub use stats::Stats;

use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}
