//! Multi-exchange order book monitor library
//!
//! Maintains live level-2 order books for one trading symbol across
//! several venues, reconciling each venue's streaming depth updates
//! with point-in-time REST snapshots, and derives depth statistics
//! for terminal display and Supabase persistence.

use std::sync::Arc;
use tokio::sync::RwLock;

pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod exchange;
pub mod factory;
pub mod orderbook;
pub mod supervisor;
pub mod types;

pub use config::Config;
pub use error::{MonitorError, Result};
pub use exchange::{Exchange, ExchangeName};
pub use orderbook::{OrderBook, Stats};
pub use supervisor::Supervisor;
pub use types::{DepthUpdate, PriceLevel, SequencingMode, Snapshot};

/// One venue's book, shared between its pipeline and the consumers
pub type SharedBook = Arc<RwLock<OrderBook>>;
