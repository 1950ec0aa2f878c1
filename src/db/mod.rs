//! Persistence: Supabase REST client and the periodic collector

mod collector;
mod supabase;

pub use collector::Collector;
pub use supabase::{BookRow, SupabaseClient};
