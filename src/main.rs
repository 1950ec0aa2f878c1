//! Multi-exchange order book monitor
//!
//! Connects to every configured venue, keeps per-venue level-2 books
//! synchronized, prints combined depth statistics, and periodically
//! stores them in Supabase.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use orderbook_monitor::db::{Collector, SupabaseClient};
use orderbook_monitor::{Config, Supervisor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let config = Config::load()?;
    info!(
        symbol = %config.symbol,
        log_interval_secs = config.log_interval.as_secs(),
        "starting multi-exchange orderbook monitor"
    );

    let collector = if config.db_enabled {
        let supabase = config.supabase()?;
        let client = SupabaseClient::new(&supabase.base_url, &supabase.api_key)?;
        client.test_connection().await?;
        info!(url = %supabase.base_url, "Supabase API connection established");
        info!(
            interval_secs = config.db_interval.as_secs(),
            "database storage enabled"
        );
        Some(Arc::new(Collector::new(
            client,
            &config.symbol,
            config.db_interval,
        )))
    } else {
        None
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = signal_tx.send(());
        }
    });

    Supervisor::new(config, collector, shutdown_tx).run().await;

    info!("all exchanges closed, goodbye");
    Ok(())
}
