//! Configuration: command line flags and environment

use std::env;
use std::time::Duration;

use crate::error::{MonitorError, Result};
use crate::exchange::ExchangeName;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Trading symbol to monitor, e.g. `BTCUSDT`
    pub symbol: String,

    /// Interval for printing combined orderbook stats
    pub log_interval: Duration,

    /// Whether to store stats batches in the database
    pub db_enabled: bool,

    /// Interval between stats batches
    pub db_interval: Duration,

    /// Interval between reinitialization checks per venue
    pub reinit_check_interval: Duration,

    /// A book with no applied update for this long is resynced
    pub max_staleness: Duration,

    /// Venues to run, one pipeline each
    pub exchanges: Vec<ExchangeName>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            log_interval: Duration::from_secs(10),
            db_enabled: true,
            db_interval: Duration::from_secs(20),
            reinit_check_interval: Duration::from_secs(5),
            max_staleness: Duration::from_secs(30),
            exchanges: ExchangeName::all().to_vec(),
        }
    }
}

/// Supabase connection settings from the environment
#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub base_url: String,
    pub api_key: String,
}

const DEFAULT_SUPABASE_URL: &str = "https://qlcmrsbvdmyflllavyzc.supabase.co";

impl Config {
    /// Load configuration from command line flags and `.env`
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_args(env::args().skip(1))
    }

    pub fn from_args<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) => (flag.to_string(), Some(value.to_string())),
                None => (arg, None),
            };

            match flag.as_str() {
                "--symbol" => {
                    config.symbol = take_value(&flag, inline, &mut args)?.to_uppercase();
                }
                "--log-interval" => {
                    config.log_interval = parse_duration(&take_value(&flag, inline, &mut args)?)?;
                }
                "--db-interval" => {
                    config.db_interval = parse_duration(&take_value(&flag, inline, &mut args)?)?;
                }
                "--db-enabled" => {
                    // Bare flag means enabled, like a Go bool flag
                    config.db_enabled = match inline {
                        Some(raw) => parse_bool(&raw)?,
                        None => true,
                    };
                }
                other => {
                    return Err(MonitorError::Config(format!("unknown flag: {other}")));
                }
            }
        }

        Ok(config)
    }

    /// Resolve Supabase settings; the key is required once persistence
    /// is enabled.
    pub fn supabase(&self) -> Result<SupabaseConfig> {
        let base_url =
            env::var("SUPABASE_URL").unwrap_or_else(|_| DEFAULT_SUPABASE_URL.to_string());
        let api_key = env::var("SUPABASE_ANON_KEY").map_err(|_| {
            MonitorError::Config(
                "SUPABASE_ANON_KEY environment variable is required when database storage is enabled"
                    .to_string(),
            )
        })?;
        Ok(SupabaseConfig { base_url, api_key })
    }
}

fn take_value<I>(flag: &str, inline: Option<String>, args: &mut I) -> Result<String>
where
    I: Iterator<Item = String>,
{
    inline
        .or_else(|| args.next())
        .ok_or_else(|| MonitorError::Config(format!("flag {flag} requires a value")))
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(MonitorError::Config(format!("invalid bool: {other}"))),
    }
}

/// Parse a Go-style duration literal: `500ms`, `10s`, `1m`, `2h`
fn parse_duration(raw: &str) -> Result<Duration> {
    let (number, unit) = raw
        .find(|c: char| !c.is_ascii_digit())
        .map(|i| raw.split_at(i))
        .ok_or_else(|| MonitorError::Config(format!("duration {raw} is missing a unit")))?;
    let number: u64 = number
        .parse()
        .map_err(|_| MonitorError::Config(format!("invalid duration: {raw}")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(number)),
        "s" => Ok(Duration::from_secs(number)),
        "m" => Ok(Duration::from_secs(number * 60)),
        "h" => Ok(Duration::from_secs(number * 3600)),
        _ => Err(MonitorError::Config(format!("invalid duration unit: {raw}"))),
    }
}
