//! Error types for the order book monitor

use thiserror::Error;

/// Monitor errors
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("connection error: {0}")]
    Connect(String),

    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("failed to parse message: {0}")]
    Parse(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for MonitorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        MonitorError::WebSocket(err.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        MonitorError::Snapshot(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
