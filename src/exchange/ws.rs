//! Shared websocket plumbing for exchange adapters
//!
//! One connection per adapter. The reader loop normalizes frames
//! through an adapter-supplied parser and forwards updates into the
//! adapter's channel; a watch channel delivers the close signal so
//! `close` stays idempotent and race-free with the drain.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::ExchangeName;
use crate::error::{MonitorError, Result};
use crate::types::DepthUpdate;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected websocket
pub(crate) struct WsConn {
    stream: WsStream,
}

impl WsConn {
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| MonitorError::Connect(format!("{url}: {e}")))?;
        debug!(status = ?response.status(), url, "WebSocket connected");
        Ok(Self { stream })
    }

    pub async fn send_text(&mut self, payload: String) -> Result<()> {
        self.stream
            .send(Message::Text(payload))
            .await
            .map_err(|e| MonitorError::WebSocket(e.to_string()))
    }

    /// Receive the next data frame
    ///
    /// `Ok(Some(text))` for data, `Ok(None)` for control frames
    /// (pings are answered in place), `Err` when the connection is
    /// closed or failed.
    pub async fn recv(&mut self) -> Result<Option<String>> {
        match self.stream.next().await {
            Some(Ok(Message::Text(text))) => Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => {
                Ok(Some(String::from_utf8_lossy(&data).to_string()))
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = self.stream.send(Message::Pong(data)).await;
                Ok(None)
            }
            Some(Ok(Message::Pong(_))) => Ok(None),
            Some(Ok(Message::Close(frame))) => {
                debug!(frame = ?frame, "received close frame");
                Err(MonitorError::WebSocket("connection closed".to_string()))
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => Err(MonitorError::WebSocket(e.to_string())),
            None => Err(MonitorError::WebSocket("stream ended".to_string())),
        }
    }

    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

/// Drive a connection until close is signalled or the stream ends
///
/// Parsed updates go into `tx`; dropping `tx` at exit closes the
/// channel, which is the disconnect signal consumers observe.
pub(crate) fn spawn_reader<F>(
    mut conn: WsConn,
    name: ExchangeName,
    tx: mpsc::Sender<DepthUpdate>,
    mut close_rx: watch::Receiver<bool>,
    mut parse: F,
) -> JoinHandle<()>
where
    F: FnMut(&str) -> Option<DepthUpdate> + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            tokio::select! {
                changed = close_rx.changed() => {
                    // A dropped sender counts as a close signal
                    if changed.is_err() || *close_rx.borrow() {
                        break;
                    }
                }
                msg = conn.recv() => match msg {
                    Ok(Some(text)) => {
                        if let Some(update) = parse(&text) {
                            if tx.send(update).await.is_err() {
                                // Consumer went away
                                break;
                            }
                        }
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(exchange = %name, error = %e, "stream closed");
                        break;
                    }
                },
            }
        }
        conn.close().await;
        debug!(exchange = %name, "reader exited");
    })
}
