//! Message bus stream with auto-reconnect.
//!
//! Connects to the hub's message bus WebSocket and fans inbound messages
//! out through a [`tokio::sync::broadcast`] channel. Two kinds of inbound
//! frame matter to a translator:
//!
//! - `{"type":"observation","request":{"data":{..}}}` -- a device reported
//!   new state (delivered by the device proxy).
//! - `{"type":"nva","id":"..","nva":[..]}` -- a batch of hub commands
//!   addressed to this translator.
//!
//! Replies to command batches are queued with [`BusHandle::reply`] and
//! written on the current connection. Reconnection uses exponential
//! backoff + jitter.
//!
//! # Example
//!
//! ```rust,ignore
//! use bulbsync_api::{BusHandle, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//!
//! let cancel = CancellationToken::new();
//! let url = Url::parse("ws://hub.local:1884/bus/translators/160985ae")?;
//!
//! let bus = BusHandle::connect(url, ReconnectConfig::default(), cancel.clone());
//! let mut rx = bus.subscribe();
//!
//! while let Ok(message) = rx.recv().await {
//!     println!("{message:?}");
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Error;
use crate::nva::NvaStatus;

// ── Channel capacities ───────────────────────────────────────────────

const MESSAGE_CHANNEL_CAPACITY: usize = 1024;
const REPLY_CHANNEL_CAPACITY: usize = 256;

// ── Messages ─────────────────────────────────────────────────────────

/// An inbound bus message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMessage {
    /// A device observation forwarded by the device proxy.
    Observation { request: ObservationRequest },
    /// A batch of hub commands.
    Nva(BatchedNva),
}

/// Observation payload. `data` is the raw device record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub data: Value,
}

/// A batch of hub commands.
///
/// `nva` stays raw so a malformed batch can be answered with a structured
/// error instead of being dropped at the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchedNva {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub nva: Value,
}

/// An outbound bus frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusReply {
    /// Per-command results for a [`BatchedNva`].
    NvaResponse {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        results: Vec<NvaStatus>,
    },
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for bus reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum reconnection attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

// ── BusHandle ────────────────────────────────────────────────────────

/// Handle to a running bus connection.
///
/// Call [`shutdown`](Self::shutdown) (or cancel the token passed to
/// [`connect`](Self::connect)) to tear down the background task.
pub struct BusHandle {
    message_rx: broadcast::Receiver<Arc<BusMessage>>,
    reply_tx: mpsc::Sender<BusReply>,
    cancel: CancellationToken,
}

impl BusHandle {
    /// Spawn the connection loop and return immediately.
    ///
    /// The first connection attempt happens asynchronously -- subscribe
    /// to start consuming messages.
    pub fn connect(url: Url, reconnect: ReconnectConfig, cancel: CancellationToken) -> Self {
        let (message_tx, message_rx) = broadcast::channel(MESSAGE_CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel(REPLY_CHANNEL_CAPACITY);

        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            bus_loop(url, message_tx, reply_rx, reconnect, task_cancel).await;
        });

        Self {
            message_rx,
            reply_tx,
            cancel,
        }
    }

    /// Get a new receiver for inbound messages.
    ///
    /// A consumer that falls behind receives
    /// [`broadcast::error::RecvError::Lagged`].
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<BusMessage>> {
        self.message_rx.resubscribe()
    }

    /// Queue a reply for the current connection.
    pub async fn reply(&self, reply: BusReply) -> Result<(), Error> {
        self.replier().send(reply).await
    }

    /// A cloneable reply handle for tasks that outlive a borrow of `self`.
    pub fn replier(&self) -> BusReplier {
        BusReplier {
            tx: self.reply_tx.clone(),
        }
    }

    /// Signal the background task to shut down gracefully.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Cloneable sender half for bus replies.
#[derive(Debug, Clone)]
pub struct BusReplier {
    tx: mpsc::Sender<BusReply>,
}

impl BusReplier {
    pub async fn send(&self, reply: BusReply) -> Result<(), Error> {
        self.tx.send(reply).await.map_err(|_| Error::BusClosed)
    }
}

impl From<mpsc::Sender<BusReply>> for BusReplier {
    fn from(tx: mpsc::Sender<BusReply>) -> Self {
        Self { tx }
    }
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → pump → on error, backoff → reconnect.
async fn bus_loop(
    url: Url,
    message_tx: broadcast::Sender<Arc<BusMessage>>,
    mut reply_rx: mpsc::Receiver<BusReply>,
    reconnect: ReconnectConfig,
    cancel: CancellationToken,
) {
    let mut attempt: u32 = 0;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connect_and_pump(&url, &message_tx, &mut reply_rx, &cancel) => {
                match result {
                    // Clean disconnect: reset the attempt counter and reconnect.
                    Ok(()) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        tracing::info!("bus disconnected cleanly, reconnecting");
                        attempt = 0;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, attempt, "bus connection error");

                        if let Some(max) = reconnect.max_retries {
                            if attempt >= max {
                                tracing::error!(
                                    max_retries = max,
                                    "bus reconnection limit reached, giving up"
                                );
                                break;
                            }
                        }

                        let delay = calculate_backoff(attempt, &reconnect);
                        tracing::info!(
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            attempt,
                            "waiting before reconnect"
                        );

                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }

                        attempt = attempt.saturating_add(1);
                    }
                }
            }
        }
    }

    tracing::debug!("bus loop exiting");
}

// ── Single connection lifecycle ──────────────────────────────────────

/// Establish one connection and pump frames both ways until it drops.
async fn connect_and_pump(
    url: &Url,
    message_tx: &broadcast::Sender<Arc<BusMessage>>,
    reply_rx: &mut mpsc::Receiver<BusReply>,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    tracing::info!(url = %url, "connecting to bus");

    let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| Error::BusConnect(e.to_string()))?;

    tracing::info!("bus connected");

    let (mut write, mut read) = ws_stream.split();
    let mut replies_open = true;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                let _ = write.send(tungstenite::Message::Close(None)).await;
                return Ok(());
            }
            reply = reply_rx.recv(), if replies_open => {
                match reply {
                    Some(reply) => {
                        let text = serde_json::to_string(&reply).map_err(|e| Error::Deserialization {
                            message: e.to_string(),
                            body: format!("{reply:?}"),
                        })?;
                        write
                            .send(tungstenite::Message::text(text))
                            .await
                            .map_err(|e| Error::BusConnect(e.to_string()))?;
                    }
                    // Every handle is gone; keep reading until the socket closes.
                    None => replies_open = false,
                }
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        parse_and_broadcast(&text, message_tx);
                    }
                    Some(Ok(tungstenite::Message::Ping(_))) => {
                        // tungstenite queues the pong; it goes out with the next write.
                        tracing::trace!("bus ping");
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "bus close frame received");
                        } else {
                            tracing::info!("bus close frame received (no payload)");
                        }
                        return Ok(());
                    }
                    Some(Err(e)) => return Err(Error::BusConnect(e.to_string())),
                    None => {
                        tracing::info!("bus stream ended");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

// ── Message parsing ──────────────────────────────────────────────────

/// Parse a text frame and broadcast it if it is a known message.
fn parse_and_broadcast(text: &str, message_tx: &broadcast::Sender<Arc<BusMessage>>) {
    match parse_message(text) {
        Some(message) => {
            // No subscribers right now is not an error.
            let _ = message_tx.send(Arc::new(message));
        }
        None => tracing::debug!(frame = %text, "ignoring unrecognized bus frame"),
    }
}

fn parse_message(text: &str) -> Option<BusMessage> {
    serde_json::from_str(text).ok()
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) + jitter`, jitter within +-25%.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    // Deterministic "jitter" seeded from the attempt number.
    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
