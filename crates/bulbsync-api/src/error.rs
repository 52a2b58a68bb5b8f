use thiserror::Error;

/// Top-level error type for the `bulbsync-api` crate.
///
/// Covers every failure mode across the transport surfaces: the hub's
/// NVA endpoint, the device proxy, and the message bus WebSocket.
/// `bulbsync-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL cannot carry path segments (e.g. `mailto:`).
    #[error("Base URL cannot be extended with a path: {0}")]
    InvalidBaseUrl(String),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Hub ─────────────────────────────────────────────────────────
    /// Non-success response from the hub's NVA endpoint.
    #[error("Hub rejected request (HTTP {status}): {message}")]
    Hub { status: u16, message: String },

    // ── Device proxy ────────────────────────────────────────────────
    /// Non-success response from the device proxy.
    #[error("Device {device_id} request failed (HTTP {status}): {message}")]
    Device {
        device_id: String,
        status: u16,
        message: String,
    },

    // ── Message bus ─────────────────────────────────────────────────
    /// WebSocket connection to the message bus failed.
    #[error("Bus connection failed: {0}")]
    BusConnect(String),

    /// The bus task has shut down and no longer accepts replies.
    #[error("Bus connection closed")]
    BusClosed,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } | Self::BusConnect(_) => true,
            Self::Hub { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Returns `true` if the remote side answered "not found".
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Hub { status: 404, .. } | Self::Device { status: 404, .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hub_server_errors_are_transient() {
        let err = Error::Hub {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(err.is_transient());

        let err = Error::Hub {
            status: 400,
            message: "bad nva".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn device_404_is_not_found() {
        let err = Error::Device {
            device_id: "d1".into(),
            status: 404,
            message: String::new(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
    }
}
