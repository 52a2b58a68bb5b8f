// ── Core error types ──
//
// Two layers. `BulbError` is the structured `{code, reason}` failure that
// travels back to the hub for a rejected command. `CoreError` is everything
// else: transport failures translated out of `bulbsync_api::Error`, bad
// input records, broken mapping tables.

use serde_json::{Map, Value};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use bulbsync_api::NvaStatus;

/// Codes the hub understands in a failed command status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    WrongNvaType,
    VerbIsNotSupported,
    NoDeviceResponse,
    AdverbFieldRequired,
}

/// A command-level failure reported to the issuer as `{code, reason}`.
///
/// Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulbError {
    #[error("NVAs: {nvas}")]
    WrongNvaType { nvas: String },

    #[error("Verb: {verb}")]
    VerbNotSupported { verb: String },

    #[error("No response from device {device_id}")]
    NoDeviceResponse { device_id: String },

    #[error("Field {field} is required in adverb for verb {verb}")]
    AdverbFieldRequired { field: String, verb: String },
}

impl BulbError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::WrongNvaType { .. } => ErrorCode::WrongNvaType,
            Self::VerbNotSupported { .. } => ErrorCode::VerbIsNotSupported,
            Self::NoDeviceResponse { .. } => ErrorCode::NoDeviceResponse,
            Self::AdverbFieldRequired { .. } => ErrorCode::AdverbFieldRequired,
        }
    }

    pub fn reason(&self) -> String {
        self.to_string()
    }

    /// Build an error from a wire code and its payload fields.
    ///
    /// Payload keys: `NVAs`, `verb`, `deviceId`, `field`. Missing keys
    /// render as empty strings. A code outside [`ErrorCode`] is a
    /// configuration fault and fails with [`CoreError::UnknownErrorCode`].
    pub fn from_code(code: &str, payload: &Map<String, Value>) -> Result<Self, CoreError> {
        let code: ErrorCode = code.parse().map_err(|_| {
            tracing::error!(code, "error code not handled");
            CoreError::UnknownErrorCode {
                code: code.to_owned(),
            }
        })?;

        let field = |key: &str| payload.get(key).map(render_payload).unwrap_or_default();

        Ok(match code {
            ErrorCode::WrongNvaType => Self::WrongNvaType { nvas: field("NVAs") },
            ErrorCode::VerbIsNotSupported => Self::VerbNotSupported { verb: field("verb") },
            ErrorCode::NoDeviceResponse => Self::NoDeviceResponse {
                device_id: field("deviceId"),
            },
            ErrorCode::AdverbFieldRequired => Self::AdverbFieldRequired {
                field: field("field"),
                verb: field("verb"),
            },
        })
    }

    /// The failed status sent back for this error.
    pub fn to_status(&self) -> NvaStatus {
        NvaStatus::failed(self.code().to_string(), self.reason())
    }
}

fn render_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Transport ────────────────────────────────────────────────────
    #[error("Cannot reach {target}: {reason}")]
    ConnectionFailed { target: String, reason: String },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Hub error: {message}")]
    Hub { message: String, status: Option<u16> },

    #[error("Device {device_id} error: {message}")]
    Device { device_id: String, message: String },

    // ── Command failures ─────────────────────────────────────────────
    #[error(transparent)]
    Bulb(#[from] BulbError),

    #[error("Unknown error code: {code}")]
    UnknownErrorCode { code: String },

    // ── Data ─────────────────────────────────────────────────────────
    #[error("Invalid device record: {message}")]
    InvalidDeviceRecord { message: String },

    #[error("Invalid hub record: {message}")]
    InvalidHubRecord { message: String },

    #[error("Mapping table error: {message}")]
    Mapping { message: String },

    // ── Internal ─────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Transport failures that are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConnectionFailed { .. } | Self::Timeout { .. })
            || matches!(self, Self::Hub { status: Some(s), .. } if *s >= 500)
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<bulbsync_api::Error> for CoreError {
    fn from(err: bulbsync_api::Error) -> Self {
        use bulbsync_api::Error as ApiError;

        match err {
            ApiError::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        target: e
                            .url()
                            .map_or_else(|| "<unknown>".into(), ToString::to_string),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Hub {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            ApiError::InvalidUrl(e) => CoreError::Internal(format!("Invalid URL: {e}")),
            ApiError::InvalidBaseUrl(url) => {
                CoreError::Internal(format!("Base URL cannot carry a path: {url}"))
            }
            ApiError::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            ApiError::Hub { status, message } => CoreError::Hub {
                message,
                status: Some(status),
            },
            ApiError::Device {
                device_id,
                status,
                message,
            } => CoreError::Device {
                device_id,
                message: format!("HTTP {status}: {message}"),
            },
            ApiError::BusConnect(reason) => CoreError::ConnectionFailed {
                target: "message bus".into(),
                reason,
            },
            ApiError::BusClosed => CoreError::ConnectionFailed {
                target: "message bus".into(),
                reason: "connection closed".into(),
            },
            ApiError::Deserialization { message, body: _ } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
        }
    }
}
