//! CLI error types with miette diagnostics.
//!
//! Maps config and core failures into user-facing errors with help text.

use miette::Diagnostic;
use thiserror::Error;

use bulbsync_config::ConfigError;
use bulbsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {target}: {reason}")]
    #[diagnostic(
        code(bulbsync::connection_failed),
        help("Check hub_url, bus_url and device_url in your configuration.")
    )]
    ConnectionFailed { target: String, reason: String },

    #[error("Request timed out after {seconds}s")]
    #[diagnostic(
        code(bulbsync::timeout),
        help("Raise request_timeout_secs or check the hub's responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No access token configured")]
    #[diagnostic(
        code(bulbsync::no_credentials),
        help("Set ACCESS_TOKEN or BULBSYNC_ACCESS_TOKEN, or access_token in {path}.")
    )]
    NoCredentials { path: String },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(bulbsync::validation))]
    Validation { field: String, reason: String },

    #[error("Invalid thing config: {details}")]
    #[diagnostic(
        code(bulbsync::thing_config),
        help("Fix the listed fields in config.json under storage_path, or remove the file to reseed it from defaults_path.")
    )]
    InvalidThingConfig { details: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(code(bulbsync::config))]
    Config { message: String },

    #[error("Invalid mapping table: {message}")]
    #[diagnostic(
        code(bulbsync::mapping),
        help("Run `bulbsync mapping -o yaml` for a working example table.")
    )]
    Mapping { message: String },

    // ── Runtime ──────────────────────────────────────────────────────
    #[error("Hub error: {message}")]
    #[diagnostic(code(bulbsync::hub))]
    Hub { message: String },

    #[error("{0}")]
    #[diagnostic(code(bulbsync::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error("Cannot read {path}")]
    #[diagnostic(code(bulbsync::io))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    #[diagnostic(code(bulbsync::json), help("Check the JSON file contents and try again."))]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid input in {path}: {reason}")]
    #[diagnostic(code(bulbsync::input))]
    Input { path: String, reason: String },
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::Validation { .. }
            | Self::InvalidThingConfig { .. }
            | Self::Input { .. }
            | Self::Json { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError ───────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials => Self::NoCredentials {
                path: bulbsync_config::config_path().display().to_string(),
            },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::InvalidThingConfig { errors } => Self::InvalidThingConfig {
                details: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            },
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}

// ── CoreError → CliError ─────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { target, reason } => Self::ConnectionFailed { target, reason },
            CoreError::Timeout { timeout_secs } => Self::Timeout {
                seconds: timeout_secs,
            },
            CoreError::Hub { message, .. } => Self::Hub { message },
            CoreError::Mapping { message } => Self::Mapping { message },
            CoreError::InvalidDeviceRecord { message } | CoreError::InvalidHubRecord { message } => {
                Self::Validation {
                    field: "record".into(),
                    reason: message,
                }
            }
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<bulbsync_api::Error> for CliError {
    fn from(err: bulbsync_api::Error) -> Self {
        CoreError::from(err).into()
    }
}
