//! Configuration for the bulbsync translator.
//!
//! A TOML file, `BULBSYNC_*` variables and the bare legacy variables
//! (`TRANSLATOR_ID`, `ACCESS_TOKEN`, ...) are layered with figment and
//! resolved into the core's `BridgeConfig` plus the transport endpoints.
//! Also owns the per-thing `config.json` kept under the storage path, with
//! its defaults, schema and validation rules.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use bulbsync_api::TransportConfig;
use bulbsync_core::BridgeConfig;

mod rules;
mod thing;

pub use rules::{Rule, Rules};
pub use thing::{
    DEFAULT_THING_CONFIG_FILE, SCHEMA_FILE, THING_CONFIG_FILE, ThingConfig, load_thing_config,
    save_thing_config,
};

/// Unprefixed variables honoured for compatibility with older deployments.
pub const LEGACY_ENV: &[&str] = &[
    "translator_id",
    "storage_path",
    "access_token",
    "hub_url",
    "bus_url",
    "device_url",
];

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access token configured")]
    NoCredentials,

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("thing config is invalid: {}", join_errors(.errors))]
    InvalidThingConfig { errors: Vec<ConfigError> },

    #[error("malformed thing config {path}: {source}")]
    ThingConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Translator configuration after all layers are merged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Identity used as source and manipulator of every hub request.
    pub translator_id: String,

    /// Directory holding the thing config.
    pub storage_path: PathBuf,

    /// Directory holding `default-config.json` and `schema.json`.
    pub defaults_path: PathBuf,

    /// Access token (plaintext; prefer `access_token_env`).
    pub access_token: Option<String>,

    /// Name of an environment variable holding the access token.
    pub access_token_env: Option<String>,

    pub hub_url: String,
    pub bus_url: String,
    pub device_url: String,

    /// Mapping table file; the built-in bulb table when unset.
    pub mapping: Option<PathBuf>,

    pub retry_delay_secs: u64,
    pub device_timeout_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            translator_id: String::new(),
            storage_path: PathBuf::from("etc"),
            defaults_path: PathBuf::from("etc"),
            access_token: None,
            access_token_env: None,
            hub_url: "http://localhost:8080".into(),
            bus_url: "ws://localhost:8080/bus".into(),
            device_url: "http://localhost:8081".into(),
            mapping: None,
            retry_delay_secs: 5,
            device_timeout_secs: 5,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Resolve the access token: `access_token_env` first, then plaintext.
    pub fn access_token(&self) -> Result<SecretString, ConfigError> {
        if let Some(token) = self
            .access_token_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
        {
            return Ok(SecretString::from(token));
        }

        self.access_token
            .clone()
            .filter(|token| !token.is_empty())
            .map(SecretString::from)
            .ok_or(ConfigError::NoCredentials)
    }

    pub fn hub_url(&self) -> Result<Url, ConfigError> {
        parse_url("hub_url", &self.hub_url)
    }

    pub fn bus_url(&self) -> Result<Url, ConfigError> {
        parse_url("bus_url", &self.bus_url)
    }

    pub fn device_url(&self) -> Result<Url, ConfigError> {
        parse_url("device_url", &self.device_url)
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig::with_timeout(Duration::from_secs(self.request_timeout_secs))
    }

    /// Build the bridge configuration. Requires a translator id and a token.
    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        if self.translator_id.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "translator_id".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(BridgeConfig::new(self.translator_id.clone(), self.access_token()?)
            .with_retry_delay(Duration::from_secs(self.retry_delay_secs))
            .with_device_timeout(Duration::from_secs(self.device_timeout_secs)))
    }
}

fn parse_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    raw.parse().map_err(|e: url::ParseError| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL '{raw}': {e}"),
    })
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("io", "bulbsync", "bulbsync").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("bulbsync");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// The merged provider stack: defaults, TOML file, legacy variables,
/// then `BULBSYNC_*` variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::raw().only(LEGACY_ENV))
        .merge(Env::prefixed("BULBSYNC_"))
}

/// Load configuration from `path` (or the default location) and the
/// environment. A missing file is not an error.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    tracing::debug!(path = %path.display(), "loading configuration");
    Ok(figment(&path).extract()?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use figment::Jail;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn extract(jail: &Jail) -> Config {
        figment(&jail.directory().join("bulbsync.toml")).extract().unwrap()
    }

    #[test]
    fn defaults_apply_without_file() {
        Jail::expect_with(|jail| {
            let config = extract(jail);
            assert_eq!(config, Config::default());
            Ok(())
        });
    }

    #[test]
    fn file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "bulbsync.toml",
                r#"
                translator_id = "from-file"
                hub_url = "http://hub.local"
                retry_delay_secs = 2
                "#,
            )?;
            jail.set_env("TRANSLATOR_ID", "from-legacy");
            jail.set_env("ACCESS_TOKEN", "legacy-token");
            jail.set_env("BULBSYNC_HUB_URL", "http://hub.override");

            let config = extract(jail);
            assert_eq!(config.translator_id, "from-legacy");
            assert_eq!(config.hub_url, "http://hub.override");
            assert_eq!(config.retry_delay_secs, 2);
            assert_eq!(config.access_token.as_deref(), Some("legacy-token"));
            Ok(())
        });
    }

    #[test]
    fn prefixed_env_beats_legacy_env() {
        Jail::expect_with(|jail| {
            jail.set_env("TRANSLATOR_ID", "legacy");
            jail.set_env("BULBSYNC_TRANSLATOR_ID", "prefixed");
            assert_eq!(extract(jail).translator_id, "prefixed");
            Ok(())
        });
    }

    #[test]
    fn bridge_config_requires_identity_and_token() {
        let mut config = Config::default();
        assert!(matches!(
            config.bridge_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "translator_id"
        ));

        config.translator_id = "tr-1".into();
        assert!(matches!(config.bridge_config(), Err(ConfigError::NoCredentials)));

        config.access_token = Some("secret".into());
        config.device_timeout_secs = 9;
        let bridge = config.bridge_config().unwrap();
        assert_eq!(bridge.translator_id, "tr-1");
        assert_eq!(bridge.access_token.expose_secret(), "secret");
        assert_eq!(bridge.device_timeout, Duration::from_secs(9));
        assert_eq!(bridge.retry_delay, Duration::from_secs(5));
    }

    #[test]
    fn token_env_indirection_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("BULBSYNC_TEST_TOKEN", "from-env");
            let config = Config {
                access_token: Some("plaintext".into()),
                access_token_env: Some("BULBSYNC_TEST_TOKEN".into()),
                ..Config::default()
            };
            assert_eq!(config.access_token().unwrap().expose_secret(), "from-env");
            Ok(())
        });
    }

    #[test]
    fn invalid_url_names_the_field() {
        let config = Config {
            device_url: "not a url".into(),
            ..Config::default()
        };
        let err = config.device_url().unwrap_err();
        assert!(err.to_string().starts_with("invalid device_url"));
        assert!(config.hub_url().is_ok());
    }

    #[test]
    fn thing_config_follows_configured_paths() {
        Jail::expect_with(|jail| {
            std::fs::create_dir_all(jail.directory().join("defaults")).unwrap();
            jail.create_file(
                "defaults/schema.json",
                r#"{ "validation": { "host": ["required", { "max_length": 32 }] } }"#,
            )?;
            jail.create_file("defaults/default-config.json", r#"{ "host": "hub.local" }"#)?;
            jail.set_env("STORAGE_PATH", "state");
            jail.set_env("BULBSYNC_DEFAULTS_PATH", "defaults");

            let config = extract(jail);
            assert_eq!(config.defaults_path, PathBuf::from("defaults"));

            let thing = load_thing_config(&config.storage_path, &config.defaults_path).unwrap();
            thing.validate().unwrap();
            assert!(jail.directory().join("state").join(THING_CONFIG_FILE).exists());

            save_thing_config(&config.storage_path, &serde_json::Map::new()).unwrap();
            let err = load_thing_config(&config.storage_path, &config.defaults_path)
                .unwrap()
                .validate()
                .unwrap_err();
            assert_eq!(err.to_string(), "thing config is invalid: invalid host: REQUIRED");
            Ok(())
        });
    }
}
