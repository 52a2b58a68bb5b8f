// ── Runtime bridge configuration ──
//
// Identity and timing for a `Bridge`. Carries the access token but never
// touches disk; `bulbsync-config` builds one of these from files and env.

use std::time::Duration;

use secrecy::SecretString;

/// Delay between hub-state fetch attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// How long a device gets to answer a read or an invocation.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// This translator's id: source of every hub request and owner of
    /// every hub thing it creates.
    pub translator_id: String,
    /// Bearer token for the hub.
    pub access_token: SecretString,
    pub retry_delay: Duration,
    pub device_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(translator_id: impl Into<String>, access_token: SecretString) -> Self {
        Self {
            translator_id: translator_id.into(),
            access_token,
            retry_delay: DEFAULT_RETRY_DELAY,
            device_timeout: DEFAULT_DEVICE_TIMEOUT,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_device_timeout(mut self, timeout: Duration) -> Self {
        self.device_timeout = timeout;
        self
    }
}
