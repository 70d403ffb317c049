//! Client Configuration Settings
//!
//! Configuration types for the price stream client, loaded from environment
//! variables.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::domain::subscription::Symbol;

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Idle time before a heartbeat ping (zero disables).
    pub heartbeat_interval: Duration,
    /// Time allowed for traffic after a ping.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_millis(30_000),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 5,
        }
    }
}

/// Subscription and batching timing.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Debounce window for subscription reconciliation.
    pub debounce: Duration,
    /// Coalescing window for price updates.
    pub batch_window: Duration,
    /// Open the connection on the first non-empty interest.
    pub auto_connect: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(300),
            batch_window: Duration::from_millis(100),
            auto_connect: true,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Feed WebSocket URL.
    pub url: String,
    /// Symbols the binary tracks on startup.
    pub symbols: Vec<Symbol>,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Subscription and batching timing.
    pub sync: SyncSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl ClientConfig {
    /// Configuration with defaults for everything but the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            symbols: Vec::new(),
            websocket: WebSocketSettings::default(),
            sync: SyncSettings::default(),
            server: ServerSettings::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_FEED_URL` is missing, empty or not a
    /// WebSocket URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from a `.env`-style file, ignoring the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// values it contains are invalid.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let vars = dotenvy::from_path_iter(path.as_ref())?
            .collect::<Result<HashMap<String, String>, _>>()?;
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICE_FEED_URL` is missing, empty or not a
    /// WebSocket URL.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);

        let url = env
            .get("PRICE_FEED_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("PRICE_FEED_URL".to_string()))?;
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(ConfigError::EmptyValue("PRICE_FEED_URL".to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(url));
        }

        let symbols = env
            .get("PRICE_FEED_SYMBOLS")
            .map(|raw| parse_symbols(&raw))
            .unwrap_or_default();

        let ws_defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            connect_timeout: env.duration_secs(
                "PRICE_FEED_CONNECT_TIMEOUT_SECS",
                ws_defaults.connect_timeout,
            ),
            heartbeat_interval: env.duration_secs(
                "PRICE_FEED_HEARTBEAT_INTERVAL_SECS",
                ws_defaults.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "PRICE_FEED_HEARTBEAT_TIMEOUT_SECS",
                ws_defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "PRICE_FEED_RECONNECT_DELAY_INITIAL_MS",
                ws_defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_millis(
                "PRICE_FEED_RECONNECT_DELAY_MAX_MS",
                ws_defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "PRICE_FEED_RECONNECT_DELAY_MULTIPLIER",
                ws_defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "PRICE_FEED_MAX_RECONNECT_ATTEMPTS",
                ws_defaults.max_reconnect_attempts,
            ),
        };

        let sync_defaults = SyncSettings::default();
        let sync = SyncSettings {
            debounce: env.duration_millis("PRICE_FEED_DEBOUNCE_MS", sync_defaults.debounce),
            batch_window: env
                .duration_millis("PRICE_FEED_BATCH_WINDOW_MS", sync_defaults.batch_window),
            auto_connect: env.flag("PRICE_FEED_AUTO_CONNECT", sync_defaults.auto_connect),
        };

        let server = ServerSettings {
            health_port: env.parse(
                "PRICE_FEED_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            url,
            symbols,
            websocket,
            sync,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Feed URL is not a WebSocket URL.
    #[error("feed URL must start with ws:// or wss://, got {0}")]
    InvalidUrl(String),
    /// `.env` file could not be read.
    #[error("failed to load env file: {0}")]
    EnvFile(#[from] dotenvy::Error),
}

/// Split a comma separated symbol list, dropping blanks and duplicates.
fn parse_symbols(raw: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for symbol in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if !symbols.iter().any(|s| s == symbol) {
            symbols.push(symbol.to_string());
        }
    }
    symbols
}

/// Typed access over a key lookup; unparseable values fall back to defaults.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map_or(default, |v| match v.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => default,
            })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}
