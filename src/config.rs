//! Client configuration loaded from environment variables.
//!
//! Follows 12-factor style: every setting comes from an environment variable
//! (or a `.env` file via `dotenvy`) and falls back to the documented default.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::CommError;

/// Longest accepted session token lifetime, in days.
pub const MAX_TOKEN_TTL_DAYS: i64 = 3650;

/// Top-level client configuration.
///
/// Loaded once at startup via [`ClientConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// WebSocket endpoint of the console server (e.g. `ws://host:9000/socket`).
    pub endpoint: String,

    /// Fixed delay between a close and the next connection attempt.
    pub reconnect_interval: Duration,

    /// A connection attempt that is not open after this long is aborted.
    pub connect_timeout: Duration,

    /// Delay between the first queued outbound message and the batch flush.
    pub flush_delay: Duration,

    /// Retry delay for a flush that fired before the handshake completed.
    pub handshake_retry_delay: Duration,

    /// Batches longer than this many UTF-16 units are sent compressed.
    pub compression_threshold: usize,

    /// Period of the deferred-unsubscribe sweep.
    pub sweep_interval: Duration,

    /// How long a subscription must stay empty before it is dropped.
    pub unsubscribe_grace: Duration,

    /// File holding the session token. `None` keeps the token in memory.
    pub token_file: Option<PathBuf>,

    /// Lifetime of a persisted session token, in days.
    pub token_ttl_days: i64,

    /// Capacity of the session [`crate::domain::EventBus`].
    pub event_bus_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:9000/socket".to_string(),
            reconnect_interval: Duration::from_millis(3000),
            connect_timeout: Duration::from_millis(5000),
            flush_delay: Duration::from_millis(100),
            handshake_retry_delay: Duration::from_millis(1000),
            compression_threshold: 100,
            sweep_interval: Duration::from_millis(30_000),
            unsubscribe_grace: Duration::from_millis(15_000),
            token_file: None,
            token_ttl_days: 30,
            event_bus_capacity: 1024,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Config`] if `ES_ENDPOINT` is set but is not a
    /// `ws://` or `wss://` URL, or if `ES_TOKEN_TTL_DAYS` is out of range.
    pub fn from_env() -> Result<Self, CommError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Config`] if the endpoint is not a WebSocket URL
    /// or the token lifetime is outside `1..=MAX_TOKEN_TTL_DAYS`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CommError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let endpoint = lookup("ES_ENDPOINT").unwrap_or(defaults.endpoint);
        validate_endpoint(&endpoint)?;

        let token_ttl_days = parse_value(lookup("ES_TOKEN_TTL_DAYS"), defaults.token_ttl_days);
        validate_token_ttl(token_ttl_days)?;

        let millis = |key: &str, default: Duration| {
            Duration::from_millis(parse_value(lookup(key), duration_ms(default)))
        };

        Ok(Self {
            endpoint,
            reconnect_interval: millis("ES_RECONNECT_INTERVAL_MS", defaults.reconnect_interval),
            connect_timeout: millis("ES_CONNECT_TIMEOUT_MS", defaults.connect_timeout),
            flush_delay: millis("ES_FLUSH_DELAY_MS", defaults.flush_delay),
            handshake_retry_delay: millis("ES_HANDSHAKE_RETRY_MS", defaults.handshake_retry_delay),
            compression_threshold: parse_value(
                lookup("ES_COMPRESSION_THRESHOLD"),
                defaults.compression_threshold,
            ),
            sweep_interval: millis("ES_SWEEP_INTERVAL_MS", defaults.sweep_interval),
            unsubscribe_grace: millis("ES_UNSUBSCRIBE_GRACE_MS", defaults.unsubscribe_grace),
            token_file: lookup("ES_TOKEN_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            token_ttl_days,
            event_bus_capacity: parse_value(
                lookup("ES_EVENT_BUS_CAPACITY"),
                defaults.event_bus_capacity,
            )
            .max(1),
        })
    }

    /// Returns a copy pointing at a different endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::Config`] if `endpoint` is not a WebSocket URL.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Result<Self, CommError> {
        let endpoint = endpoint.into();
        validate_endpoint(&endpoint)?;
        self.endpoint = endpoint;
        Ok(self)
    }
}

fn validate_endpoint(endpoint: &str) -> Result<(), CommError> {
    if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(())
    } else {
        Err(CommError::Config(format!(
            "endpoint must be a ws:// or wss:// URL, got {endpoint:?}"
        )))
    }
}

fn validate_token_ttl(days: i64) -> Result<(), CommError> {
    if (1..=MAX_TOKEN_TTL_DAYS).contains(&days) {
        Ok(())
    } else {
        Err(CommError::Config(format!(
            "ES_TOKEN_TTL_DAYS must be between 1 and {MAX_TOKEN_TTL_DAYS}, got {days}"
        )))
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Parses an optional raw value as `T`, returning `default` on missing or
/// invalid values.
fn parse_value<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let Ok(cfg) = ClientConfig::from_lookup(|_| None) else {
            panic!("defaults must be valid");
        };
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(3));
        assert_eq!(cfg.compression_threshold, 100);
    }

    #[test]
    fn overrides_are_applied() {
        let lookup = lookup_from(&[
            ("ES_ENDPOINT", "wss://console.example/socket"),
            ("ES_FLUSH_DELAY_MS", "25"),
            ("ES_TOKEN_FILE", "/tmp/token.json"),
            ("ES_TOKEN_TTL_DAYS", "7"),
        ]);
        let Ok(cfg) = ClientConfig::from_lookup(lookup) else {
            panic!("valid overrides");
        };
        assert_eq!(cfg.endpoint, "wss://console.example/socket");
        assert_eq!(cfg.flush_delay, Duration::from_millis(25));
        assert_eq!(cfg.token_file, Some(PathBuf::from("/tmp/token.json")));
        assert_eq!(cfg.token_ttl_days, 7);
    }

    #[test]
    fn garbage_numbers_fall_back() {
        let lookup = lookup_from(&[("ES_CONNECT_TIMEOUT_MS", "soon")]);
        let Ok(cfg) = ClientConfig::from_lookup(lookup) else {
            panic!("numeric garbage is not fatal");
        };
        assert_eq!(cfg.connect_timeout, Duration::from_millis(5000));
    }

    #[test]
    fn non_websocket_endpoint_is_rejected() {
        let lookup = lookup_from(&[("ES_ENDPOINT", "http://localhost:9000")]);
        assert!(matches!(
            ClientConfig::from_lookup(lookup),
            Err(CommError::Config(_))
        ));
        assert!(ClientConfig::default().with_endpoint("localhost").is_err());
    }

    #[test]
    fn token_ttl_out_of_range_is_rejected() {
        for raw in ["0", "-5", "100000000"] {
            let lookup = lookup_from(&[("ES_TOKEN_TTL_DAYS", raw)]);
            assert!(
                matches!(ClientConfig::from_lookup(lookup), Err(CommError::Config(_))),
                "ttl {raw} accepted"
            );
        }
        let lookup = lookup_from(&[("ES_TOKEN_TTL_DAYS", "3650")]);
        assert!(matches!(ClientConfig::from_lookup(lookup), Ok(c) if c.token_ttl_days == 3650));
    }
}
