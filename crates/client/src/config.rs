//! Client configuration from environment variables.

use url::Url;

use crate::ws::{ReconnectConfig, RetryState};

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Runtime configuration for the dashboard client.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// HTTP API base; the updates endpoint is derived from it.
    pub api_url: String,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `SYNAPSE_API_URL`: HTTP API base (default: "http://localhost:8000")
    /// - `SYNAPSE_RECONNECT_INITIAL_MS`: first reconnect delay (default: 3000)
    /// - `SYNAPSE_RECONNECT_MAX_MS`: reconnect delay ceiling (default: 30000)
    /// - `SYNAPSE_RECONNECT_MULTIPLIER`: backoff factor (default: 2.0)
    /// - `SYNAPSE_RECONNECT_JITTER_MS`: max random jitter per delay (default: 0)
    /// - `SYNAPSE_RECONNECT_MAX_ATTEMPTS`: give up after this many, 0 = never (default: 0)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = ReconnectConfig::default();

        let api_url = lookup("SYNAPSE_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let reconnect = ReconnectConfig {
            initial_delay_ms: parse_or(
                &lookup,
                "SYNAPSE_RECONNECT_INITIAL_MS",
                defaults.initial_delay_ms,
            ),
            max_delay_ms: parse_or(&lookup, "SYNAPSE_RECONNECT_MAX_MS", defaults.max_delay_ms),
            backoff_multiplier: parse_or(
                &lookup,
                "SYNAPSE_RECONNECT_MULTIPLIER",
                defaults.backoff_multiplier,
            ),
            jitter_ms: parse_or(&lookup, "SYNAPSE_RECONNECT_JITTER_MS", defaults.jitter_ms),
            max_attempts: parse_or(
                &lookup,
                "SYNAPSE_RECONNECT_MAX_ATTEMPTS",
                defaults.max_attempts,
            ),
        };
        let reconnect = match reconnect.validate() {
            Ok(()) => reconnect,
            Err(e) => {
                tracing::warn!("ignoring SYNAPSE_RECONNECT_* settings: {}", e);
                defaults
            }
        };

        Self { api_url, reconnect }
    }

    /// WebSocket URL of the updates channel.
    pub fn updates_url(&self) -> Result<Url, synapse_shared::ProtocolError> {
        synapse_shared::updates_url(&self.api_url)
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!("ignoring invalid {}={:?}, using {}", key, raw, default);
                default
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rstest::rstest;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[rstest]
    fn test_defaults() {
        let config = ClientConfig::from_lookup(|_| None);
        assert_eq!(config, ClientConfig::default());
        assert_eq!(
            config.updates_url().unwrap().as_str(),
            "ws://localhost:8000/ws/updates"
        );
    }

    #[rstest]
    fn test_overrides() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("SYNAPSE_API_URL", "https://api.synapse.dev"),
            ("SYNAPSE_RECONNECT_INITIAL_MS", "500"),
            ("SYNAPSE_RECONNECT_MAX_MS", "8000"),
            ("SYNAPSE_RECONNECT_MULTIPLIER", "1.5"),
            ("SYNAPSE_RECONNECT_JITTER_MS", "100"),
            ("SYNAPSE_RECONNECT_MAX_ATTEMPTS", "12"),
        ]));

        assert_eq!(config.api_url, "https://api.synapse.dev");
        assert_eq!(
            config.reconnect,
            ReconnectConfig {
                max_attempts: 12,
                initial_delay_ms: 500,
                max_delay_ms: 8000,
                backoff_multiplier: 1.5,
                jitter_ms: 100,
            }
        );
        assert_eq!(
            config.updates_url().unwrap().as_str(),
            "wss://api.synapse.dev/ws/updates"
        );
    }

    #[rstest]
    #[case("SYNAPSE_RECONNECT_INITIAL_MS", "soon")]
    #[case("SYNAPSE_RECONNECT_MAX_MS", "-1")]
    #[case("SYNAPSE_RECONNECT_MAX_ATTEMPTS", "")]
    fn test_invalid_values_fall_back(#[case] key: &str, #[case] value: &str) {
        let config = ClientConfig::from_lookup(lookup_from(&[(key, value)]));
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[rstest]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "0.5")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "NaN")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "inf")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "-2")])]
    #[case(&[("SYNAPSE_RECONNECT_INITIAL_MS", "0")])]
    #[case(&[("SYNAPSE_RECONNECT_INITIAL_MS", "40000")])]
    #[case(&[("SYNAPSE_RECONNECT_INITIAL_MS", "500"), ("SYNAPSE_RECONNECT_MAX_MS", "100")])]
    fn test_out_of_range_values_fall_back(#[case] pairs: &[(&str, &str)]) {
        let config = ClientConfig::from_lookup(lookup_from(pairs));
        assert_eq!(config.reconnect, ReconnectConfig::default());
    }

    #[rstest]
    #[case(&[])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "1.0")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "1.5"), ("SYNAPSE_RECONNECT_INITIAL_MS", "1")])]
    #[case(&[("SYNAPSE_RECONNECT_INITIAL_MS", "30000")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "0.5"), ("SYNAPSE_RECONNECT_INITIAL_MS", "0")])]
    #[case(&[("SYNAPSE_RECONNECT_MULTIPLIER", "10"), ("SYNAPSE_RECONNECT_JITTER_MS", "50")])]
    fn test_accepted_config_never_shrinks_delay(#[case] pairs: &[(&str, &str)]) {
        let config = ClientConfig::from_lookup(lookup_from(pairs));
        let jitter = config.reconnect.jitter_ms;
        let retry = RetryState::new(config.reconnect);

        let delays: Vec<u64> = (0..12)
            .map(|_| retry.next_delay().as_millis() as u64)
            .collect();

        assert!(delays.iter().all(|&d| d > 0), "zero delay in {delays:?}");
        // Jitter may reorder neighbours by at most its own width.
        assert!(
            delays.windows(2).all(|w| w[1] + jitter >= w[0]),
            "delays shrink: {delays:?}"
        );
    }

    #[rstest]
    fn test_blank_api_url_uses_default() {
        let config = ClientConfig::from_lookup(lookup_from(&[("SYNAPSE_API_URL", "  ")]));
        assert_eq!(config.api_url, DEFAULT_API_URL);
    }
}
