//! Client configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 25_000;
pub const DEFAULT_MAX_REDIRECTS: usize = 5;
pub const DEFAULT_USER_AGENT: &str = concat!("room_signaling/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Timeout for ordinary requests (room page, TURN, message posts).
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// How long the server may hold a push-channel poll open.
    pub poll_timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            poll_timeout: Duration::from_millis(DEFAULT_POLL_TIMEOUT_MS),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ClientConfig {
    /// Build config from environment variables, falling back to defaults for
    /// anything unset or unparsable.
    ///
    /// - `ROOM_SIGNALING_REQUEST_TIMEOUT_SECS`: default 30
    /// - `ROOM_SIGNALING_CONNECT_TIMEOUT_SECS`: default 10
    /// - `ROOM_SIGNALING_POLL_TIMEOUT_MS`: default 25000
    /// - `ROOM_SIGNALING_MAX_REDIRECTS`: default 5
    /// - `ROOM_SIGNALING_USER_AGENT`
    pub fn from_env() -> Self {
        Self {
            request_timeout: Duration::from_secs(env_parse(
                "ROOM_SIGNALING_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )),
            connect_timeout: Duration::from_secs(env_parse(
                "ROOM_SIGNALING_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )),
            poll_timeout: Duration::from_millis(env_parse(
                "ROOM_SIGNALING_POLL_TIMEOUT_MS",
                DEFAULT_POLL_TIMEOUT_MS,
            )),
            max_redirects: env_parse("ROOM_SIGNALING_MAX_REDIRECTS", DEFAULT_MAX_REDIRECTS),
            user_agent: std::env::var("ROOM_SIGNALING_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Only this test touches the ROOM_SIGNALING_* variables.
    #[test]
    fn test_from_env() {
        std::env::set_var("ROOM_SIGNALING_POLL_TIMEOUT_MS", "1500");
        std::env::set_var("ROOM_SIGNALING_MAX_REDIRECTS", "not-a-number");
        std::env::set_var("ROOM_SIGNALING_USER_AGENT", "tester/1.0");
        std::env::remove_var("ROOM_SIGNALING_REQUEST_TIMEOUT_SECS");

        let config = ClientConfig::from_env();
        assert_eq!(config.poll_timeout, Duration::from_millis(1500));
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert_eq!(config.user_agent, "tester/1.0");
        assert_eq!(
            config.request_timeout,
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );

        std::env::remove_var("ROOM_SIGNALING_POLL_TIMEOUT_MS");
        std::env::remove_var("ROOM_SIGNALING_MAX_REDIRECTS");
        std::env::remove_var("ROOM_SIGNALING_USER_AGENT");
    }
}
