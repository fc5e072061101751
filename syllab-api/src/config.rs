//! API server configuration.

use std::time::Duration;

const DEFAULT_BIND_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_STREAM_POLL_MS: u64 = 900;

/// Configuration for the HTTP layer.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_host: String,
    pub port: u16,

    /// How often the SSE stream polls the event log for new entries.
    pub stream_poll_interval: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_host: DEFAULT_BIND_HOST.to_string(),
            port: DEFAULT_PORT,
            stream_poll_interval: Duration::from_millis(DEFAULT_STREAM_POLL_MS),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SYLLAB_API_BIND`: bind host (default: 0.0.0.0)
    /// - `PORT` or `SYLLAB_API_PORT`: listen port (default: 3000)
    /// - `SYLLAB_STREAM_POLL_MS`: SSE tail poll interval (default: 900)
    pub fn from_env() -> Self {
        let bind_host =
            std::env::var("SYLLAB_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());

        let port = std::env::var("PORT")
            .ok()
            .or_else(|| std::env::var("SYLLAB_API_PORT").ok())
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let stream_poll_interval = Duration::from_millis(
            std::env::var("SYLLAB_STREAM_POLL_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STREAM_POLL_MS),
        );

        Self {
            bind_host,
            port,
            stream_poll_interval,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.stream_poll_interval, Duration::from_millis(900));
    }
}
