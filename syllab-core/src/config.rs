//! Engine configuration
//!
//! Liveness thresholds are deliberately configuration rather than constants:
//! deployments with slower generation backends can widen them without a
//! rebuild.

use std::time::Duration;

const DEFAULT_STALE_AFTER_SECS: u64 = 180;
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 12;
const DEFAULT_MAX_RETRIES: i32 = 2;

/// Configuration for the build engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// A Running job whose heartbeat is older than this is considered
    /// crashed and becomes eligible for forced failure / lease stealing
    /// (default: 180 seconds).
    pub stale_after: Duration,

    /// How often the heartbeat guard refreshes `last_heartbeat_at` while a
    /// generation call is in flight (default: 12 seconds).
    pub heartbeat_interval: Duration,

    /// Retry budget assigned to newly created jobs (default: 2).
    pub max_retries: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(DEFAULT_STALE_AFTER_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl EngineConfig {
    /// Create EngineConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `SYLLAB_STALE_AFTER_SECS`: stale heartbeat threshold (default: 180)
    /// - `SYLLAB_HEARTBEAT_SECS`: mid-call heartbeat refresh interval (default: 12)
    /// - `SYLLAB_MAX_RETRIES`: retry budget for new jobs (default: 2)
    pub fn from_env() -> Self {
        let stale_after = Duration::from_secs(
            std::env::var("SYLLAB_STALE_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_STALE_AFTER_SECS),
        );

        let heartbeat_interval = Duration::from_secs(
            std::env::var("SYLLAB_HEARTBEAT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_SECS),
        );

        let max_retries = std::env::var("SYLLAB_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MAX_RETRIES);

        Self {
            stale_after,
            heartbeat_interval,
            max_retries,
        }
    }

    /// Configuration for tests with short intervals.
    pub fn development() -> Self {
        Self {
            stale_after: Duration::from_millis(200),
            heartbeat_interval: Duration::from_millis(20),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.stale_after, Duration::from_secs(180));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(12));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_config_development_is_fast() {
        let config = EngineConfig::development();
        assert!(config.stale_after < Duration::from_secs(1));
        assert!(config.heartbeat_interval < config.stale_after);
    }
}
