use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_base_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    5
}

// =============================================================================
// ReconnectPolicy
// =============================================================================

/// Exponential backoff: attempt `n` (0-based) waits
/// `min(base_delay_ms * 2^n, max_delay_ms)`, for at most `max_attempts`
/// attempts in a row. The counter resets whenever a connection opens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        let ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_delay_ms == 0 {
            return Err(ConfigError::NonPositive { name: "base_delay_ms", value: 0.0 });
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(ConfigError::Range {
                low_name: "base_delay_ms",
                low: self.base_delay_ms as f64,
                high_name: "max_delay_ms",
                high: self.max_delay_ms as f64,
            });
        }
        Ok(())
    }
}

// =============================================================================
// StreamConfig
// =============================================================================

/// Per-stream connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Reconnect after errors and unsolicited closes.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Handshake deadline.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// Ping period. 0 disables the heartbeat.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Capacity of the routed-event channel handed to the consumer.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Endpoint root; `/ws/<name>` or `/stream?streams=...` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            auto_reconnect: true,
            connection_timeout_ms: default_connection_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            channel_capacity: default_channel_capacity(),
            base_url: default_base_url(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl StreamConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_ms > 0).then(|| Duration::from_millis(self.heartbeat_interval_ms))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_timeout_ms == 0 {
            return Err(ConfigError::NonPositive { name: "connection_timeout_ms", value: 0.0 });
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::NonPositive { name: "channel_capacity", value: 0.0 });
        }
        self.reconnect.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let p = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..7).map(|n| p.delay(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn backoff_does_not_overflow() {
        let p = ReconnectPolicy::default();
        assert_eq!(p.delay(200), Duration::from_millis(30_000));
    }

    #[test]
    fn defaults_from_empty_json() {
        let cfg: StreamConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, StreamConfig::default());
        assert!(cfg.auto_reconnect);
        assert_eq!(cfg.connection_timeout(), Duration::from_secs(10));
        assert_eq!(cfg.heartbeat_interval(), Some(Duration::from_secs(30)));
        assert_eq!(cfg.reconnect.max_attempts, 5);
    }

    #[test]
    fn zero_heartbeat_disables_it() {
        let cfg = StreamConfig { heartbeat_interval_ms: 0, ..StreamConfig::default() };
        assert_eq!(cfg.heartbeat_interval(), None);
    }

    #[test]
    fn rejects_bad_values() {
        let cfg = StreamConfig { connection_timeout_ms: 0, ..StreamConfig::default() };
        assert!(cfg.validate().is_err());

        let mut cfg = StreamConfig::default();
        cfg.reconnect.max_delay_ms = 10;
        assert!(matches!(cfg.validate(), Err(ConfigError::Range { .. })));
    }
}
