// =============================================================================
// Error taxonomy for the scalper core
// =============================================================================
//
// Library boundaries return these typed errors; the binary and the config
// loader wrap them in `anyhow` with context.
//
//   CandleError    a raw record could not become a value object (fatal per record)
//   FrameError     a stream frame was malformed (logged and dropped)
//   ConfigError    a configuration was rejected at construction
//   StreamError    a connection manager operation was refused or failed
//   StrategyError  a candle could not be applied to the state machine

use thiserror::Error;

/// Failure to build a candle from a raw REST row, object or kline payload.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CandleError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },

    #[error("kline row has {0} columns, expected at least 11")]
    ShortRow(usize),

    #[error("unsupported candle encoding: {0}")]
    Encoding(String),

    #[error("inconsistent candle: {0}")]
    Inconsistent(String),
}

/// A frame that arrived on a live stream but could not be routed.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed record: {0}")]
    Record(#[from] CandleError),
}

/// A configuration value rejected at construction time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be greater than zero (got {value})")]
    NonPositive { name: &'static str, value: f64 },

    #[error("{name} must not be negative (got {value})")]
    Negative { name: &'static str, value: f64 },

    #[error("{name} must be finite")]
    NotFinite { name: &'static str },

    #[error("fast period ({fast}) must be shorter than slow period ({slow})")]
    PeriodOrder { fast: usize, slow: usize },

    #[error("{low_name} ({low}) must not exceed {high_name} ({high})")]
    Range {
        low_name: &'static str,
        low: f64,
        high_name: &'static str,
        high: f64,
    },
}

/// Errors surfaced by the stream connection manager.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("stream {0} is already registered")]
    AlreadyRegistered(String),

    #[error("stream spec has no topics")]
    NoTopics,

    #[error("invalid stream config: {0}")]
    Config(#[from] ConfigError),

    #[error("connect to {url} timed out after {timeout_ms} ms")]
    ConnectTimeout { url: String, timeout_ms: u64 },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no traffic for {0} ms, connection presumed dead")]
    HeartbeatTimeout(u64),
}

/// Errors surfaced when feeding candles to the strategy.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StrategyError {
    #[error("candle at {got} is not after the last applied candle at {last}")]
    OutOfOrder { last: i64, got: i64 },

    #[error("invalid strategy config: {0}")]
    Config(#[from] ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages_name_the_field() {
        let err = ConfigError::NonPositive { name: "fast_period", value: 0.0 };
        assert!(err.to_string().contains("fast_period"));

        let err = ConfigError::PeriodOrder { fast: 21, slow: 9 };
        assert_eq!(
            err.to_string(),
            "fast period (21) must be shorter than slow period (9)"
        );
    }

    #[test]
    fn frame_error_wraps_json_failure() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: FrameError = json_err.into();
        assert!(matches!(err, FrameError::Json(_)));
    }
}
