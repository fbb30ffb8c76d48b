// =============================================================================
// Runtime Configuration - application settings with atomic save
// =============================================================================
//
// Everything the binary needs to run one live pipeline: which series to
// trade, which extra topics to multiplex on the socket, and the stream and
// strategy settings.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry serde defaults so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::market_data::CandleKey;
use crate::strategy::StrategyConfig;
use crate::stream::{StreamConfig, StreamSpec, Topic};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_topics() -> Vec<Topic> {
    vec![Topic::AggTrade, Topic::BookTicker, Topic::MarkPrice, Topic::ForceOrder]
}

fn default_event_channel_capacity() -> usize {
    256
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,

    /// Kline interval fed to the strategy.
    #[serde(default = "default_interval")]
    pub interval: String,

    /// Topics multiplexed next to the kline stream.
    #[serde(default = "default_topics")]
    pub topics: Vec<Topic>,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Buffer between the pipeline and the strategy-event consumer.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            interval: default_interval(),
            topics: default_topics(),
            stream: StreamConfig::default(),
            strategy: StrategyConfig::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol = %config.symbol,
            interval = %config.interval,
            "config loaded"
        );

        Ok(config)
    }

    /// Persist to `path` with an atomic write (write `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }

    /// Check both nested configs before anything is started.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.symbol.trim().is_empty(), "symbol must not be empty");
        anyhow::ensure!(!self.interval.trim().is_empty(), "interval must not be empty");
        anyhow::ensure!(self.event_channel_capacity > 0, "event_channel_capacity must be positive");
        self.stream.validate().context("invalid stream config")?;
        self.strategy.validate().context("invalid strategy config")?;
        Ok(())
    }

    /// The series the strategy consumes.
    pub fn candle_key(&self) -> CandleKey {
        CandleKey { symbol: self.symbol.to_uppercase(), interval: self.interval.clone() }
    }

    /// Kline topic first, then the extra topics, without duplicates.
    pub fn stream_spec(&self) -> StreamSpec {
        let mut topics = vec![Topic::Kline { interval: self.interval.clone() }];
        for topic in &self.topics {
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
        StreamSpec::for_symbol(&self.symbol, &topics)
    }
}
