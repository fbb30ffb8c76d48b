// =============================================================================
// Strategy configuration
// =============================================================================
//
// Every field carries a serde default so a partial (or empty) JSON object is
// a valid config. Values are checked once, in `validate`, before a strategy
// is built; nothing is re-checked on the hot path.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::indicators::Smoothing;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_fast_period() -> usize {
    9
}

fn default_slow_period() -> usize {
    21
}

fn default_trend_period() -> usize {
    50
}

fn default_fourteen() -> usize {
    14
}

fn default_three() -> usize {
    3
}

fn default_atr_stop_multiplier() -> f64 {
    1.2
}

fn default_atr_take_profit_multiplier() -> f64 {
    1.8
}

fn default_base_position_size() -> f64 {
    1.0
}

fn default_min_position_size() -> f64 {
    0.1
}

fn default_rsi_overbought() -> f64 {
    75.0
}

fn default_rsi_oversold() -> f64 {
    25.0
}

fn default_rsi_exit_overbought() -> f64 {
    80.0
}

fn default_rsi_exit_oversold() -> f64 {
    20.0
}

fn default_volume_window() -> usize {
    20
}

fn default_volume_spike_factor() -> f64 {
    1.5
}

fn default_trend_strength_threshold() -> f64 {
    0.3
}

fn default_min_risk_reward_ratio() -> f64 {
    1.2
}

fn default_max_trade_duration_bars() -> Option<u64> {
    Some(120)
}

fn default_max_trade_duration_ms() -> Option<i64> {
    Some(2 * 60 * 60 * 1000)
}

// =============================================================================
// StrategyConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    // ── Indicator periods ───────────────────────────────────────────────────
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,

    #[serde(default = "default_slow_period")]
    pub slow_period: usize,

    #[serde(default = "default_trend_period")]
    pub trend_period: usize,

    /// ATR look-back.
    #[serde(default = "default_fourteen")]
    pub volatility_period: usize,

    #[serde(default)]
    pub volatility_smoothing: Smoothing,

    #[serde(default = "default_fourteen")]
    pub rsi_period: usize,

    /// Stochastic %K look-back.
    #[serde(default = "default_fourteen")]
    pub stochastic_period: usize,

    /// SMA applied to raw %K.
    #[serde(default = "default_three")]
    pub stochastic_smoothing: usize,

    /// SMA of slow %K that forms %D.
    #[serde(default = "default_three")]
    pub stochastic_signal_period: usize,

    // ── Risk ────────────────────────────────────────────────────────────────
    #[serde(default = "default_atr_stop_multiplier")]
    pub atr_stop_multiplier: f64,

    #[serde(default = "default_atr_take_profit_multiplier")]
    pub atr_take_profit_multiplier: f64,

    #[serde(default = "default_min_risk_reward_ratio")]
    pub min_risk_reward_ratio: f64,

    #[serde(default)]
    pub trailing_stop_enabled: bool,

    /// ATR multiple for the trailing distance; defaults to the stop multiplier.
    #[serde(default)]
    pub trailing_stop_multiplier: Option<f64>,

    // ── Sizing ──────────────────────────────────────────────────────────────
    #[serde(default = "default_base_position_size")]
    pub base_position_size: f64,

    /// Upper bound on units; defaults to three times the base size.
    #[serde(default)]
    pub max_position_size: Option<f64>,

    #[serde(default = "default_min_position_size")]
    pub min_position_size: f64,

    #[serde(default = "default_true")]
    pub volatility_adjustment: bool,

    // ── Volatility gates ────────────────────────────────────────────────────
    /// ATR floor: below it pullbacks are disarmed and no entry is taken.
    #[serde(default)]
    pub min_volatility: f64,

    /// ATR ceiling for new entries. `None` means unbounded.
    #[serde(default)]
    pub max_volatility: Option<f64>,

    // ── Oscillator thresholds ───────────────────────────────────────────────
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,

    #[serde(default = "default_rsi_exit_overbought")]
    pub rsi_exit_overbought: f64,

    #[serde(default = "default_rsi_exit_oversold")]
    pub rsi_exit_oversold: f64,

    // ── Confirmation ────────────────────────────────────────────────────────
    #[serde(default)]
    pub require_momentum_confirmation: bool,

    #[serde(default)]
    pub volume_weighted: bool,

    #[serde(default = "default_volume_window")]
    pub volume_window: usize,

    #[serde(default = "default_volume_spike_factor")]
    pub volume_spike_factor: f64,

    #[serde(default = "default_true")]
    pub allow_shallow_pullbacks: bool,

    #[serde(default = "default_trend_strength_threshold")]
    pub trend_strength_threshold: f64,

    // ── Exits ───────────────────────────────────────────────────────────────
    #[serde(default = "default_true")]
    pub early_exit_enabled: bool,

    #[serde(default = "default_max_trade_duration_bars")]
    pub max_trade_duration_bars: Option<u64>,

    #[serde(default = "default_max_trade_duration_ms")]
    pub max_trade_duration_ms: Option<i64>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            trend_period: default_trend_period(),
            volatility_period: default_fourteen(),
            volatility_smoothing: Smoothing::default(),
            rsi_period: default_fourteen(),
            stochastic_period: default_fourteen(),
            stochastic_smoothing: default_three(),
            stochastic_signal_period: default_three(),
            atr_stop_multiplier: default_atr_stop_multiplier(),
            atr_take_profit_multiplier: default_atr_take_profit_multiplier(),
            min_risk_reward_ratio: default_min_risk_reward_ratio(),
            trailing_stop_enabled: false,
            trailing_stop_multiplier: None,
            base_position_size: default_base_position_size(),
            max_position_size: None,
            min_position_size: default_min_position_size(),
            volatility_adjustment: true,
            min_volatility: 0.0,
            max_volatility: None,
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            rsi_exit_overbought: default_rsi_exit_overbought(),
            rsi_exit_oversold: default_rsi_exit_oversold(),
            require_momentum_confirmation: false,
            volume_weighted: false,
            volume_window: default_volume_window(),
            volume_spike_factor: default_volume_spike_factor(),
            allow_shallow_pullbacks: true,
            trend_strength_threshold: default_trend_strength_threshold(),
            early_exit_enabled: true,
            max_trade_duration_bars: default_max_trade_duration_bars(),
            max_trade_duration_ms: default_max_trade_duration_ms(),
        }
    }
}

impl StrategyConfig {
    pub fn max_position_size(&self) -> f64 {
        self.max_position_size.unwrap_or(self.base_position_size * 3.0)
    }

    pub fn trailing_stop_multiplier(&self) -> f64 {
        self.trailing_stop_multiplier.unwrap_or(self.atr_stop_multiplier)
    }

    /// Reject configurations the state machine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // ── Periods ──────────────────────────────────────────────────────────
        for (name, value) in [
            ("fast_period", self.fast_period),
            ("slow_period", self.slow_period),
            ("trend_period", self.trend_period),
            ("volatility_period", self.volatility_period),
            ("rsi_period", self.rsi_period),
            ("stochastic_period", self.stochastic_period),
            ("stochastic_smoothing", self.stochastic_smoothing),
            ("stochastic_signal_period", self.stochastic_signal_period),
            ("volume_window", self.volume_window),
        ] {
            if value == 0 {
                return Err(ConfigError::NonPositive { name, value: 0.0 });
            }
        }
        if self.fast_period >= self.slow_period {
            return Err(ConfigError::PeriodOrder { fast: self.fast_period, slow: self.slow_period });
        }

        // ── Strictly positive reals ──────────────────────────────────────────
        for (name, value) in [
            ("atr_stop_multiplier", self.atr_stop_multiplier),
            ("atr_take_profit_multiplier", self.atr_take_profit_multiplier),
            ("base_position_size", self.base_position_size),
            ("max_position_size", self.max_position_size()),
            ("trailing_stop_multiplier", self.trailing_stop_multiplier()),
            ("volume_spike_factor", self.volume_spike_factor),
        ] {
            positive(name, value)?;
        }

        // ── Non-negative reals ───────────────────────────────────────────────
        for (name, value) in [
            ("min_position_size", self.min_position_size),
            ("min_volatility", self.min_volatility),
            ("min_risk_reward_ratio", self.min_risk_reward_ratio),
            ("trend_strength_threshold", self.trend_strength_threshold),
        ] {
            non_negative(name, value)?;
        }

        ordered("min_position_size", self.min_position_size, "max_position_size", self.max_position_size())?;
        if let Some(max_vol) = self.max_volatility {
            positive("max_volatility", max_vol)?;
            ordered("min_volatility", self.min_volatility, "max_volatility", max_vol)?;
        }

        // ── Oscillator thresholds ────────────────────────────────────────────
        for (name, value) in [
            ("rsi_overbought", self.rsi_overbought),
            ("rsi_oversold", self.rsi_oversold),
            ("rsi_exit_overbought", self.rsi_exit_overbought),
            ("rsi_exit_oversold", self.rsi_exit_oversold),
        ] {
            non_negative(name, value)?;
            ordered(name, value, "100", 100.0)?;
        }
        ordered("rsi_oversold", self.rsi_oversold, "rsi_overbought", self.rsi_overbought)?;
        ordered(
            "rsi_exit_oversold",
            self.rsi_exit_oversold,
            "rsi_exit_overbought",
            self.rsi_exit_overbought,
        )?;

        if let Some(ms) = self.max_trade_duration_ms {
            positive("max_trade_duration_ms", ms as f64)?;
        }
        if self.max_trade_duration_bars == Some(0) {
            return Err(ConfigError::NonPositive { name: "max_trade_duration_bars", value: 0.0 });
        }
        Ok(())
    }
}

fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value <= 0.0 {
        return Err(ConfigError::NonPositive { name, value });
    }
    Ok(())
}

fn non_negative(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(ConfigError::NotFinite { name });
    }
    if value < 0.0 {
        return Err(ConfigError::Negative { name, value });
    }
    Ok(())
}

fn ordered(low_name: &'static str, low: f64, high_name: &'static str, high: f64) -> Result<(), ConfigError> {
    if low > high {
        return Err(ConfigError::Range { low_name, low, high_name, high });
    }
    Ok(())
}
