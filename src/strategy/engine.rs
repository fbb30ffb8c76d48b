// =============================================================================
// Pullback Strategy - candle-driven state machine
// =============================================================================
//
// Applied once per closed candle, strictly in open-time order:
//
//   1. Update EMA fast/slow/trend, ATR, RSI, stochastic and volume average
//   2. Stop here while any required indicator is still warming up
//   3. Classify the regime (TRENDING when |fast - slow| / ATR > threshold)
//   4. With a position open: stop -> target -> early exit -> holding limit
//   5. Flat (and nothing closed on this bar): take an armed pullback entry
//   6. Re-evaluate the pullback flags for the next bar
//
// States: Flat, Armed (a pullback flag is set), InPosition.
// At most one position is ever open.
// =============================================================================

use serde::Serialize;
use tracing::{debug, info};

use super::config::StrategyConfig;
use super::events::{EntryKind, EntrySignal, ExitReason, ExitSignal, StrategyEvent};
use super::position::Position;
use super::sizing::{self, Agreement, TradeStats};
use crate::error::StrategyError;
use crate::indicators::{Atr, Ema, Hlc, Indicator, Rsi, Sma, Stochastic, StochasticValue};
use crate::market_data::Candle;
use crate::types::{MarketRegime, Side};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyState {
    Flat,
    Armed,
    InPosition,
}

/// Indicator readings of the last candle, available once every required
/// indicator is stable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub fast: f64,
    pub slow: f64,
    pub trend: f64,
    /// ATR.
    pub volatility_range: f64,
    /// RSI.
    pub momentum_oscillator: f64,
    pub secondary_oscillator: Option<StochasticValue>,
    pub volume_average: Option<f64>,
}

/// Pending pullback per direction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ArmedFlags {
    long: Option<EntryKind>,
    short: Option<EntryKind>,
}

impl ArmedFlags {
    fn get(&self, side: Side) -> Option<EntryKind> {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    fn any(&self) -> bool {
        self.long.is_some() || self.short.is_some()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Readings of one stable candle, used to detect crosses on the next.
#[derive(Debug, Clone, Copy)]
struct LastBar {
    close: f64,
    fast: f64,
}

/// Required readings of the current candle.
#[derive(Debug, Clone, Copy)]
struct Readings {
    fast: f64,
    slow: f64,
    trend: f64,
    atr: f64,
    rsi: f64,
}

impl Readings {
    fn trend_aligned(&self, side: Side, close: f64) -> bool {
        match side {
            Side::Long => self.fast > self.slow && close > self.trend,
            Side::Short => self.fast < self.slow && close < self.trend,
        }
    }
}

struct Indicators {
    fast: Ema,
    slow: Ema,
    trend: Ema,
    atr: Atr,
    rsi: Rsi,
    stochastic: Stochastic,
    volume: Sma,
}

impl Indicators {
    fn new(config: &StrategyConfig) -> Self {
        Self {
            fast: Ema::new(config.fast_period),
            slow: Ema::new(config.slow_period),
            trend: Ema::new(config.trend_period),
            atr: Atr::new(config.volatility_period, config.volatility_smoothing),
            rsi: Rsi::new(config.rsi_period),
            stochastic: Stochastic::new(
                config.stochastic_period,
                config.stochastic_smoothing,
                config.stochastic_signal_period,
            ),
            volume: Sma::new(config.volume_window),
        }
    }

    fn update(&mut self, candle: &Candle) {
        let bar = Hlc::from(candle);
        self.fast.update(candle.close);
        self.slow.update(candle.close);
        self.trend.update(candle.close);
        self.atr.update(bar);
        self.rsi.update(candle.close);
        self.stochastic.update(bar);
        self.volume.update(candle.volume);
    }

    fn readings(&self) -> Option<Readings> {
        Some(Readings {
            fast: self.fast.result()?,
            slow: self.slow.result()?,
            trend: self.trend.result()?,
            atr: self.atr.result()?,
            rsi: self.rsi.result()?,
        })
    }

    fn snapshot(&self) -> Option<IndicatorSnapshot> {
        let r = self.readings()?;
        Some(IndicatorSnapshot {
            fast: r.fast,
            slow: r.slow,
            trend: r.trend,
            volatility_range: r.atr,
            momentum_oscillator: r.rsi,
            secondary_oscillator: self.stochastic.result(),
            volume_average: self.volume.result(),
        })
    }
}

// =============================================================================
// PullbackStrategy
// =============================================================================

pub struct PullbackStrategy {
    config: StrategyConfig,
    indicators: Indicators,
    flags: ArmedFlags,
    last_bar: Option<LastBar>,
    position: Option<Position>,
    stats: TradeStats,
    regime: MarketRegime,
    last_open_time: Option<i64>,
    candles_seen: u64,
}

impl PullbackStrategy {
    pub fn new(config: StrategyConfig) -> Result<Self, StrategyError> {
        config.validate()?;
        Ok(Self {
            indicators: Indicators::new(&config),
            config,
            flags: ArmedFlags::default(),
            last_bar: None,
            position: None,
            stats: TradeStats::default(),
            regime: MarketRegime::default(),
            last_open_time: None,
            candles_seen: 0,
        })
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn state(&self) -> StrategyState {
        if self.position.is_some() {
            StrategyState::InPosition
        } else if self.flags.any() {
            StrategyState::Armed
        } else {
            StrategyState::Flat
        }
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn regime(&self) -> MarketRegime {
        self.regime
    }

    pub fn stats(&self) -> &TradeStats {
        &self.stats
    }

    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        self.indicators.snapshot()
    }

    pub fn candles_seen(&self) -> u64 {
        self.candles_seen
    }

    /// Forget all history: indicators, flags, position and trade statistics.
    pub fn reset(&mut self) {
        self.indicators = Indicators::new(&self.config);
        self.flags.clear();
        self.last_bar = None;
        self.position = None;
        self.stats = TradeStats::default();
        self.regime = MarketRegime::default();
        self.last_open_time = None;
        self.candles_seen = 0;
    }

    /// Apply one closed candle and return the events it produced, in order.
    pub fn on_candle(&mut self, candle: &Candle) -> Result<Vec<StrategyEvent>, StrategyError> {
        if let Some(last) = self.last_open_time {
            if candle.open_time <= last {
                return Err(StrategyError::OutOfOrder { last, got: candle.open_time });
            }
        }
        self.last_open_time = Some(candle.open_time);
        let index = self.candles_seen;
        self.candles_seen += 1;

        // ── 1. Indicators ───────────────────────────────────────────────────
        self.indicators.update(candle);
        let Some(r) = self.indicators.readings() else {
            return Ok(Vec::new());
        };

        // ── 2. Regime ───────────────────────────────────────────────────────
        self.regime = if r.atr > 0.0 && (r.fast - r.slow).abs() / r.atr > self.config.trend_strength_threshold {
            MarketRegime::Trending
        } else {
            MarketRegime::Ranging
        };

        let mut events = Vec::new();

        // ── 3. Exits ────────────────────────────────────────────────────────
        let mut exited = false;
        if let Some(exit) = self.evaluate_exit(candle, index, &r) {
            events.push(StrategyEvent::Exit(exit));
            exited = true;
        }

        // ── 4. Volatility floor ─────────────────────────────────────────────
        if r.atr < self.config.min_volatility {
            if self.flags.any() {
                debug!(atr = r.atr, floor = self.config.min_volatility, "volatility below floor, pullback disarmed");
            }
            self.flags.clear();
            self.last_bar = Some(LastBar { close: candle.close, fast: r.fast });
            return Ok(events);
        }

        // ── 5. Entries ──────────────────────────────────────────────────────
        if !exited && self.position.is_none() {
            if let Some(entry) = self.evaluate_entry(candle, index, &r) {
                events.push(StrategyEvent::Entry(entry));
                self.flags.clear();
                self.last_bar = Some(LastBar { close: candle.close, fast: r.fast });
                return Ok(events);
            }
        }

        // ── 6. Pullback flags ───────────────────────────────────────────────
        self.update_flags(candle, &r);
        self.last_bar = Some(LastBar { close: candle.close, fast: r.fast });

        Ok(events)
    }

    // =========================================================================
    // Exits
    // =========================================================================

    fn evaluate_exit(&mut self, candle: &Candle, index: u64, r: &Readings) -> Option<ExitSignal> {
        let position = self.position.as_mut()?;

        let hit = position
            .check_barriers(candle)
            .or_else(|| {
                if !self.config.early_exit_enabled {
                    return None;
                }
                let exhausted = match position.side {
                    Side::Long => r.rsi > self.config.rsi_exit_overbought,
                    Side::Short => r.rsi < self.config.rsi_exit_oversold,
                };
                let reversed = match position.side {
                    Side::Long => r.fast < r.slow,
                    Side::Short => r.fast > r.slow,
                };
                if exhausted {
                    Some((candle.close, ExitReason::MomentumExhaustion))
                } else if reversed {
                    Some((candle.close, ExitReason::TrendReversal))
                } else {
                    None
                }
            })
            .or_else(|| {
                let bars = index - position.entry_index;
                let elapsed = candle.open_time - position.entry_time;
                let over_bars = self.config.max_trade_duration_bars.is_some_and(|max| bars > max);
                let over_time = self.config.max_trade_duration_ms.is_some_and(|max| elapsed > max);
                (over_bars || over_time).then_some((candle.close, ExitReason::MaxDuration))
            });

        let Some((price, reason)) = hit else {
            if self.config.trailing_stop_enabled {
                let distance = position.volatility_at_entry * self.config.trailing_stop_multiplier();
                position.advance_trail(candle, distance);
            }
            return None;
        };

        let position = self.position.take()?;
        let pnl = position.pnl(price);
        let exit = ExitSignal {
            side: position.side,
            price,
            pnl,
            r_multiple: position.r_multiple(pnl),
            index,
            timestamp: candle.close_time,
            reason,
            trade_duration: index - position.entry_index,
        };
        self.stats.record(pnl);

        info!(
            side = %exit.side,
            price = exit.price,
            pnl = exit.pnl,
            r = exit.r_multiple,
            bars = exit.trade_duration,
            reason = %exit.reason,
            "EXIT"
        );
        Some(exit)
    }

    // =========================================================================
    // Entries
    // =========================================================================

    fn evaluate_entry(&mut self, candle: &Candle, index: u64, r: &Readings) -> Option<EntrySignal> {
        [Side::Long, Side::Short]
            .into_iter()
            .find_map(|side| self.try_enter(side, candle, index, r))
    }

    fn try_enter(&mut self, side: Side, candle: &Candle, index: u64, r: &Readings) -> Option<EntrySignal> {
        let kind = self.flags.get(side)?;
        let close = candle.close;
        if !r.trend_aligned(side, close) {
            return None;
        }

        // ── Trigger ──
        let (beyond_fast, rsi_ok) = match side {
            Side::Long => (close > r.fast, r.rsi < self.config.rsi_overbought),
            Side::Short => (close < r.fast, r.rsi > self.config.rsi_oversold),
        };
        if !beyond_fast || !rsi_ok {
            return None;
        }

        let stochastic_agrees = self.indicators.stochastic.result().map(|v| match side {
            Side::Long => v.k >= v.d,
            Side::Short => v.k <= v.d,
        });
        let volume_spike = self
            .indicators
            .volume
            .result()
            .is_some_and(|avg| candle.volume > avg * self.config.volume_spike_factor);

        if self.config.require_momentum_confirmation {
            let confirmed = stochastic_agrees == Some(true) && (!self.config.volume_weighted || volume_spike);
            if !confirmed {
                debug!(side = %side, "pullback trigger without momentum confirmation");
                return None;
            }
        }

        // ── Barriers and gates ──
        let stop_loss = close - side.sign() * r.atr * self.config.atr_stop_multiplier;
        let take_profit = close + side.sign() * r.atr * self.config.atr_take_profit_multiplier;
        let risk = (close - stop_loss).abs();
        if risk <= 0.0 {
            return None;
        }
        let risk_reward_ratio = (take_profit - close).abs() / risk;
        if risk_reward_ratio < self.config.min_risk_reward_ratio {
            debug!(side = %side, rr = risk_reward_ratio, "entry rejected: risk/reward below minimum");
            return None;
        }
        if self.config.max_volatility.is_some_and(|max| r.atr > max) {
            debug!(side = %side, atr = r.atr, "entry rejected: volatility above ceiling");
            return None;
        }

        // ── Confidence and size ──
        let agreement = Agreement {
            rsi: rsi_ok,
            stochastic: stochastic_agrees,
            volume_spike: self.config.volume_weighted.then_some(volume_spike),
        };
        let confidence = sizing::confidence(agreement, self.regime, kind);
        let size = sizing::position_size(&self.config, r.atr, confidence, &self.stats);

        assert!(self.position.is_none(), "a second position cannot be opened while one is open");
        self.position = Some(Position {
            side,
            kind,
            entry_price: close,
            stop_loss,
            take_profit,
            units: size,
            entry_index: index,
            entry_time: candle.open_time,
            volatility_at_entry: r.atr,
            risk_reward_ratio,
            trailing_stop: None,
            best_price: close,
        });

        let entry = EntrySignal {
            side,
            price: close,
            stop_loss,
            take_profit,
            volatility: r.atr,
            size,
            index,
            timestamp: candle.open_time,
            reason: kind,
            confidence,
            risk_reward_ratio,
        };
        info!(
            side = %side,
            price = close,
            sl = stop_loss,
            tp = take_profit,
            size,
            confidence,
            reason = %kind,
            regime = %self.regime,
            "ENTRY"
        );
        Some(entry)
    }

    // =========================================================================
    // Pullback flags
    // =========================================================================

    fn update_flags(&mut self, candle: &Candle, r: &Readings) {
        let before = self.flags;
        self.flags.long = self.next_flag(Side::Long, candle, r);
        self.flags.short = self.next_flag(Side::Short, candle, r);
        if self.flags != before {
            debug!(long = ?self.flags.long, short = ?self.flags.short, close = candle.close, "pullback flags changed");
        }
    }

    /// A flag arms on the bar whose close crosses back through the fast EMA
    /// against the trend, stays armed while the pullback continues, and its
    /// depth is re-read on every bar.
    fn next_flag(&self, side: Side, candle: &Candle, r: &Readings) -> Option<EntryKind> {
        if !r.trend_aligned(side, candle.close) {
            return None;
        }

        let (pulled_back, crossed) = match side {
            Side::Long => (
                candle.close < r.fast,
                self.last_bar.is_some_and(|b| b.close >= b.fast),
            ),
            Side::Short => (
                candle.close > r.fast,
                self.last_bar.is_some_and(|b| b.close <= b.fast),
            ),
        };
        if !pulled_back || !(crossed || self.flags.get(side).is_some()) {
            return None;
        }

        // Deep holds beyond the slow EMA, shallow reaches it but holds the trend EMA.
        let (deep, shallow) = match side {
            Side::Long => (candle.low > r.slow, candle.low > r.trend),
            Side::Short => (candle.high < r.slow, candle.high < r.trend),
        };
        if deep {
            Some(EntryKind::DeepPullback)
        } else if shallow && self.config.allow_shallow_pullbacks {
            Some(EntryKind::ShallowPullback)
        } else {
            None
        }
    }
}
