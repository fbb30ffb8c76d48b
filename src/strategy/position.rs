// =============================================================================
// Open position - barriers and the trailing ratchet
// =============================================================================
//
// A position carries two fixed barriers set at entry (stop and target) and,
// when trailing is enabled, a third that only ever moves in the position's
// favour:
//
//   best  = most favourable extreme seen since entry
//   trail = best -/+ trailing distance (ATR at entry x multiplier)
//
// The binding stop is whichever of the static stop and the trail is tighter.
// Barriers are checked against the candle's extremes before the ratchet is
// advanced with that same candle, so a bar can never stop itself out on a
// level it just created.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{EntryKind, ExitReason};
use crate::market_data::Candle;
use crate::types::Side;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub kind: EntryKind,
    pub entry_price: f64,
    /// Static stop set at entry. Risk is always measured against it.
    pub stop_loss: f64,
    pub take_profit: f64,
    pub units: f64,
    pub entry_index: u64,
    /// Open time of the entry candle.
    pub entry_time: i64,
    pub volatility_at_entry: f64,
    pub risk_reward_ratio: f64,
    /// Trailing level, once it has tightened past the static stop.
    pub trailing_stop: Option<f64>,
    /// Most favourable price since entry.
    pub best_price: f64,
}

impl Position {
    /// Risk per unit at entry.
    pub fn risk_per_unit(&self) -> f64 {
        (self.entry_price - self.stop_loss).abs()
    }

    /// The stop currently in force and whether the trail is the binding one.
    pub fn effective_stop(&self) -> (f64, bool) {
        match (self.side, self.trailing_stop) {
            (Side::Long, Some(trail)) if trail > self.stop_loss => (trail, true),
            (Side::Short, Some(trail)) if trail < self.stop_loss => (trail, true),
            _ => (self.stop_loss, false),
        }
    }

    /// Stop first, then target. Returns the fill level and the reason.
    pub fn check_barriers(&self, candle: &Candle) -> Option<(f64, ExitReason)> {
        let (stop, trailing) = self.effective_stop();
        let stop_reason = if trailing { ExitReason::TrailingStop } else { ExitReason::StopLoss };

        match self.side {
            Side::Long => {
                if candle.low <= stop {
                    Some((stop, stop_reason))
                } else if candle.high >= self.take_profit {
                    Some((self.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
            Side::Short => {
                if candle.high >= stop {
                    Some((stop, stop_reason))
                } else if candle.low <= self.take_profit {
                    Some((self.take_profit, ExitReason::TakeProfit))
                } else {
                    None
                }
            }
        }
    }

    /// Advance the trailing stop with `candle`. Only tightens, never widens.
    pub fn advance_trail(&mut self, candle: &Candle, distance: f64) {
        let candidate = match self.side {
            Side::Long => {
                self.best_price = self.best_price.max(candle.high);
                self.best_price - distance
            }
            Side::Short => {
                self.best_price = self.best_price.min(candle.low);
                self.best_price + distance
            }
        };

        let tightened = match (self.side, self.trailing_stop) {
            (Side::Long, Some(current)) => candidate > current,
            (Side::Short, Some(current)) => candidate < current,
            (Side::Long, None) => candidate > self.stop_loss,
            (Side::Short, None) => candidate < self.stop_loss,
        };
        if tightened {
            debug!(side = %self.side, trail = candidate, best = self.best_price, "trailing stop tightened");
            self.trailing_stop = Some(candidate);
        }
    }

    /// Realised PnL if closed at `exit_price`.
    pub fn pnl(&self, exit_price: f64) -> f64 {
        (exit_price - self.entry_price) * self.units * self.side.sign()
    }

    /// PnL expressed in units of initial risk.
    pub fn r_multiple(&self, pnl: f64) -> f64 {
        let risk = self.risk_per_unit() * self.units;
        if risk > 0.0 {
            pnl / risk
        } else {
            0.0
        }
    }
}
