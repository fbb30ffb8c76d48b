// =============================================================================
// Sizing - confidence score, position size, trade statistics
// =============================================================================
//
// Size is the base size scaled by three factors:
//
//   volatility  clamp(baseline / ATR, 0.5, 1.5)   smaller when ATR is high
//   streak      0.5 after more than two losses, 1.2 after three or more wins
//   confidence  0.7 + 0.3 * confidence
//
// and then bounded to [min_position_size, max_position_size].
// =============================================================================

use serde::{Deserialize, Serialize};

use super::config::StrategyConfig;
use super::events::EntryKind;
use crate::types::MarketRegime;

const BASE_CONFIDENCE: f64 = 0.6;
const MAX_CONFIDENCE: f64 = 0.95;
const SHALLOW_DISCOUNT: f64 = 0.8;

/// Oscillator agreement observed on the trigger candle.
#[derive(Debug, Clone, Copy, Default)]
pub struct Agreement {
    pub rsi: bool,
    /// `None` while the stochastic is still warming up.
    pub stochastic: Option<bool>,
    /// `None` unless volume weighting is enabled.
    pub volume_spike: Option<bool>,
}

/// Bounded heuristic in [0, 1].
pub fn confidence(agreement: Agreement, regime: MarketRegime, kind: EntryKind) -> f64 {
    let mut score = BASE_CONFIDENCE;
    if agreement.rsi {
        score += 0.15;
    }
    if agreement.stochastic == Some(true) {
        score += 0.1;
    }
    if agreement.volume_spike == Some(true) {
        score += 0.1;
    }
    if regime == MarketRegime::Trending {
        score += 0.1;
    }
    let score = score.min(MAX_CONFIDENCE);
    match kind {
        EntryKind::DeepPullback => score,
        EntryKind::ShallowPullback => score * SHALLOW_DISCOUNT,
    }
}

/// Units to trade for an entry at the given ATR and confidence.
pub fn position_size(config: &StrategyConfig, atr: f64, confidence: f64, stats: &TradeStats) -> f64 {
    let min = config.min_position_size;
    let max = config.max_position_size();

    if !config.volatility_adjustment {
        return config.base_position_size.max(min).min(max);
    }

    let baseline = if config.min_volatility > 0.0 { config.min_volatility } else { atr };
    let volatility_factor = if atr > 0.0 { (baseline / atr).clamp(0.5, 1.5) } else { 1.0 };

    let size = config.base_position_size
        * volatility_factor
        * stats.streak_factor()
        * (0.7 + 0.3 * confidence);
    size.clamp(min, max)
}

// =============================================================================
// TradeStats
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeStats {
    pub consecutive_wins: u32,
    pub consecutive_losses: u32,
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub realized_pnl: f64,
}

impl TradeStats {
    /// A break-even trade counts as a win.
    pub fn record(&mut self, pnl: f64) {
        self.total_trades += 1;
        self.realized_pnl += pnl;
        if pnl >= 0.0 {
            self.wins += 1;
            self.consecutive_wins += 1;
            self.consecutive_losses = 0;
        } else {
            self.losses += 1;
            self.consecutive_losses += 1;
            self.consecutive_wins = 0;
        }
    }

    pub fn streak_factor(&self) -> f64 {
        if self.consecutive_losses > 2 {
            0.5
        } else if self.consecutive_wins >= 3 {
            1.2
        } else {
            1.0
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.wins as f64 / self.total_trades as f64
        }
    }
}
