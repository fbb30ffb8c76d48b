// =============================================================================
// Strategy events - ENTRY / EXIT records handed to the sink
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// Which pullback shape produced an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    /// The pullback held above the slow average.
    DeepPullback,
    /// The pullback touched the slow average but held above the trend average.
    ShallowPullback,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DeepPullback => write!(f, "Deep pullback"),
            Self::ShallowPullback => write!(f, "Shallow pullback"),
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    /// Momentum oscillator reached the exit extreme in the position's favour.
    MomentumExhaustion,
    /// Fast and slow averages crossed against the position.
    TrendReversal,
    /// Holding limit (bars or wall clock) exceeded.
    MaxDuration,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StopLoss => write!(f, "Stop Loss"),
            Self::TrailingStop => write!(f, "Trailing Stop"),
            Self::TakeProfit => write!(f, "Take Profit"),
            Self::MomentumExhaustion => write!(f, "Momentum Exhaustion"),
            Self::TrendReversal => write!(f, "Trend Reversal"),
            Self::MaxDuration => write!(f, "Max Duration"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntrySignal {
    pub side: Side,
    pub price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    /// ATR at entry.
    pub volatility: f64,
    pub size: f64,
    pub index: u64,
    /// Open time of the entry candle.
    pub timestamp: i64,
    pub reason: EntryKind,
    pub confidence: f64,
    pub risk_reward_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitSignal {
    pub side: Side,
    pub price: f64,
    pub pnl: f64,
    pub r_multiple: f64,
    pub index: u64,
    /// Close time of the exit candle.
    pub timestamp: i64,
    pub reason: ExitReason,
    /// Candles between entry and exit.
    pub trade_duration: u64,
}

/// Output of the state machine, in emission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum StrategyEvent {
    Entry(EntrySignal),
    Exit(ExitSignal),
}

impl StrategyEvent {
    pub fn side(&self) -> Side {
        match self {
            Self::Entry(e) => e.side,
            Self::Exit(e) => e.side,
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            Self::Entry(e) => e.index,
            Self::Exit(e) => e.index,
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Entry(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let exit = StrategyEvent::Exit(ExitSignal {
            side: Side::Short,
            price: 99.0,
            pnl: 1.0,
            r_multiple: 0.5,
            index: 12,
            timestamp: 1_000,
            reason: ExitReason::TakeProfit,
            trade_duration: 3,
        });
        let v = serde_json::to_value(&exit).unwrap();
        assert_eq!(v["type"], "EXIT");
        assert_eq!(v["side"], "SHORT");
        assert_eq!(v["reason"], "TAKE_PROFIT");
        assert_eq!(v["rMultiple"], 0.5);
        assert_eq!(v["tradeDuration"], 3);

        let back: StrategyEvent = serde_json::from_value(v).unwrap();
        assert_eq!(back, exit);
        assert!(!back.is_entry());
        assert_eq!(back.index(), 12);
    }

    #[test]
    fn reasons_display_as_labels() {
        assert_eq!(ExitReason::TrailingStop.to_string(), "Trailing Stop");
        assert_eq!(EntryKind::ShallowPullback.to_string(), "Shallow pullback");
    }
}
