// =============================================================================
// Pullback strategy
// =============================================================================
//
//   config     serde-configurable parameters + validation
//   engine     the per-candle state machine
//   position   open position, barriers, trailing ratchet
//   sizing     confidence, position size, streak statistics
//   events     ENTRY / EXIT records

pub mod config;
pub mod engine;
pub mod events;
pub mod position;
pub mod sizing;

pub use config::StrategyConfig;
pub use engine::{IndicatorSnapshot, PullbackStrategy, StrategyState};
pub use events::{EntryKind, EntrySignal, ExitReason, ExitSignal, StrategyEvent};
pub use position::Position;
pub use sizing::TradeStats;
