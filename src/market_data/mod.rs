pub mod book;
pub mod candle;
pub mod derivatives;
pub mod trade;

// Re-export the value objects for convenient access (e.g. `use crate::market_data::Candle`).
pub use book::{BookTicker, DepthUpdate};
pub use candle::{Candle, CandleKey};
pub use derivatives::{Liquidation, MarkPrice, Ticker24h};
pub use trade::{FlowSummary, Trade, TradeWindow};
