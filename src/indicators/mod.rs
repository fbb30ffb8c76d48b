// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Streaming, stateful implementations of the indicators the strategy reads.
// Each one consumes a single observation per candle and exposes the same
// contract:
//
//   update(input)   fold one observation into the running state
//   is_stable()     enough history has been seen for the value to be usable
//   result()        `None` until stable, then the latest value
//   reset()         forget everything (never happens implicitly)
//
// Non-finite inputs are dropped so a single bad tick cannot poison a
// long-running average.

pub mod atr;
pub mod ema;
pub mod rsi;
pub mod sma;
pub mod stochastic;

pub use atr::{Atr, Smoothing};
pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;
pub use stochastic::{Stochastic, StochasticValue};

use crate::market_data::Candle;

/// Common contract for streaming indicators.
pub trait Indicator {
    type Input;
    type Output;

    fn update(&mut self, input: Self::Input);
    fn is_stable(&self) -> bool;
    fn result(&self) -> Option<Self::Output>;
    fn reset(&mut self);
}

/// High / low / close triple consumed by range-based indicators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hlc {
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Hlc {
    pub fn is_finite(&self) -> bool {
        self.high.is_finite() && self.low.is_finite() && self.close.is_finite()
    }
}

impl From<&Candle> for Hlc {
    fn from(c: &Candle) -> Self {
        Self { high: c.high, low: c.low, close: c.close }
    }
}
