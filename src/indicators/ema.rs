// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period`
// closes, so the average becomes stable after exactly `period` observations.
// =============================================================================

use tracing::debug;

use super::Indicator;

/// Streaming EMA over closes.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    multiplier: f64,
    seen: usize,
    seed_sum: f64,
    value: Option<f64>,
}

impl Ema {
    /// `period` must be non-zero; callers validate it through their config.
    pub fn new(period: usize) -> Self {
        debug_assert!(period > 0, "EMA period must be non-zero");
        let period = period.max(1);
        Self {
            period,
            multiplier: 2.0 / (period + 1) as f64,
            seen: 0,
            seed_sum: 0.0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Ema {
    type Input = f64;
    type Output = f64;

    fn update(&mut self, close: f64) {
        if !close.is_finite() {
            debug!(period = self.period, "EMA ignored non-finite input");
            return;
        }

        match self.value {
            Some(prev) => {
                let next = close * self.multiplier + prev * (1.0 - self.multiplier);
                if next.is_finite() {
                    self.value = Some(next);
                }
            }
            None => {
                // Seed phase: accumulate the SMA of the first `period` closes.
                self.seed_sum += close;
                self.seen += 1;
                if self.seen == self.period {
                    self.value = Some(self.seed_sum / self.period as f64);
                }
            }
        }
    }

    fn is_stable(&self) -> bool {
        self.value.is_some()
    }

    fn result(&self) -> Option<f64> {
        self.value
    }

    fn reset(&mut self) {
        self.seen = 0;
        self.seed_sum = 0.0;
        self.value = None;
    }
}
