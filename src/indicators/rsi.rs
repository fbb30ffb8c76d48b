// =============================================================================
// Relative Strength Index (RSI) - Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 - Compute the delta between consecutive closes.
// Step 2 - Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 - Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 - RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// Needs `period` deltas, i.e. `period + 1` closes, before it is stable.
// =============================================================================

use tracing::debug;

use super::Indicator;

/// Streaming Wilder RSI over closes.
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    deltas_seen: usize,
    avg_gain: f64,
    avg_loss: f64,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        debug_assert!(period > 0, "RSI period must be non-zero");
        Self {
            period: period.max(1),
            prev_close: None,
            deltas_seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
        }
    }
}

/// Convert smoothed averages to an RSI value.
///
/// A flat market (no gains, no losses) reads 50; no losses reads 100.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain == 0.0 && avg_loss == 0.0 {
        return 50.0;
    }
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

impl Indicator for Rsi {
    type Input = f64;
    type Output = f64;

    fn update(&mut self, close: f64) {
        if !close.is_finite() {
            debug!(period = self.period, "RSI ignored non-finite input");
            return;
        }

        let Some(prev) = self.prev_close.replace(close) else {
            return;
        };

        let delta = close - prev;
        let gain = delta.max(0.0);
        let loss = (-delta).max(0.0);
        let period = self.period as f64;

        if self.deltas_seen < self.period {
            // Seed phase: running sums, divided once the window is full.
            self.avg_gain += gain;
            self.avg_loss += loss;
            self.deltas_seen += 1;
            if self.deltas_seen == self.period {
                self.avg_gain /= period;
                self.avg_loss /= period;
            }
        } else {
            self.avg_gain = (self.avg_gain * (period - 1.0) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - 1.0) + loss) / period;
        }
    }

    fn is_stable(&self) -> bool {
        self.deltas_seen >= self.period
    }

    fn result(&self) -> Option<f64> {
        if self.is_stable() {
            Some(rsi_from_averages(self.avg_gain, self.avg_loss))
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.deltas_seen = 0;
        self.avg_gain = 0.0;
        self.avg_loss = 0.0;
    }
}
