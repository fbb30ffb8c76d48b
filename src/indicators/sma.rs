// =============================================================================
// Simple Moving Average - rolling window mean
// =============================================================================

use std::collections::VecDeque;

use super::Indicator;

/// Rolling arithmetic mean over the last `period` values.
///
/// The running sum is maintained incrementally; it is recomputed from the
/// window whenever the window wraps a full cycle to bound float drift.
#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    window: VecDeque<f64>,
    sum: f64,
    since_resum: usize,
}

impl Sma {
    /// `period` must be non-zero; callers validate it through their config.
    pub fn new(period: usize) -> Self {
        debug_assert!(period > 0, "SMA period must be non-zero");
        Self {
            period: period.max(1),
            window: VecDeque::with_capacity(period.max(1)),
            sum: 0.0,
            since_resum: 0,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    type Input = f64;
    type Output = f64;

    fn update(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        self.window.push_back(value);
        self.sum += value;
        if self.window.len() > self.period {
            if let Some(old) = self.window.pop_front() {
                self.sum -= old;
            }
        }

        self.since_resum += 1;
        if self.since_resum >= self.period {
            self.sum = self.window.iter().sum();
            self.since_resum = 0;
        }
    }

    fn is_stable(&self) -> bool {
        self.window.len() >= self.period
    }

    fn result(&self) -> Option<f64> {
        if self.is_stable() {
            Some(self.sum / self.period as f64)
        } else {
            None
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.sum = 0.0;
        self.since_resum = 0;
    }
}
