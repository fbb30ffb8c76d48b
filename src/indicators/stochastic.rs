// =============================================================================
// Stochastic Oscillator - secondary momentum oscillator
// =============================================================================
//
//   raw %K  = 100 * (close - lowest low) / (highest high - lowest low)
//             over the last `k_period` bars (50 when the window is flat)
//   slow %K = SMA(`k_smoothing`) of raw %K
//   %D      = SMA(`d_period`) of slow %K
//
// Stable once %D exists, i.e. after k_period + k_smoothing + d_period - 2
// bars.
// =============================================================================

use std::collections::VecDeque;

use serde::Serialize;

use super::{Hlc, Indicator, Sma};

/// Latest slow %K and %D.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StochasticValue {
    pub k: f64,
    pub d: f64,
}

#[derive(Debug, Clone)]
pub struct Stochastic {
    k_period: usize,
    window: VecDeque<(f64, f64)>,
    slow_k: Sma,
    d: Sma,
}

impl Stochastic {
    pub fn new(k_period: usize, k_smoothing: usize, d_period: usize) -> Self {
        debug_assert!(k_period > 0, "stochastic period must be non-zero");
        let k_period = k_period.max(1);
        Self {
            k_period,
            window: VecDeque::with_capacity(k_period),
            slow_k: Sma::new(k_smoothing),
            d: Sma::new(d_period),
        }
    }
}

impl Indicator for Stochastic {
    type Input = Hlc;
    type Output = StochasticValue;

    fn update(&mut self, bar: Hlc) {
        if !bar.is_finite() {
            return;
        }
        self.window.push_back((bar.high, bar.low));
        if self.window.len() > self.k_period {
            self.window.pop_front();
        }
        if self.window.len() < self.k_period {
            return;
        }

        let highest = self.window.iter().map(|w| w.0).fold(f64::MIN, f64::max);
        let lowest = self.window.iter().map(|w| w.1).fold(f64::MAX, f64::min);
        let span = highest - lowest;
        let raw_k = if span > 0.0 {
            100.0 * (bar.close - lowest) / span
        } else {
            50.0
        };

        self.slow_k.update(raw_k);
        if let Some(k) = self.slow_k.result() {
            self.d.update(k);
        }
    }

    fn is_stable(&self) -> bool {
        self.d.is_stable()
    }

    fn result(&self) -> Option<StochasticValue> {
        match (self.slow_k.result(), self.d.result()) {
            (Some(k), Some(d)) => Some(StochasticValue { k, d }),
            _ => None,
        }
    }

    fn reset(&mut self) {
        self.window.clear();
        self.slow_k.reset();
        self.d.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> Hlc {
        Hlc { high, low, close }
    }

    #[test]
    fn stable_after_warmup() {
        let mut s = Stochastic::new(5, 3, 3);
        for i in 0..8 {
            let p = 100.0 + i as f64;
            s.update(bar(p + 1.0, p - 1.0, p));
            assert!(!s.is_stable(), "stable too early at bar {i}");
        }
        s.update(bar(109.0, 107.0, 108.0));
        assert!(s.is_stable());
    }

    #[test]
    fn close_at_high_reads_100() {
        let mut s = Stochastic::new(3, 1, 1);
        for p in [10.0, 11.0, 12.0, 13.0] {
            s.update(bar(p, p - 2.0, p));
        }
        let v = s.result().unwrap();
        assert!((v.k - 100.0).abs() < 1e-10);
        assert!((v.d - 100.0).abs() < 1e-10);
    }

    #[test]
    fn flat_window_reads_50() {
        let mut s = Stochastic::new(3, 1, 1);
        for _ in 0..3 {
            s.update(bar(5.0, 5.0, 5.0));
        }
        assert!((s.result().unwrap().k - 50.0).abs() < 1e-10);
    }

    #[test]
    fn d_lags_k_on_reversal() {
        let mut s = Stochastic::new(3, 1, 3);
        for p in [10.0, 11.0, 12.0, 13.0, 14.0] {
            s.update(bar(p, p - 1.0, p));
        }
        // Sharp drop to the bottom of the range.
        s.update(bar(14.0, 10.0, 10.0));
        let v = s.result().unwrap();
        assert!(v.k < v.d, "k {} should be below d {}", v.k, v.d);
    }
}
