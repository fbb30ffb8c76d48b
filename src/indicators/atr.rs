// =============================================================================
// Average True Range (ATR) - volatility range
// =============================================================================
//
// ATR measures market volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
// The first bar has no previous close, so its TR is simply H - L.
//
// The TR series is then smoothed with one of three schemes:
//   Wilder       ATR_0 = SMA of first `period` TRs,
//                ATR_t = (ATR_{t-1} * (period - 1) + TR_t) / period
//   Exponential  same seed, then EMA with multiplier 2 / (period + 1)
//   Simple       rolling SMA of the last `period` TRs
//
// Every scheme is stable after `period` true ranges.
// Default period: 14, default smoothing: Wilder.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Ema, Hlc, Indicator, Sma};

/// Averaging scheme applied to the true-range series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Smoothing {
    #[default]
    Wilder,
    Exponential,
    Simple,
}

#[derive(Debug, Clone)]
enum Averager {
    Wilder {
        seen: usize,
        seed_sum: f64,
        value: Option<f64>,
    },
    Exponential(Ema),
    Simple(Sma),
}

/// Streaming ATR over high/low/close bars.
#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    smoothing: Smoothing,
    prev_close: Option<f64>,
    averager: Averager,
}

impl Atr {
    pub fn new(period: usize, smoothing: Smoothing) -> Self {
        debug_assert!(period > 0, "ATR period must be non-zero");
        let period = period.max(1);
        Self {
            period,
            smoothing,
            prev_close: None,
            averager: Self::averager(period, smoothing),
        }
    }

    fn averager(period: usize, smoothing: Smoothing) -> Averager {
        match smoothing {
            Smoothing::Wilder => Averager::Wilder { seen: 0, seed_sum: 0.0, value: None },
            Smoothing::Exponential => Averager::Exponential(Ema::new(period)),
            Smoothing::Simple => Averager::Simple(Sma::new(period)),
        }
    }

    /// True range of `bar` against the previous close, if any.
    pub fn true_range(bar: Hlc, prev_close: Option<f64>) -> f64 {
        let hl = bar.high - bar.low;
        match prev_close {
            Some(pc) => hl.max((bar.high - pc).abs()).max((bar.low - pc).abs()),
            None => hl,
        }
    }

    pub fn smoothing(&self) -> Smoothing {
        self.smoothing
    }
}

impl Indicator for Atr {
    type Input = Hlc;
    type Output = f64;

    fn update(&mut self, bar: Hlc) {
        if !bar.is_finite() {
            debug!(period = self.period, "ATR ignored non-finite bar");
            return;
        }

        let tr = Self::true_range(bar, self.prev_close);
        self.prev_close = Some(bar.close);

        let period = self.period as f64;
        match &mut self.averager {
            Averager::Wilder { seen, seed_sum, value } => match *value {
                Some(atr) => {
                    let next = (atr * (period - 1.0) + tr) / period;
                    if next.is_finite() {
                        *value = Some(next);
                    }
                }
                None => {
                    *seed_sum += tr;
                    *seen += 1;
                    if *seen == self.period {
                        *value = Some(*seed_sum / period);
                    }
                }
            },
            Averager::Exponential(ema) => ema.update(tr),
            Averager::Simple(sma) => sma.update(tr),
        }
    }

    fn is_stable(&self) -> bool {
        self.result().is_some()
    }

    fn result(&self) -> Option<f64> {
        match &self.averager {
            Averager::Wilder { value, .. } => *value,
            Averager::Exponential(ema) => ema.result(),
            Averager::Simple(sma) => sma.result(),
        }
    }

    fn reset(&mut self) {
        self.prev_close = None;
        self.averager = Self::averager(self.period, self.smoothing);
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> Hlc {
        Hlc { high, low, close }
    }

    #[test]
    fn wilder_is_the_default_smoothing() {
        assert_eq!(Smoothing::default(), Smoothing::Wilder);
        let parsed: Smoothing = serde_json::from_str("\"simple\"").unwrap();
        assert_eq!(parsed, Smoothing::Simple);
        assert_eq!(Atr::new(14, Smoothing::default()).smoothing(), Smoothing::Wilder);
    }

    #[test]
    fn first_bar_true_range_is_high_minus_low() {
        assert!((Atr::true_range(bar(12.0, 10.0, 11.0), None) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn gap_uses_previous_close() {
        // Gap up: prev close 5, bar 10..12 => TR = 12 - 5 = 7
        assert!((Atr::true_range(bar(12.0, 10.0, 11.0), Some(5.0)) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn constant_range_converges_to_range() {
        for smoothing in [Smoothing::Wilder, Smoothing::Exponential, Smoothing::Simple] {
            let mut atr = Atr::new(14, smoothing);
            for _ in 0..30 {
                atr.update(bar(102.0, 98.0, 100.0));
            }
            let v = atr.result().unwrap();
            assert!((v - 4.0).abs() < 1e-10, "{smoothing:?}: got {v}");
        }
    }

    #[test]
    fn stable_after_period_bars() {
        let mut atr = Atr::new(3, Smoothing::Wilder);
        atr.update(bar(2.0, 1.0, 1.5));
        atr.update(bar(2.0, 1.0, 1.5));
        assert!(!atr.is_stable());
        atr.update(bar(2.0, 1.0, 1.5));
        assert!(atr.is_stable());
    }

    #[test]
    fn wilder_smoothing_known_value() {
        let mut atr = Atr::new(2, Smoothing::Wilder);
        atr.update(bar(11.0, 9.0, 10.0)); // TR 2
        atr.update(bar(12.0, 10.0, 11.0)); // TR 2 => seed 2
        atr.update(bar(15.0, 11.0, 14.0)); // TR 4 => (2*1 + 4)/2 = 3
        assert!((atr.result().unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn nan_bar_is_ignored_and_reset_clears() {
        let mut atr = Atr::new(1, Smoothing::Wilder);
        atr.update(bar(f64::NAN, 1.0, 1.0));
        assert!(!atr.is_stable());
        atr.update(bar(3.0, 1.0, 2.0));
        assert!((atr.result().unwrap() - 2.0).abs() < 1e-12);
        atr.reset();
        assert!(!atr.is_stable());
    }
}
