//! Technical indicators: batch columns plus streaming O(1) updates.
//!
//! Every indicator is implemented as a streaming state fed one completed
//! bar at a time; the batch form folds the same state over the input, so
//! batch and streaming agree to floating-point identity after warm-up.
//! Values are NaN until the indicator's seed window has filled.

pub mod adx;
pub mod atr;
pub mod ichimoku;
pub mod obv;
pub mod stoch_rsi;
pub mod vwap;

use std::collections::{BTreeMap, VecDeque};

use serde::Deserialize;

/// Named output columns, one series per column.
pub type IndicatorOutput = BTreeMap<String, Vec<f64>>;

/// Smoothing method shared by ATR/ADX/RSI-style recursions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    Wilder,
    Ema,
    Sma,
}

/// Recursive smoother seeded by the SMA of its first `period` inputs.
///
/// Wilder: `y = ((p-1)·y + x) / p`; EMA: `alpha = 2/(p+1)`; SMA keeps a
/// ring buffer. Returns NaN until seeded.
#[derive(Debug, Clone)]
pub struct Smoother {
    method: Method,
    period: usize,
    value: f64,
    seeded: bool,
    seed_sum: f64,
    count: usize,
    ring: VecDeque<f64>,
}

impl Smoother {
    pub fn new(method: Method, period: usize) -> Self {
        Self {
            method,
            period: period.max(1),
            value: f64::NAN,
            seeded: false,
            seed_sum: 0.0,
            count: 0,
            ring: VecDeque::new(),
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        match self.method {
            Method::Sma => {
                self.ring.push_back(x);
                self.seed_sum += x;
                if self.ring.len() > self.period {
                    if let Some(old) = self.ring.pop_front() {
                        self.seed_sum -= old;
                    }
                }
                self.value = if self.ring.len() == self.period {
                    self.seed_sum / self.period as f64
                } else {
                    f64::NAN
                };
            }
            Method::Wilder | Method::Ema => {
                if !self.seeded {
                    self.seed_sum += x;
                    self.count += 1;
                    if self.count >= self.period {
                        self.value = self.seed_sum / self.period as f64;
                        self.seeded = true;
                    }
                } else {
                    let alpha = match self.method {
                        Method::Wilder => 1.0 / self.period as f64,
                        _ => 2.0 / (self.period as f64 + 1.0),
                    };
                    self.value = (1.0 - alpha) * self.value + alpha * x;
                }
            }
        }
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn is_ready(&self) -> bool {
        self.value.is_finite()
    }
}

/// Simple/exponential moving average used for %K/%D style smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MaMethod {
    #[default]
    Sma,
    Ema,
}

impl From<MaMethod> for Method {
    fn from(m: MaMethod) -> Self {
        match m {
            MaMethod::Sma => Method::Sma,
            MaMethod::Ema => Method::Ema,
        }
    }
}

/// Rolling window exposing min/max/fullness; NaN inputs are skipped from
/// extrema but still occupy a slot so alignment is preserved.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    period: usize,
    ring: VecDeque<f64>,
}

impl RollingWindow {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            ring: VecDeque::new(),
        }
    }

    pub fn push(&mut self, x: f64) {
        self.ring.push_back(x);
        if self.ring.len() > self.period {
            self.ring.pop_front();
        }
    }

    pub fn is_full(&self) -> bool {
        self.ring.len() == self.period
    }

    pub fn min(&self) -> f64 {
        self.ring
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.ring
            .iter()
            .copied()
            .filter(|x| x.is_finite())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// Midpoint of the extremes, NaN until full.
    pub fn mid(&self) -> f64 {
        if !self.is_full() {
            return f64::NAN;
        }
        (self.min() + self.max()) / 2.0
    }
}

/// Price source for indicators that allow one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    #[default]
    Close,
    Hl2,
    Hlc3,
    Ohlc4,
}

impl PriceSource {
    pub fn of(&self, bar: &crate::bar::Bar) -> f64 {
        match self {
            PriceSource::Close => bar.close,
            PriceSource::Hl2 => bar.hl2(),
            PriceSource::Hlc3 => bar.hlc3(),
            PriceSource::Ohlc4 => bar.ohlc4(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_smoother_matches_rolling_mean() {
        let mut s = Smoother::new(Method::Sma, 3);
        assert!(s.update(10.0).is_nan());
        assert!(s.update(20.0).is_nan());
        assert_eq!(s.update(30.0), 20.0);
        assert_eq!(s.update(40.0), 30.0);
    }

    #[test]
    fn wilder_seeds_with_sma_then_recurses() {
        let mut s = Smoother::new(Method::Wilder, 3);
        s.update(3.0);
        s.update(6.0);
        assert_eq!(s.update(9.0), 6.0); // seed = mean(3,6,9)
        // next: (2/3)*6 + (1/3)*12 = 8
        assert!((s.update(12.0) - 8.0).abs() < 1e-12);
    }

    #[test]
    fn rolling_window_extrema() {
        let mut w = RollingWindow::new(3);
        w.push(5.0);
        assert!(!w.is_full());
        w.push(1.0);
        w.push(3.0);
        assert!(w.is_full());
        assert_eq!(w.min(), 1.0);
        assert_eq!(w.max(), 5.0);
        assert_eq!(w.mid(), 3.0);
        w.push(9.0); // 5.0 leaves the window
        assert_eq!(w.max(), 9.0);
        assert_eq!(w.min(), 1.0);
    }
}
