//! Average True Range.
//!
//! `TR = max(h − l, |h − c₋₁|, |l − c₋₁|)`, smoothed by Wilder RMA (seeded
//! with the SMA of the first `period` TRs) or EMA/SMA variants. Optional
//! NATR (`100·ATR/ref`) and bands (`ref ± k·ATR`).

use serde::Deserialize;

use super::{IndicatorOutput, Method, Smoother};
use crate::bar::Bar;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AtrConfig {
    pub period: usize,
    pub method: Method,
    pub natr: bool,
    /// NATR denominator: close or (h+l)/2.
    pub natr_ref: NatrRef,
    /// When set, emit `upper_band`/`lower_band` = close ± k·ATR.
    pub bands_k: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NatrRef {
    #[default]
    Close,
    Mid,
}

impl Default for AtrConfig {
    fn default() -> Self {
        Self {
            period: 14,
            method: Method::Wilder,
            natr: false,
            natr_ref: NatrRef::Close,
            bands_k: None,
        }
    }
}

/// Streaming ATR; feed completed bars only.
#[derive(Debug, Clone)]
pub struct AtrState {
    cfg: AtrConfig,
    smoother: Smoother,
    prev_close: f64,
    pub tr: f64,
    pub atr: f64,
}

impl AtrState {
    pub fn new(cfg: AtrConfig) -> Self {
        let smoother = Smoother::new(cfg.method, cfg.period);
        Self {
            cfg,
            smoother,
            prev_close: f64::NAN,
            tr: f64::NAN,
            atr: f64::NAN,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> f64 {
        if self.prev_close.is_nan() {
            // first bar: no TR yet
            self.prev_close = bar.close;
            return f64::NAN;
        }
        self.tr = (bar.high - bar.low)
            .max((bar.high - self.prev_close).abs())
            .max((bar.low - self.prev_close).abs());
        self.prev_close = bar.close;
        self.atr = self.smoother.update(self.tr);
        self.atr
    }

    pub fn natr(&self, bar: &Bar) -> f64 {
        let reference = match self.cfg.natr_ref {
            NatrRef::Close => bar.close,
            NatrRef::Mid => bar.hl2(),
        };
        if reference == 0.0 {
            return f64::NAN;
        }
        100.0 * self.atr / reference
    }
}

pub fn compute(cfg: &AtrConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = AtrState::new(cfg.clone());
    let n = bars.len();
    let mut atr = Vec::with_capacity(n);
    let mut tr = Vec::with_capacity(n);
    let mut natr = Vec::with_capacity(n);
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);

    for bar in bars {
        let value = state.update(bar);
        atr.push(value);
        tr.push(state.tr);
        if cfg.natr {
            natr.push(state.natr(bar));
        }
        if let Some(k) = cfg.bands_k {
            upper.push(bar.close + k * value);
            lower.push(bar.close - k * value);
        }
    }

    let mut out = IndicatorOutput::new();
    out.insert("atr".to_string(), atr);
    out.insert("tr".to_string(), tr);
    if cfg.natr {
        out.insert("natr".to_string(), natr);
    }
    if cfg.bands_k.is_some() {
        out.insert("upper_band".to_string(), upper);
        out.insert("lower_band".to_string(), lower);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(h: f64, l: f64, c: f64) -> Bar {
        Bar {
            symbol: "X".into(),
            tf: "1m".into(),
            ts_event: 0,
            open: c,
            high: h,
            low: l,
            close: c,
            volume: 1.0,
        }
    }

    #[test]
    fn wilder_atr_seeds_then_recurses() {
        let cfg = AtrConfig {
            period: 3,
            ..AtrConfig::default()
        };
        // TRs after the first bar: 2, 4, 3  -> seed mean = 3
        let bars = vec![
            bar(10.0, 9.0, 9.5),
            bar(11.0, 9.0, 10.0),  // tr = max(2, 1.5, 0.5) = 2
            bar(12.0, 8.0, 11.0),  // tr = max(4, 2, 2) = 4
            bar(12.0, 9.0, 10.0),  // tr = max(3, 1, 2) = 3
            bar(11.0, 10.0, 10.5), // tr = max(1, 1, 0) = 1
        ];
        let out = compute(&cfg, &bars);
        let atr = &out["atr"];
        assert!(atr[0].is_nan());
        assert!(atr[2].is_nan());
        assert!((atr[3] - 3.0).abs() < 1e-12);
        // next = (2/3)*3 + (1/3)*1 = 7/3
        assert!((atr[4] - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn streaming_matches_batch_tail() {
        let cfg = AtrConfig {
            period: 5,
            natr: true,
            bands_k: Some(2.0),
            ..AtrConfig::default()
        };
        let bars: Vec<Bar> = (0..40)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.7).sin() * 5.0;
                bar(base + 2.0, base - 2.0, base)
            })
            .collect();
        let out = compute(&cfg, &bars);

        let mut state = AtrState::new(cfg);
        let mut last = f64::NAN;
        for b in &bars {
            last = state.update(b);
        }
        let batch_tail = *out["atr"].last().unwrap();
        assert!((batch_tail - last).abs() < 1e-9);
        assert!(out["natr"].last().unwrap().is_finite());
        assert!((out["upper_band"].last().unwrap()
            - (bars.last().unwrap().close + 2.0 * batch_tail))
            .abs()
            < 1e-9);
    }
}
