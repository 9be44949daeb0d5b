//! Average Directional Index.
//!
//! `+DM = h − h₋₁` when positive and greater than `l₋₁ − l`, else 0 (−DM
//! symmetric). TR, +DM and −DM are smoothed by the configured method, the
//! DIs are their ratios to smoothed TR, `DX = 100·|+DI − −DI| / (+DI +
//! −DI)`, and ADX smooths DX again. `ADXR = (ADX + ADX₋lag) / 2`. Warm-up
//! is at least `2·period − 1` bars.

use std::collections::VecDeque;

use serde::Deserialize;

use super::{IndicatorOutput, Method, Smoother};
use crate::bar::Bar;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdxConfig {
    pub period: usize,
    pub method: Method,
    /// ADXR lookback; defaults to `period` when absent.
    pub adxr_lag: Option<usize>,
}

impl Default for AdxConfig {
    fn default() -> Self {
        Self {
            period: 14,
            method: Method::Wilder,
            adxr_lag: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AdxState {
    lag: usize,
    tr_smooth: Smoother,
    plus_smooth: Smoother,
    minus_smooth: Smoother,
    adx_smooth: Smoother,
    prev: Option<(f64, f64, f64)>,
    adx_history: VecDeque<f64>,
    pub plus_di: f64,
    pub minus_di: f64,
    pub dx: f64,
    pub adx: f64,
    pub adxr: f64,
}

impl AdxState {
    pub fn new(cfg: AdxConfig) -> Self {
        let lag = cfg.adxr_lag.unwrap_or(cfg.period).max(1);
        Self {
            lag,
            tr_smooth: Smoother::new(cfg.method, cfg.period),
            plus_smooth: Smoother::new(cfg.method, cfg.period),
            minus_smooth: Smoother::new(cfg.method, cfg.period),
            adx_smooth: Smoother::new(cfg.method, cfg.period),
            prev: None,
            adx_history: VecDeque::new(),
            plus_di: f64::NAN,
            minus_di: f64::NAN,
            dx: f64::NAN,
            adx: f64::NAN,
            adxr: f64::NAN,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> f64 {
        let Some((prev_h, prev_l, prev_c)) = self.prev else {
            self.prev = Some((bar.high, bar.low, bar.close));
            return f64::NAN;
        };
        self.prev = Some((bar.high, bar.low, bar.close));

        let up = bar.high - prev_h;
        let down = prev_l - bar.low;
        let plus_dm = if up > down && up > 0.0 { up } else { 0.0 };
        let minus_dm = if down > up && down > 0.0 { down } else { 0.0 };
        let tr = (bar.high - bar.low)
            .max((bar.high - prev_c).abs())
            .max((bar.low - prev_c).abs());

        let str_ = self.tr_smooth.update(tr);
        let spdm = self.plus_smooth.update(plus_dm);
        let smdm = self.minus_smooth.update(minus_dm);

        if !str_.is_finite() {
            return f64::NAN;
        }
        (self.plus_di, self.minus_di) = if str_ > 0.0 {
            (100.0 * spdm / str_, 100.0 * smdm / str_)
        } else {
            (0.0, 0.0)
        };

        let di_sum = self.plus_di + self.minus_di;
        self.dx = if di_sum > 0.0 {
            100.0 * (self.plus_di - self.minus_di).abs() / di_sum
        } else {
            0.0
        };

        self.adx = self.adx_smooth.update(self.dx);
        if self.adx.is_finite() {
            self.adx_history.push_back(self.adx);
            if self.adx_history.len() > self.lag + 1 {
                self.adx_history.pop_front();
            }
            if self.adx_history.len() == self.lag + 1 {
                self.adxr = (self.adx + self.adx_history.front().unwrap()) / 2.0;
            }
        }
        self.adx
    }
}

pub fn compute(cfg: &AdxConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = AdxState::new(cfg.clone());
    let n = bars.len();
    let mut plus = Vec::with_capacity(n);
    let mut minus = Vec::with_capacity(n);
    let mut dx = Vec::with_capacity(n);
    let mut adx = Vec::with_capacity(n);
    let mut adxr = Vec::with_capacity(n);

    for bar in bars {
        let value = state.update(bar);
        // the DI columns stay NaN until the TR smoother seeds
        let seeded = state.tr_smooth.is_ready();
        plus.push(if seeded { state.plus_di } else { f64::NAN });
        minus.push(if seeded { state.minus_di } else { f64::NAN });
        dx.push(if seeded { state.dx } else { f64::NAN });
        adx.push(value);
        adxr.push(state.adxr);
    }

    let mut out = IndicatorOutput::new();
    out.insert("plus_di".to_string(), plus);
    out.insert("minus_di".to_string(), minus);
    out.insert("dx".to_string(), dx);
    out.insert("adx".to_string(), adx);
    out.insert("adxr".to_string(), adxr);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trending_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Bar {
                    symbol: "X".into(),
                    tf: "1m".into(),
                    ts_event: i as i64,
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.5,
                    volume: 1.0,
                }
            })
            .collect()
    }

    #[test]
    fn warmup_needs_at_least_two_periods() {
        let cfg = AdxConfig {
            period: 5,
            ..AdxConfig::default()
        };
        let bars = trending_bars(40);
        let out = compute(&cfg, &bars);
        let adx = &out["adx"];
        // below 2p-1 bars the ADX is still NaN
        for v in adx.iter().take(2 * 5 - 1) {
            assert!(v.is_nan());
        }
        assert!(adx.last().unwrap().is_finite());
    }

    #[test]
    fn steady_uptrend_pushes_plus_di_and_adx_high() {
        let cfg = AdxConfig {
            period: 5,
            ..AdxConfig::default()
        };
        let bars = trending_bars(60);
        let out = compute(&cfg, &bars);
        let last = bars.len() - 1;
        assert!(out["plus_di"][last] > out["minus_di"][last]);
        // a monotone trend saturates DX, so ADX approaches 100
        assert!(out["adx"][last] > 80.0);
        assert!(out["adxr"][last].is_finite());
    }

    #[test]
    fn streaming_matches_batch_tail() {
        let cfg = AdxConfig {
            period: 7,
            ..AdxConfig::default()
        };
        let bars: Vec<Bar> = (0..80)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.35).sin() * 8.0;
                Bar {
                    symbol: "X".into(),
                    tf: "1m".into(),
                    ts_event: i as i64,
                    open: base,
                    high: base + 1.5,
                    low: base - 1.5,
                    close: base + 0.2,
                    volume: 1.0,
                }
            })
            .collect();
        let out = compute(&cfg, &bars);
        let mut state = AdxState::new(cfg);
        let mut last = f64::NAN;
        for b in &bars {
            last = state.update(b);
        }
        assert!((out["adx"].last().unwrap() - last).abs() < 1e-9);
        assert!((out["adxr"].last().unwrap() - state.adxr).abs() < 1e-9);
    }
}
