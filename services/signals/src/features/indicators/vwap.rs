//! Anchored Volume-Weighted Average Price.
//!
//! Cumulative `Σ(p·v) / Σv` within each anchor group (day, week, month,
//! year, or the whole stream), with a configurable price source. Optional
//! bands use the volume-weighted standard deviation
//! `σ² = Σ(p²·v)/Σv − mean²`.

use serde::Deserialize;

use super::{IndicatorOutput, PriceSource};
use crate::bar::Bar;
use types::{candle_open_ms, parse_timeframe, Timeframe};

/// Anchor period that resets the cumulative sums. Sessions run 24x7, so a
/// session anchor equals a UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    #[default]
    Day,
    Week,
    Month,
    /// Year-to-date: resets each UTC calendar year.
    Ytd,
    Session,
    /// No reset; cumulative over the whole stream.
    None,
}

impl Anchor {
    fn timeframe(&self) -> Option<Timeframe> {
        let label = match self {
            Anchor::Day | Anchor::Session => "1d",
            Anchor::Week => "1w",
            Anchor::Month => "1mo",
            Anchor::Ytd => "12mo",
            Anchor::None => return None,
        };
        Some(parse_timeframe(label).expect("static timeframe label"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub anchor: Anchor,
    pub source: PriceSource,
    /// When set, emit `upper_band`/`lower_band` = vwap ± k·σ.
    pub bands_k: Option<f64>,
    /// Scale σ by 1.4826 (the MAD-consistency constant) for the robust
    /// band variant.
    pub mad_scale: bool,
}

impl Default for VwapConfig {
    fn default() -> Self {
        Self {
            anchor: Anchor::Day,
            source: PriceSource::Close,
            bands_k: None,
            mad_scale: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VwapState {
    cfg: VwapConfig,
    current_anchor: Option<i64>,
    pv_sum: f64,
    vol_sum: f64,
    p2v_sum: f64,
    pub vwap: f64,
    pub sigma: f64,
}

impl VwapState {
    pub fn new(cfg: VwapConfig) -> Self {
        Self {
            cfg,
            current_anchor: None,
            pv_sum: 0.0,
            vol_sum: 0.0,
            p2v_sum: 0.0,
            vwap: f64::NAN,
            sigma: f64::NAN,
        }
    }

    fn anchor_key(&self, ts_ms: i64) -> i64 {
        match self.cfg.anchor.timeframe() {
            Some(tf) => candle_open_ms(ts_ms, tf).unwrap_or(0),
            None => 0,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> f64 {
        let anchor = self.anchor_key(bar.ts_event);
        if self.current_anchor != Some(anchor) {
            self.current_anchor = Some(anchor);
            self.pv_sum = 0.0;
            self.vol_sum = 0.0;
            self.p2v_sum = 0.0;
        }

        let price = self.cfg.source.of(bar);
        self.pv_sum += price * bar.volume;
        self.vol_sum += bar.volume;
        self.p2v_sum += price * price * bar.volume;

        if self.vol_sum > 0.0 {
            self.vwap = self.pv_sum / self.vol_sum;
            let variance = (self.p2v_sum / self.vol_sum - self.vwap * self.vwap).max(0.0);
            self.sigma = variance.sqrt();
            if self.cfg.mad_scale {
                self.sigma *= 1.4826;
            }
        } else {
            self.vwap = f64::NAN;
            self.sigma = f64::NAN;
        }
        self.vwap
    }
}

pub fn compute(cfg: &VwapConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = VwapState::new(cfg.clone());
    let n = bars.len();
    let mut vwap = Vec::with_capacity(n);
    let mut upper = Vec::with_capacity(n);
    let mut lower = Vec::with_capacity(n);

    for bar in bars {
        let value = state.update(bar);
        vwap.push(value);
        if let Some(k) = cfg.bands_k {
            upper.push(value + k * state.sigma);
            lower.push(value - k * state.sigma);
        }
    }

    let mut out = IndicatorOutput::new();
    out.insert("vwap".to_string(), vwap);
    if cfg.bands_k.is_some() {
        out.insert("upper_band".to_string(), upper);
        out.insert("lower_band".to_string(), lower);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::from_iso_to_ms;

    fn bar_at(ts: i64, price: f64, volume: f64) -> Bar {
        Bar {
            symbol: "X".into(),
            tf: "1h".into(),
            ts_event: ts,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    #[test]
    fn cumulative_within_one_day() {
        let cfg = VwapConfig::default();
        let t0 = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let bars = vec![
            bar_at(t0, 100.0, 1.0),
            bar_at(t0 + 3_600_000, 110.0, 3.0),
        ];
        let out = compute(&cfg, &bars);
        assert_eq!(out["vwap"][0], 100.0);
        // (100*1 + 110*3) / 4 = 107.5
        assert!((out["vwap"][1] - 107.5).abs() < 1e-12);
    }

    #[test]
    fn day_boundary_resets_the_anchor() {
        let cfg = VwapConfig::default();
        let t0 = from_iso_to_ms("2024-01-01T23:00:00Z").unwrap();
        let t1 = from_iso_to_ms("2024-01-02T00:00:00Z").unwrap();
        let out = compute(&cfg, &[bar_at(t0, 100.0, 5.0), bar_at(t1, 50.0, 1.0)]);
        assert_eq!(out["vwap"][1], 50.0);
    }

    #[test]
    fn zero_volume_yields_nan_until_volume_arrives() {
        let cfg = VwapConfig::default();
        let t0 = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let out = compute(&cfg, &[bar_at(t0, 100.0, 0.0), bar_at(t0 + 60_000, 101.0, 2.0)]);
        assert!(out["vwap"][0].is_nan());
        assert_eq!(out["vwap"][1], 101.0);
    }

    #[test]
    fn bands_use_weighted_stdev() {
        let cfg = VwapConfig {
            bands_k: Some(1.0),
            ..VwapConfig::default()
        };
        let t0 = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let bars = vec![bar_at(t0, 90.0, 1.0), bar_at(t0 + 60_000, 110.0, 1.0)];
        let out = compute(&cfg, &bars);
        // mean 100, sigma 10
        assert!((out["upper_band"][1] - 110.0).abs() < 1e-9);
        assert!((out["lower_band"][1] - 90.0).abs() < 1e-9);
    }

    #[test]
    fn streaming_matches_batch_tail() {
        let cfg = VwapConfig {
            anchor: Anchor::Week,
            source: PriceSource::Hlc3,
            ..VwapConfig::default()
        };
        let t0 = from_iso_to_ms("2024-01-01T00:00:00Z").unwrap();
        let bars: Vec<Bar> = (0..100)
            .map(|i| bar_at(t0 + i * 3_600_000, 100.0 + (i as f64).sin(), 1.0 + i as f64 % 3.0))
            .collect();
        let out = compute(&cfg, &bars);
        let mut state = VwapState::new(cfg);
        let mut last = f64::NAN;
        for b in &bars {
            last = state.update(b);
        }
        assert!((out["vwap"].last().unwrap() - last).abs() < 1e-9);
    }
}
