//! Stochastic RSI.
//!
//! RSI (Wilder by default) on the chosen price source, then the stochastic
//! of RSI over `stoch_len`: `base = (RSI − min) / (max − min)` clamped to
//! [0, 1] with an explicit zero-division policy. %K smooths the base, %D
//! smooths %K. Optional Fisher transform on `2·base − 1`.

use serde::Deserialize;

use super::{IndicatorOutput, MaMethod, Method, PriceSource, RollingWindow, Smoother};
use crate::bar::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZeroDivPolicy {
    /// Flat RSI window yields NaN.
    #[default]
    Nan,
    /// Flat window yields 0.
    Zero,
    /// Repeat the previous base value.
    Prev,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StochRsiConfig {
    pub rsi_len: usize,
    pub stoch_len: usize,
    pub k_len: usize,
    pub d_len: usize,
    pub rsi_method: Method,
    pub k_method: MaMethod,
    pub d_method: MaMethod,
    pub zero_div: ZeroDivPolicy,
    pub fisher: bool,
    pub source: PriceSource,
}

impl Default for StochRsiConfig {
    fn default() -> Self {
        Self {
            rsi_len: 14,
            stoch_len: 14,
            k_len: 3,
            d_len: 3,
            rsi_method: Method::Wilder,
            k_method: MaMethod::Sma,
            d_method: MaMethod::Sma,
            zero_div: ZeroDivPolicy::Nan,
            fisher: false,
            source: PriceSource::Close,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StochRsiState {
    cfg: StochRsiConfig,
    prev_price: f64,
    gain_smooth: Smoother,
    loss_smooth: Smoother,
    rsi_window: RollingWindow,
    prev_base: f64,
    k_smooth: Smoother,
    d_smooth: Smoother,
    pub rsi: f64,
    pub base: f64,
    pub k: f64,
    pub d: f64,
    pub fisher: f64,
}

impl StochRsiState {
    pub fn new(cfg: StochRsiConfig) -> Self {
        Self {
            prev_price: f64::NAN,
            gain_smooth: Smoother::new(cfg.rsi_method, cfg.rsi_len),
            loss_smooth: Smoother::new(cfg.rsi_method, cfg.rsi_len),
            rsi_window: RollingWindow::new(cfg.stoch_len),
            prev_base: f64::NAN,
            k_smooth: Smoother::new(cfg.k_method.into(), cfg.k_len),
            d_smooth: Smoother::new(cfg.d_method.into(), cfg.d_len),
            cfg,
            rsi: f64::NAN,
            base: f64::NAN,
            k: f64::NAN,
            d: f64::NAN,
            fisher: f64::NAN,
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        let price = self.cfg.source.of(bar);
        if self.prev_price.is_nan() {
            self.prev_price = price;
            return;
        }
        let change = price - self.prev_price;
        self.prev_price = price;

        let avg_gain = self.gain_smooth.update(change.max(0.0));
        let avg_loss = self.loss_smooth.update((-change).max(0.0));
        if !avg_gain.is_finite() {
            return;
        }
        self.rsi = if avg_loss == 0.0 {
            if avg_gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
        };

        self.rsi_window.push(self.rsi);
        if !self.rsi_window.is_full() {
            return;
        }
        let (lo, hi) = (self.rsi_window.min(), self.rsi_window.max());
        let span = hi - lo;
        let base = if span > 0.0 {
            ((self.rsi - lo) / span).clamp(0.0, 1.0)
        } else {
            match self.cfg.zero_div {
                ZeroDivPolicy::Nan => f64::NAN,
                ZeroDivPolicy::Zero => 0.0,
                ZeroDivPolicy::Prev => self.prev_base,
            }
        };
        self.base = base;
        if base.is_finite() {
            self.prev_base = base;
            self.k = self.k_smooth.update(base);
            if self.k.is_finite() {
                self.d = self.d_smooth.update(self.k);
            }
            if self.cfg.fisher {
                let x = (2.0 * base - 1.0).clamp(-0.999, 0.999);
                self.fisher = 0.5 * ((1.0 + x) / (1.0 - x)).ln();
            }
        }
    }
}

pub fn compute(cfg: &StochRsiConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = StochRsiState::new(cfg.clone());
    let n = bars.len();
    let mut rsi = Vec::with_capacity(n);
    let mut k = Vec::with_capacity(n);
    let mut d = Vec::with_capacity(n);
    let mut fisher = Vec::with_capacity(n);

    for bar in bars {
        state.update(bar);
        rsi.push(state.rsi);
        k.push(state.k);
        d.push(state.d);
        if cfg.fisher {
            fisher.push(state.fisher);
        }
    }

    let mut out = IndicatorOutput::new();
    out.insert("rsi".to_string(), rsi);
    out.insert("k".to_string(), k);
    out.insert("d".to_string(), d);
    if cfg.fisher {
        out.insert("fisher".to_string(), fisher);
    }
    out
}
