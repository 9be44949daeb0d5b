//! Ichimoku Kinko Hyo.
//!
//! Tenkan and Kijun are midpoints of the high/low range over their
//! lookbacks; Senkou A is their average and Senkou B the long-window
//! midpoint. In displaced mode the senkou lines carry the plotting shift
//! realized causally (the value computed `displacement` bars ago); the
//! default is the unshifted backtest-safe form. Chikou is the close from
//! `displacement` bars ago.

use std::collections::VecDeque;

use serde::Deserialize;

use super::{IndicatorOutput, PriceSource, RollingWindow};
use crate::bar::Bar;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IchimokuConfig {
    pub tenkan: usize,
    pub kijun: usize,
    pub senkou_b: usize,
    pub displacement: usize,
    /// Shift senkou lines forward by `displacement` (plotting-aligned).
    pub displaced: bool,
    /// Price source for the chikou line.
    pub source: PriceSource,
}

impl Default for IchimokuConfig {
    fn default() -> Self {
        Self {
            tenkan: 9,
            kijun: 26,
            senkou_b: 52,
            displacement: 26,
            displaced: false,
            source: PriceSource::Close,
        }
    }
}

/// Midpoint of the highest high and lowest low over a lookback.
#[derive(Debug, Clone)]
struct MidWindow {
    highs: RollingWindow,
    lows: RollingWindow,
}

impl MidWindow {
    fn new(period: usize) -> Self {
        Self {
            highs: RollingWindow::new(period),
            lows: RollingWindow::new(period),
        }
    }

    fn push(&mut self, bar: &Bar) {
        self.highs.push(bar.high);
        self.lows.push(bar.low);
    }

    fn mid(&self) -> f64 {
        if !self.highs.is_full() {
            return f64::NAN;
        }
        (self.highs.max() + self.lows.min()) / 2.0
    }
}

#[derive(Debug, Clone)]
pub struct IchimokuState {
    cfg: IchimokuConfig,
    tenkan_win: MidWindow,
    kijun_win: MidWindow,
    senkou_b_win: MidWindow,
    senkou_a_lag: VecDeque<f64>,
    senkou_b_lag: VecDeque<f64>,
    price_lag: VecDeque<f64>,
    pub tenkan: f64,
    pub kijun: f64,
    pub senkou_a: f64,
    pub senkou_b: f64,
    pub chikou: f64,
}

impl IchimokuState {
    pub fn new(cfg: IchimokuConfig) -> Self {
        Self {
            tenkan_win: MidWindow::new(cfg.tenkan),
            kijun_win: MidWindow::new(cfg.kijun),
            senkou_b_win: MidWindow::new(cfg.senkou_b),
            senkou_a_lag: VecDeque::new(),
            senkou_b_lag: VecDeque::new(),
            price_lag: VecDeque::new(),
            cfg,
            tenkan: f64::NAN,
            kijun: f64::NAN,
            senkou_a: f64::NAN,
            senkou_b: f64::NAN,
            chikou: f64::NAN,
        }
    }

    fn lagged(queue: &mut VecDeque<f64>, value: f64, lag: usize) -> f64 {
        queue.push_back(value);
        if queue.len() > lag + 1 {
            queue.pop_front();
        }
        if queue.len() == lag + 1 {
            *queue.front().expect("non-empty lag queue")
        } else {
            f64::NAN
        }
    }

    pub fn update(&mut self, bar: &Bar) {
        self.tenkan_win.push(bar);
        self.kijun_win.push(bar);
        self.senkou_b_win.push(bar);

        self.tenkan = self.tenkan_win.mid();
        self.kijun = self.kijun_win.mid();
        let senkou_a_now = (self.tenkan + self.kijun) / 2.0;
        let senkou_b_now = self.senkou_b_win.mid();

        if self.cfg.displaced {
            self.senkou_a =
                Self::lagged(&mut self.senkou_a_lag, senkou_a_now, self.cfg.displacement);
            self.senkou_b =
                Self::lagged(&mut self.senkou_b_lag, senkou_b_now, self.cfg.displacement);
        } else {
            self.senkou_a = senkou_a_now;
            self.senkou_b = senkou_b_now;
        }

        let price = self.cfg.source.of(bar);
        self.chikou = Self::lagged(&mut self.price_lag, price, self.cfg.displacement);
    }
}

pub fn compute(cfg: &IchimokuConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = IchimokuState::new(cfg.clone());
    let n = bars.len();
    let mut tenkan = Vec::with_capacity(n);
    let mut kijun = Vec::with_capacity(n);
    let mut senkou_a = Vec::with_capacity(n);
    let mut senkou_b = Vec::with_capacity(n);
    let mut chikou = Vec::with_capacity(n);

    for bar in bars {
        state.update(bar);
        tenkan.push(state.tenkan);
        kijun.push(state.kijun);
        senkou_a.push(state.senkou_a);
        senkou_b.push(state.senkou_b);
        chikou.push(state.chikou);
    }

    let mut out = IndicatorOutput::new();
    out.insert("tenkan".to_string(), tenkan);
    out.insert("kijun".to_string(), kijun);
    out.insert("senkou_a".to_string(), senkou_a);
    out.insert("senkou_b".to_string(), senkou_b);
    out.insert("chikou".to_string(), chikou);
    out
}
