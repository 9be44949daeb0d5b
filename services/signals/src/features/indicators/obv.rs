//! On-Balance Volume.
//!
//! `OBV = OBV₋₁ + d·vol` with direction `d = sign(close − close₋₁)`. The
//! tie policy decides `d` on unchanged closes; the volume mode selects raw
//! volume, tick (1 when volume > 0) or notional (`v·close`).

use serde::Deserialize;

use super::IndicatorOutput;
use crate::bar::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Unchanged close contributes nothing.
    #[default]
    Zero,
    /// Repeat the previous bar's direction.
    Carry,
    /// Repeat the last non-zero direction.
    LastNonzero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VolumeMode {
    #[default]
    Raw,
    Tick,
    Notional,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ObvConfig {
    pub tie_policy: TiePolicy,
    pub volume: VolumeMode,
}

#[derive(Debug, Clone)]
pub struct ObvState {
    cfg: ObvConfig,
    prev_close: f64,
    prev_direction: f64,
    last_nonzero_direction: f64,
    pub obv: f64,
}

impl ObvState {
    pub fn new(cfg: ObvConfig) -> Self {
        Self {
            cfg,
            prev_close: f64::NAN,
            prev_direction: 0.0,
            last_nonzero_direction: 0.0,
            obv: f64::NAN,
        }
    }

    pub fn update(&mut self, bar: &Bar) -> f64 {
        if self.prev_close.is_nan() {
            self.prev_close = bar.close;
            self.obv = 0.0;
            return self.obv;
        }

        let raw = bar.close - self.prev_close;
        self.prev_close = bar.close;
        let mut direction = raw.signum();
        if raw == 0.0 {
            direction = match self.cfg.tie_policy {
                TiePolicy::Zero => 0.0,
                TiePolicy::Carry => self.prev_direction,
                TiePolicy::LastNonzero => self.last_nonzero_direction,
            };
        }
        self.prev_direction = direction;
        if direction != 0.0 {
            self.last_nonzero_direction = direction;
        }

        let volume = match self.cfg.volume {
            VolumeMode::Raw => bar.volume,
            VolumeMode::Tick => {
                if bar.volume > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            VolumeMode::Notional => bar.volume * bar.close,
        };
        self.obv += direction * volume;
        self.obv
    }
}

pub fn compute(cfg: &ObvConfig, bars: &[Bar]) -> IndicatorOutput {
    let mut state = ObvState::new(cfg.clone());
    let obv: Vec<f64> = bars.iter().map(|bar| state.update(bar)).collect();
    let mut out = IndicatorOutput::new();
    out.insert("obv".to_string(), obv);
    out
}
