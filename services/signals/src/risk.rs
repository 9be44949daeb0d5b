//! Risk gating: kill-switch, intraday drawdown cap, per-asset exposure.

use std::collections::HashMap;

use chrono::{NaiveDate, TimeZone, Utc};
use config::RiskConfig;
use metrics::counter;

/// Decision reasons, stable strings carried into signal payloads.
pub mod reason {
    pub const APPROVED: &str = "APPROVED";
    pub const PARTIALLY_APPROVED: &str = "PARTIALLY_APPROVED_EXPOSURE_CAPPED";
    pub const KILL_SWITCH: &str = "KILL_SWITCH_ACTIVE";
    pub const DAILY_MAX_DRAWDOWN: &str = "DAILY_MAX_DRAWDOWN_EXCEEDED";
    pub const EXPOSURE_LIMIT: &str = "EXPOSURE_LIMIT_REACHED";
}

/// Outcome of an order evaluation. A denial is a normal outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskDecision {
    pub approved: bool,
    pub reason: &'static str,
    pub allowed_notional: f64,
}

impl RiskDecision {
    fn deny(reason: &'static str) -> Self {
        Self {
            approved: false,
            reason,
            allowed_notional: 0.0,
        }
    }
}

/// Sequential-per-account risk state. Callers serialize access; the
/// controller keeps equity, the intraday peak (reset on UTC day change),
/// drawdown, per-symbol exposure and the kill switch.
pub struct RiskController {
    cfg: RiskConfig,
    equity: f64,
    exposure_by_symbol: HashMap<String, f64>,
    session_date: Option<NaiveDate>,
    peak_equity_today: Option<f64>,
    drawdown_today: f64,
    kill_switch: bool,
}

impl RiskController {
    pub fn new(cfg: RiskConfig) -> Self {
        Self {
            cfg,
            equity: 0.0,
            exposure_by_symbol: HashMap::new(),
            session_date: None,
            peak_equity_today: None,
            drawdown_today: 0.0,
            kill_switch: false,
        }
    }

    fn date_of(now_ms: i64) -> NaiveDate {
        Utc.timestamp_millis_opt(now_ms)
            .single()
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| Utc::now().date_naive())
    }

    /// Reset the intraday bucket when the UTC date changes.
    fn reset_day_if_needed(&mut self, now_ms: i64) {
        let today = Self::date_of(now_ms);
        if self.session_date != Some(today) {
            self.session_date = Some(today);
            self.peak_equity_today = None;
            self.drawdown_today = 0.0;
        }
    }

    /// Record the account equity; peak and drawdown only ratchet within a
    /// day.
    pub fn update_equity(&mut self, equity: f64, now_ms: i64) {
        self.reset_day_if_needed(now_ms);
        self.equity = equity;
        let peak = match self.peak_equity_today {
            Some(peak) => peak.max(equity),
            None => equity,
        };
        self.peak_equity_today = Some(peak);
        if peak > 0.0 {
            self.drawdown_today = self.drawdown_today.max((peak - equity) / peak);
        }
    }

    pub fn set_kill_switch(&mut self, enabled: bool) {
        self.kill_switch = enabled;
    }

    /// Set the absolute notional exposure currently held on a symbol.
    pub fn update_exposure(&mut self, symbol: &str, notional: f64) {
        self.exposure_by_symbol
            .insert(symbol.to_string(), notional.max(0.0));
    }

    /// Maximum additional notional allowed for a new order on `symbol`.
    pub fn allowed_notional(&self, symbol: &str) -> f64 {
        let equity = self.equity.max(0.0);
        let cap = self.cfg.max_exposure_per_asset * equity;
        let current = self
            .exposure_by_symbol
            .get(symbol)
            .copied()
            .unwrap_or(0.0);
        (cap - current).max(0.0)
    }

    /// Evaluate an order: kill switch, then drawdown, then exposure.
    pub fn evaluate_order(
        &mut self,
        symbol: &str,
        desired_notional: f64,
        now_ms: i64,
    ) -> RiskDecision {
        self.reset_day_if_needed(now_ms);

        let decision = if self.cfg.enable_kill_switch && self.kill_switch {
            RiskDecision::deny(reason::KILL_SWITCH)
        } else if self.drawdown_today >= self.cfg.daily_max_drawdown {
            RiskDecision::deny(reason::DAILY_MAX_DRAWDOWN)
        } else {
            let allowed = self.allowed_notional(symbol);
            if desired_notional <= allowed + 1e-9 {
                RiskDecision {
                    approved: true,
                    reason: reason::APPROVED,
                    allowed_notional: desired_notional,
                }
            } else if allowed > 0.0 {
                RiskDecision {
                    approved: true,
                    reason: reason::PARTIALLY_APPROVED,
                    allowed_notional: allowed,
                }
            } else {
                RiskDecision::deny(reason::EXPOSURE_LIMIT)
            }
        };

        counter!("risk_evaluate_order_total", "reason" => decision.reason).increment(1);
        decision
    }

    /// Snapshot for attaching to signal payloads.
    pub fn status(&self) -> serde_json::Value {
        serde_json::json!({
            "equity": self.equity,
            "daily_drawdown": self.drawdown_today,
            "max_exposure_per_asset": self.cfg.max_exposure_per_asset,
        })
    }
}
