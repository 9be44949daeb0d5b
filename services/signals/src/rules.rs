//! Bounded rule scoring from feature columns.

use types::FeatureRow;

const EPS: f64 = 1e-9;

/// Composite rule score in [-1, +1]:
///
/// - trend strength: `0.6 · clamp(adx, 0, 50)/50`
/// - price location: `0.2 · (+1 above vwap, −1 below)`
/// - volatility penalty: `−0.2 · clamp(atr/close, 0, 5%)/5%`
pub fn rule_score(adx: f64, atr: f64, vwap: f64, close: f64) -> f64 {
    let adx_norm = adx.clamp(0.0, 50.0) / 50.0;
    let above_vwap = if close > vwap { 1.0 } else { -1.0 };
    let atr_norm = (atr / close.max(EPS)).clamp(0.0, 0.05) / 0.05;
    (0.6 * adx_norm + 0.2 * above_vwap - 0.2 * atr_norm).clamp(-1.0, 1.0)
}

/// Extract the rule inputs from a feature row. `None` when a required
/// column is missing or non-finite; the caller skips the row.
pub fn rule_score_row(row: &FeatureRow) -> Option<f64> {
    let adx = pick(row, "adx")?;
    let atr = pick(row, "atr")?;
    let vwap = pick(row, "vwap")?;
    let close = row.get("close").filter(|v| v.is_finite())?;
    Some(rule_score(adx, atr, vwap, close))
}

/// Prefer the exact `<name>_<name>` column, falling back to any column
/// containing the name.
fn pick(row: &FeatureRow, name: &str) -> Option<f64> {
    let exact = format!("{name}_{name}");
    row.get(&exact)
        .filter(|v| v.is_finite())
        .or_else(|| row.find_column_containing(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn strong_trend_above_vwap_scores_high() {
        // adx 50 -> 0.6; above vwap -> +0.2; zero vol penalty
        let score = rule_score(50.0, 0.0, 99.0, 100.0);
        assert!((score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn below_vwap_with_high_volatility_scores_low() {
        // adx 0; below vwap -> -0.2; atr/close capped at 5% -> -0.2
        let score = rule_score(0.0, 50.0, 101.0, 100.0);
        assert!((score + 0.4).abs() < 1e-12);
    }

    #[test]
    fn adx_and_atr_are_clamped() {
        let a = rule_score(500.0, 0.0, 99.0, 100.0);
        let b = rule_score(50.0, 0.0, 99.0, 100.0);
        assert_eq!(a, b);
        let c = rule_score(0.0, 1e9, 101.0, 100.0);
        let d = rule_score(0.0, 5.0, 101.0, 100.0);
        assert_eq!(c, d);
    }

    #[test]
    fn row_extraction_prefers_exact_columns() {
        let mut values = BTreeMap::new();
        values.insert("adx_adx".to_string(), 25.0);
        values.insert("adx_adxr".to_string(), 99.0);
        values.insert("atr_atr".to_string(), 1.0);
        values.insert("vwap_vwap".to_string(), 99.5);
        values.insert("close".to_string(), 100.0);
        let row = types::FeatureRow::new("BTCUSDT", "1h", 0, values, "code");
        let score = rule_score_row(&row).unwrap();
        assert!((score - rule_score(25.0, 1.0, 99.5, 100.0)).abs() < 1e-12);
    }

    #[test]
    fn missing_columns_yield_none() {
        let row = types::FeatureRow::new("BTCUSDT", "1h", 0, BTreeMap::new(), "code");
        assert!(rule_score_row(&row).is_none());
    }
}
