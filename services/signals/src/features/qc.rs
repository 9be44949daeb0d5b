//! Feature quality control: outlier clipping, gap filling, invalid rates.

use std::collections::BTreeMap;

use super::indicators::IndicatorOutput;

/// Interpolated quantile over the finite values of a series (linear, as in
/// the usual dataframe default). Returns NaN when nothing is finite.
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    finite.sort_by(|a, b| a.partial_cmp(b).expect("finite values compare"));
    let pos = q * (finite.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    if lo == hi {
        finite[lo]
    } else {
        let frac = pos - lo as f64;
        finite[lo] * (1.0 - frac) + finite[hi] * frac
    }
}

/// Clip each column to `[Q1 − k·IQR, Q3 + k·IQR]`, only when the IQR is
/// finite and positive. NaNs pass through untouched.
pub fn iqr_clip(columns: &mut IndicatorOutput, k: f64) {
    for series in columns.values_mut() {
        let q1 = quantile(series, 0.25);
        let q3 = quantile(series, 0.75);
        let iqr = q3 - q1;
        if !iqr.is_finite() || iqr <= 0.0 {
            continue;
        }
        let lower = q1 - k * iqr;
        let upper = q3 + k * iqr;
        for v in series.iter_mut() {
            if v.is_finite() {
                *v = v.clamp(lower, upper);
            }
        }
    }
}

/// Forward-fill up to `limit` consecutive non-finite entries per column.
pub fn forward_fill_small_gaps(columns: &mut IndicatorOutput, limit: usize) {
    for series in columns.values_mut() {
        let mut last_valid = f64::NAN;
        let mut gap = 0usize;
        for v in series.iter_mut() {
            if v.is_finite() {
                last_valid = *v;
                gap = 0;
            } else {
                gap += 1;
                if gap <= limit && last_valid.is_finite() {
                    *v = last_valid;
                }
            }
        }
    }
}

/// Fraction of non-finite values per column, plus `_overall` across the
/// whole frame.
pub fn invalid_feature_rate(columns: &IndicatorOutput) -> BTreeMap<String, f64> {
    let mut rates = BTreeMap::new();
    let mut total_invalid = 0usize;
    let mut total_cells = 0usize;
    for (name, series) in columns {
        let invalid = series.iter().filter(|v| !v.is_finite()).count();
        let n = series.len().max(1);
        rates.insert(name.clone(), invalid as f64 / n as f64);
        total_invalid += invalid;
        total_cells += series.len();
    }
    rates.insert(
        "_overall".to_string(),
        total_invalid as f64 / total_cells.max(1) as f64,
    );
    rates
}
