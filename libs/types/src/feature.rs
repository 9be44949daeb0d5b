//! Computed feature rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::sha256_hex;
use crate::time::to_iso_utc;

/// One row of indicator features for a (symbol, tf, ts_event) key.
///
/// `values` is ordered by column name so hashing and serialization are
/// deterministic. Non-finite values are preserved in memory and rendered as
/// `null` inside the hash payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub symbol: String,
    pub tf: String,
    /// Event time, ms since epoch (UTC).
    pub ts_event: i64,
    pub values: BTreeMap<String, f64>,
    /// 64-hex digest binding the row data to the computing code version.
    pub feature_hash: String,
}

impl FeatureRow {
    /// Build a row, computing `feature_hash` over the canonical payload
    /// `{symbol, tf, ts_event ISO, rounded values, code_hash}`.
    pub fn new(
        symbol: impl Into<String>,
        tf: impl Into<String>,
        ts_event: i64,
        values: BTreeMap<String, f64>,
        code_hash: &str,
    ) -> Self {
        let symbol = symbol.into();
        let tf = tf.into();
        let feature_hash = Self::hash_for(&symbol, &tf, ts_event, &values, code_hash);
        Self {
            symbol,
            tf,
            ts_event,
            values,
            feature_hash,
        }
    }

    /// The canonical row hash; exposed so verification does not need to
    /// rebuild a row.
    pub fn hash_for(
        symbol: &str,
        tf: &str,
        ts_event: i64,
        values: &BTreeMap<String, f64>,
        code_hash: &str,
    ) -> String {
        let rounded: Vec<serde_json::Value> = values
            .values()
            .map(|v| {
                if v.is_finite() {
                    // 10 decimal places keeps hashes stable across float noise
                    let r = (v * 1e10).round() / 1e10;
                    serde_json::json!(r)
                } else {
                    serde_json::Value::Null
                }
            })
            .collect();
        let payload = serde_json::json!({
            "code_hash": code_hash,
            "features": rounded,
            "symbol": symbol,
            "tf": tf,
            "ts_event": to_iso_utc(ts_event),
        });
        sha256_hex(payload.to_string().as_bytes())
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// First finite value among columns whose name contains `needle`
    /// (case-insensitive). Used to locate e.g. an ATR column regardless of
    /// the configured parameter suffix.
    pub fn find_column_containing(&self, needle: &str) -> Option<f64> {
        let needle = needle.to_ascii_lowercase();
        self.values
            .iter()
            .find(|(name, v)| name.to_ascii_lowercase().contains(&needle) && v.is_finite())
            .map(|(_, v)| *v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_values() -> BTreeMap<String, f64> {
        let mut m = BTreeMap::new();
        m.insert("adx_adx".to_string(), 27.5);
        m.insert("atr_atr".to_string(), 12.25);
        m.insert("vwap_vwap".to_string(), f64::NAN);
        m
    }

    #[test]
    fn hash_is_deterministic_and_code_versioned() {
        let a = FeatureRow::new("BTCUSDT", "1h", 1_700_000_000_000, sample_values(), "abcd");
        let b = FeatureRow::new("BTCUSDT", "1h", 1_700_000_000_000, sample_values(), "abcd");
        let c = FeatureRow::new("BTCUSDT", "1h", 1_700_000_000_000, sample_values(), "ffff");
        assert_eq!(a.feature_hash, b.feature_hash);
        assert_ne!(a.feature_hash, c.feature_hash);
        assert_eq!(a.feature_hash.len(), 64);
    }

    #[test]
    fn finds_atr_column_skipping_non_finite() {
        let row = FeatureRow::new("BTCUSDT", "1h", 0, sample_values(), "abcd");
        assert_eq!(row.find_column_containing("atr"), Some(12.25));
        assert_eq!(row.find_column_containing("vwap"), None);
    }
}
