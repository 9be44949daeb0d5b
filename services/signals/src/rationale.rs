//! Feature-contribution rationales for emitted signals.
//!
//! When the model exposes linear weights, a feature's contribution is
//! `|w·x|`; otherwise the proxy falls back to `|x|`. The top-k
//! contributions are L1-normalized and keyed by a stable `rationale_id`
//! so identical explanations deduplicate downstream.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use types::{sha256_hex, FeatureRow};

#[derive(Debug, Clone)]
pub struct RationaleConfig {
    pub top_k: usize,
    pub normalize: bool,
}

impl Default for RationaleConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            normalize: true,
        }
    }
}

/// Compact explanation payload attached to a signal.
#[derive(Debug, Clone, Serialize)]
pub struct Rationale {
    pub rationale_id: String,
    /// (feature, contribution) pairs, largest first.
    pub top_features: Vec<(String, f64)>,
}

pub struct RationaleMapper {
    cfg: RationaleConfig,
    /// Linear weights by feature name, when the model exposes them.
    weights: Option<HashMap<String, f64>>,
}

impl RationaleMapper {
    pub fn new(cfg: RationaleConfig) -> Self {
        Self { cfg, weights: None }
    }

    pub fn with_weights(mut self, weights: HashMap<String, f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Explain one feature row.
    pub fn explain_row(&self, row: &FeatureRow) -> Rationale {
        let mut contributions: Vec<(String, f64)> = row
            .values
            .iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(name, value)| {
                let contribution = match self.weights.as_ref().and_then(|w| w.get(name)) {
                    Some(weight) => (weight * value).abs(),
                    None => value.abs(),
                };
                (name.clone(), contribution)
            })
            .collect();
        contributions
            .sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        contributions.truncate(self.cfg.top_k.max(1));

        if self.cfg.normalize {
            let total: f64 = contributions.iter().map(|(_, c)| c).sum();
            if total > 0.0 {
                for (_, c) in contributions.iter_mut() {
                    *c /= total;
                }
            }
        }

        Rationale {
            rationale_id: rationale_id(&contributions),
            top_features: contributions,
        }
    }
}

/// Stable 16-hex id over the sorted contribution payload.
fn rationale_id(contributions: &[(String, f64)]) -> String {
    let canonical: BTreeMap<&str, String> = contributions
        .iter()
        .map(|(name, c)| (name.as_str(), format!("{c:.10}")))
        .collect();
    let payload = serde_json::to_string(&canonical).expect("contributions serialize");
    sha256_hex(payload.as_bytes())[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[(&str, f64)]) -> FeatureRow {
        let map: BTreeMap<String, f64> = values
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        FeatureRow::new("BTCUSDT", "1h", 0, map, "code")
    }

    #[test]
    fn top_k_is_ordered_and_normalized() {
        let mapper = RationaleMapper::new(RationaleConfig {
            top_k: 2,
            normalize: true,
        });
        let r = mapper.explain_row(&row(&[("a", 1.0), ("b", -3.0), ("c", 2.0)]));
        assert_eq!(r.top_features.len(), 2);
        assert_eq!(r.top_features[0].0, "b");
        assert_eq!(r.top_features[1].0, "c");
        let total: f64 = r.top_features.iter().map(|(_, c)| c).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_reorder_contributions() {
        let weights: HashMap<String, f64> =
            [("a".to_string(), 10.0), ("b".to_string(), 0.1)].into();
        let mapper = RationaleMapper::new(RationaleConfig::default()).with_weights(weights);
        let r = mapper.explain_row(&row(&[("a", 1.0), ("b", 5.0)]));
        assert_eq!(r.top_features[0].0, "a"); // |10*1| > |0.1*5|
    }

    #[test]
    fn identical_explanations_share_an_id() {
        let mapper = RationaleMapper::new(RationaleConfig::default());
        let a = mapper.explain_row(&row(&[("x", 1.5), ("y", 0.5)]));
        let b = mapper.explain_row(&row(&[("x", 1.5), ("y", 0.5)]));
        assert_eq!(a.rationale_id, b.rationale_id);
        assert_eq!(a.rationale_id.len(), 16);
        let c = mapper.explain_row(&row(&[("x", 2.5), ("y", 0.5)]));
        assert_ne!(a.rationale_id, c.rationale_id);
    }

    #[test]
    fn non_finite_values_are_excluded() {
        let mapper = RationaleMapper::new(RationaleConfig::default());
        let r = mapper.explain_row(&row(&[("x", f64::NAN), ("y", 1.0)]));
        assert_eq!(r.top_features.len(), 1);
        assert_eq!(r.top_features[0].0, "y");
    }
}
