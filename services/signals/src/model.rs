//! Model loading and TP-probability inference.
//!
//! Two capability surfaces: [`ProbabilityPredictor`] for backends that emit
//! class probabilities directly, and [`ScorePredictor`] for score-only
//! backends whose output goes through a logistic link. An optional
//! calibrator (Platt sigmoid or isotonic table) post-processes the
//! probability. The shipped artifact format is a JSON linear/logistic
//! model; heavier runtimes slot in behind the same traits.

use std::path::Path;

use parking_lot::Mutex;
use serde::Deserialize;
use types::FeatureRow;

use crate::error::{Result, SignalError};

/// Backend emitting positive-class probabilities.
pub trait ProbabilityPredictor: Send + Sync {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64>;
}

/// Backend emitting raw scores; mapped through `1/(1+e^-z)`.
pub trait ScorePredictor: Send + Sync {
    fn predict_score(&self, rows: &[Vec<f64>]) -> Vec<f64>;
}

fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Linear model with a logistic link: `p = σ(w·x + b)`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl ScorePredictor for LinearModel {
    fn predict_score(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter()
            .map(|x| {
                self.intercept
                    + self
                        .weights
                        .iter()
                        .zip(x.iter())
                        .map(|(w, v)| w * v)
                        .sum::<f64>()
            })
            .collect()
    }
}

impl ProbabilityPredictor for LinearModel {
    fn predict_proba(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        self.predict_score(rows).into_iter().map(logistic).collect()
    }
}

/// Probability post-processing.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Calibrator {
    /// Platt scaling: `p' = 1/(1 + exp(a·p + b))`.
    Sigmoid { a: f64, b: f64 },
    /// Isotonic regression as a piecewise-linear table over `[0, 1]`.
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

impl Calibrator {
    pub fn apply(&self, p: f64) -> f64 {
        let out = match self {
            Calibrator::Sigmoid { a, b } => logistic(-(a * p + b)),
            Calibrator::Isotonic { x, y } => interpolate(x, y, p),
        };
        out.clamp(0.0, 1.0)
    }
}

fn interpolate(xs: &[f64], ys: &[f64], p: f64) -> f64 {
    if xs.is_empty() || xs.len() != ys.len() {
        return p;
    }
    if p <= xs[0] {
        return ys[0];
    }
    if p >= xs[xs.len() - 1] {
        return ys[ys.len() - 1];
    }
    for i in 1..xs.len() {
        if p <= xs[i] {
            let span = xs[i] - xs[i - 1];
            if span <= 0.0 {
                return ys[i];
            }
            let frac = (p - xs[i - 1]) / span;
            return ys[i - 1] + frac * (ys[i] - ys[i - 1]);
        }
    }
    ys[ys.len() - 1]
}

/// On-disk artifact: model weights, optional feature order and calibrator.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelArtifact {
    pub model: LinearModel,
    #[serde(default)]
    pub feature_order: Option<Vec<String>>,
    #[serde(default)]
    pub calibrator: Option<Calibrator>,
    #[serde(default)]
    pub model_version: Option<String>,
}

enum Backend {
    Probability(Box<dyn ProbabilityPredictor>),
    Score(Box<dyn ScorePredictor>),
    /// No artifact: an unfitted model answers 0.5 everywhere.
    Constant(f64),
}

/// Loads a model artifact and serves TP probabilities per feature row.
pub struct ModelRunner {
    backend: Backend,
    calibrator: Option<Calibrator>,
    feature_order: Mutex<Option<Vec<String>>>,
    threshold: f64,
    version: String,
}

impl ModelRunner {
    /// Fallback runner with a fixed probability.
    pub fn constant(p: f64) -> Self {
        Self {
            backend: Backend::Constant(p.clamp(0.0, 1.0)),
            calibrator: None,
            feature_order: Mutex::new(None),
            threshold: 0.5,
            version: "constant".to_string(),
        }
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Self {
        let version = artifact
            .model_version
            .unwrap_or_else(|| "linear-v1".to_string());
        Self {
            backend: Backend::Probability(Box::new(artifact.model)),
            calibrator: artifact.calibrator,
            feature_order: Mutex::new(artifact.feature_order),
            threshold: 0.5,
            version,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| SignalError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let artifact: ModelArtifact = serde_json::from_slice(&raw)
            .map_err(|e| SignalError::Model(format!("invalid artifact: {e}")))?;
        Ok(Self::from_artifact(artifact))
    }

    pub fn from_score_backend(backend: Box<dyn ScorePredictor>) -> Self {
        Self {
            backend: Backend::Score(backend),
            calibrator: None,
            feature_order: Mutex::new(None),
            threshold: 0.5,
            version: "score-v1".to_string(),
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Feature matrix for the rows: artifact order when present, else the
    /// numeric columns of the first row, latched for later calls.
    fn matrix(&self, rows: &[FeatureRow]) -> Vec<Vec<f64>> {
        let mut order = self.feature_order.lock();
        if order.is_none() {
            let first: Vec<String> = rows
                .first()
                .map(|row| row.values.keys().cloned().collect())
                .unwrap_or_default();
            *order = Some(first);
        }
        let order = order.as_ref().expect("latched feature order");
        rows.iter()
            .map(|row| {
                order
                    .iter()
                    .map(|name| {
                        row.get(name)
                            .filter(|v| v.is_finite())
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect()
    }

    /// TP probability per row, in [0, 1], calibrated when configured.
    pub fn predict_proba(&self, rows: &[FeatureRow]) -> Vec<f64> {
        let probs = match &self.backend {
            Backend::Constant(p) => vec![*p; rows.len()],
            Backend::Probability(model) => model.predict_proba(&self.matrix(rows)),
            Backend::Score(model) => model
                .predict_score(&self.matrix(rows))
                .into_iter()
                .map(logistic)
                .collect(),
        };
        probs
            .into_iter()
            .map(|p| {
                let p = match &self.calibrator {
                    Some(c) => c.apply(p),
                    None => p,
                };
                p.clamp(0.0, 1.0)
            })
            .collect()
    }

    /// Binary decision at the configured threshold.
    pub fn predict(&self, rows: &[FeatureRow]) -> Vec<bool> {
        self.predict_proba(rows)
            .into_iter()
            .map(|p| p >= self.threshold)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(values: &[(&str, f64)]) -> FeatureRow {
        let map: BTreeMap<String, f64> = values
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        FeatureRow::new("BTCUSDT", "1h", 0, map, "code")
    }

    fn artifact_json() -> serde_json::Value {
        serde_json::json!({
            "model": {"weights": [1.0, -0.5], "intercept": 0.0},
            "feature_order": ["adx_adx", "atr_atr"],
            "model_version": "linear-v2"
        })
    }

    #[test]
    fn constant_runner_answers_half() {
        let runner = ModelRunner::constant(0.5);
        let rows = vec![row(&[("x", 1.0)]), row(&[("x", 2.0)])];
        assert_eq!(runner.predict_proba(&rows), vec![0.5, 0.5]);
        assert_eq!(runner.predict(&rows), vec![true, true]);
    }

    #[test]
    fn linear_model_respects_feature_order() {
        let artifact: ModelArtifact = serde_json::from_value(artifact_json()).unwrap();
        let runner = ModelRunner::from_artifact(artifact);
        assert_eq!(runner.version(), "linear-v2");

        // z = 1*adx - 0.5*atr = 2 -> p > 0.5
        let p = runner.predict_proba(&[row(&[("adx_adx", 4.0), ("atr_atr", 4.0)])]);
        assert!((p[0] - logistic(2.0)).abs() < 1e-12);

        // missing features are zero-filled
        let p = runner.predict_proba(&[row(&[("adx_adx", 0.0)])]);
        assert_eq!(p[0], 0.5);
    }

    #[test]
    fn first_seen_numeric_columns_are_latched() {
        let runner = ModelRunner::from_artifact(ModelArtifact {
            model: LinearModel {
                weights: vec![1.0],
                intercept: 0.0,
            },
            feature_order: None,
            calibrator: None,
            model_version: None,
        });
        let first = runner.predict_proba(&[row(&[("a", 1.0)])]);
        // same column set later keeps the same ordering and result
        let second = runner.predict_proba(&[row(&[("a", 1.0), ("b", 99.0)])]);
        assert_eq!(first[0], second[0]);
    }

    #[test]
    fn sigmoid_calibration_applies_platt_form() {
        let cal = Calibrator::Sigmoid { a: -4.0, b: 2.0 };
        // p' = 1/(1+exp(a*p+b)); at p=0.5 -> 1/(1+exp(0)) = 0.5
        assert!((cal.apply(0.5) - 0.5).abs() < 1e-12);
        assert!(cal.apply(0.9) > 0.5);
        assert!(cal.apply(0.1) < 0.5);
    }

    #[test]
    fn isotonic_table_interpolates_and_clamps() {
        let cal = Calibrator::Isotonic {
            x: vec![0.0, 0.5, 1.0],
            y: vec![0.1, 0.4, 0.9],
        };
        assert_eq!(cal.apply(0.0), 0.1);
        assert!((cal.apply(0.25) - 0.25).abs() < 1e-12);
        assert_eq!(cal.apply(1.5), 0.9);
    }

    #[test]
    fn load_rejects_bad_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, b"not json").unwrap();
        assert!(matches!(
            ModelRunner::load(&path),
            Err(SignalError::Model(_))
        ));
    }
}
