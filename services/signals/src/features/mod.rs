//! Deterministic feature computation.
//!
//! Pipeline: canonicalize the input frame (UTC timestamps, stable sort by
//! (symbol, tf, ts_event)), compute each configured indicator with its
//! columns namespaced by the indicator name, run quality control, append
//! the OHLCV passthrough columns, then hash every row so identical inputs
//! and code produce identical `feature_hash`es.

pub mod indicators;
pub mod qc;

use std::collections::BTreeMap;

use metrics::gauge;
use once_cell::sync::Lazy;
use schema::SchemaRegistry;
use serde_json::json;
use types::FeatureRow;

use crate::bar::Bar;
use crate::error::{Result, SignalError};
use indicators::IndicatorOutput;

/// Stable 16-hex digest over the indicator and engine sources; part of
/// every `feature_hash` so recomputation with changed code re-keys rows.
pub static CODE_HASH: Lazy<String> = Lazy::new(|| {
    let sources = concat!(
        include_str!("mod.rs"),
        include_str!("qc.rs"),
        include_str!("indicators/mod.rs"),
        include_str!("indicators/atr.rs"),
        include_str!("indicators/adx.rs"),
        include_str!("indicators/vwap.rs"),
        include_str!("indicators/obv.rs"),
        include_str!("indicators/ichimoku.rs"),
        include_str!("indicators/stoch_rsi.rs"),
    );
    types::sha256_hex(sources.as_bytes())[..16].to_string()
});

/// One configured indicator with free-form parameters.
#[derive(Debug, Clone)]
pub struct IndicatorSpec {
    pub name: String,
    pub params: serde_json::Value,
}

/// Engine configuration: indicator list plus QC knobs.
#[derive(Debug, Clone)]
pub struct FeatureEngineConfig {
    pub indicators: Vec<IndicatorSpec>,
    pub iqr_k: f64,
    pub ffill_limit: usize,
}

impl Default for FeatureEngineConfig {
    fn default() -> Self {
        Self {
            indicators: vec![
                IndicatorSpec {
                    name: "atr".to_string(),
                    params: serde_json::Value::Null,
                },
                IndicatorSpec {
                    name: "adx".to_string(),
                    params: serde_json::Value::Null,
                },
                IndicatorSpec {
                    name: "vwap".to_string(),
                    params: serde_json::Value::Null,
                },
            ],
            iqr_k: 1.5,
            ffill_limit: 1,
        }
    }
}

impl From<&config::FeaturesConfig> for FeatureEngineConfig {
    fn from(cfg: &config::FeaturesConfig) -> Self {
        Self {
            indicators: cfg
                .indicators
                .iter()
                .map(|spec| IndicatorSpec {
                    name: spec.name.clone(),
                    params: spec.params.clone(),
                })
                .collect(),
            iqr_k: cfg.qc.iqr_k,
            ffill_limit: cfg.qc.ffill_limit,
        }
    }
}

pub struct FeatureEngine {
    cfg: FeatureEngineConfig,
    registry: SchemaRegistry,
}

impl FeatureEngine {
    pub fn new(cfg: FeatureEngineConfig) -> Self {
        Self {
            cfg,
            registry: SchemaRegistry::with_builtin(),
        }
    }

    /// Compute feature rows for a window frame of bars.
    pub fn compute(&self, bars: &[Bar]) -> Result<Vec<FeatureRow>> {
        if bars.is_empty() {
            return Ok(Vec::new());
        }
        let frame = canonicalize(bars);
        let mut columns = self.compute_indicators(&frame)?;

        qc::iqr_clip(&mut columns, self.cfg.iqr_k);
        qc::forward_fill_small_gaps(&mut columns, self.cfg.ffill_limit);
        let rates = qc::invalid_feature_rate(&columns);
        if let Some(overall) = rates.get("_overall") {
            gauge!("features_invalid_rate").set(*overall);
        }

        // OHLCV passthrough rides along untouched by QC
        append_passthrough(&mut columns, &frame)?;

        let mut rows = Vec::with_capacity(frame.len());
        for (i, bar) in frame.iter().enumerate() {
            let values: BTreeMap<String, f64> = columns
                .iter()
                .map(|(name, series)| (name.clone(), series[i]))
                .collect();
            let row = FeatureRow::new(
                bar.symbol.clone(),
                bar.tf.clone(),
                bar.ts_event,
                values,
                &CODE_HASH,
            );
            self.validate_row(&row)?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn compute_indicators(&self, frame: &[Bar]) -> Result<IndicatorOutput> {
        let mut columns = IndicatorOutput::new();
        for spec in &self.cfg.indicators {
            let output = dispatch(&spec.name, &spec.params, frame)?;
            for (col, series) in output {
                let name = if col.starts_with(&spec.name) {
                    col
                } else {
                    format!("{}_{}", spec.name, col)
                };
                if columns.contains_key(&name) {
                    return Err(SignalError::DuplicateColumn(name));
                }
                columns.insert(name, series);
            }
        }
        Ok(columns)
    }

    fn validate_row(&self, row: &FeatureRow) -> Result<()> {
        let indicators: serde_json::Map<String, serde_json::Value> = row
            .values
            .iter()
            .map(|(name, v)| (name.clone(), json!(v)))
            .collect();
        let payload = json!({
            "symbol": row.symbol,
            "tf": row.tf,
            "timestamp": row.ts_event,
            "indicators": indicators,
        });
        self.registry.validate("features", "2", &payload)?;
        Ok(())
    }
}

fn canonicalize(bars: &[Bar]) -> Vec<Bar> {
    let mut frame = bars.to_vec();
    frame.sort_by(|a, b| {
        (a.symbol.as_str(), a.tf.as_str(), a.ts_event)
            .cmp(&(b.symbol.as_str(), b.tf.as_str(), b.ts_event))
    });
    frame
}

fn append_passthrough(columns: &mut IndicatorOutput, frame: &[Bar]) -> Result<()> {
    let fields: [(&str, fn(&Bar) -> f64); 5] = [
        ("open", |b| b.open),
        ("high", |b| b.high),
        ("low", |b| b.low),
        ("close", |b| b.close),
        ("volume", |b| b.volume),
    ];
    for (name, extract) in fields {
        if columns.contains_key(name) {
            return Err(SignalError::DuplicateColumn(name.to_string()));
        }
        columns.insert(name.to_string(), frame.iter().map(extract).collect());
    }
    Ok(())
}

fn dispatch(name: &str, params: &serde_json::Value, frame: &[Bar]) -> Result<IndicatorOutput> {
    fn parse<T: serde::de::DeserializeOwned + Default>(
        name: &str,
        params: &serde_json::Value,
    ) -> Result<T> {
        if params.is_null() {
            return Ok(T::default());
        }
        serde_json::from_value(params.clone()).map_err(|e| SignalError::InvalidParams {
            name: name.to_string(),
            detail: e.to_string(),
        })
    }

    match name {
        "atr" => Ok(indicators::atr::compute(&parse(name, params)?, frame)),
        "adx" => Ok(indicators::adx::compute(&parse(name, params)?, frame)),
        "vwap" => Ok(indicators::vwap::compute(&parse(name, params)?, frame)),
        "obv" => Ok(indicators::obv::compute(&parse(name, params)?, frame)),
        "ichimoku" => Ok(indicators::ichimoku::compute(&parse(name, params)?, frame)),
        "stochastic_rsi" | "stoch_rsi" => {
            Ok(indicators::stoch_rsi::compute(&parse(name, params)?, frame))
        }
        other => Err(SignalError::UnknownIndicator(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + (i as f64 * 0.3).sin() * 4.0;
                Bar {
                    symbol: "BTCUSDT".into(),
                    tf: "1h".into(),
                    ts_event: 1_700_000_000_000 + i as i64 * 3_600_000,
                    open: base,
                    high: base + 1.0,
                    low: base - 1.0,
                    close: base + 0.2,
                    volume: 5.0 + (i % 7) as f64,
                }
            })
            .collect()
    }

    fn engine() -> FeatureEngine {
        FeatureEngine::new(FeatureEngineConfig::default())
    }

    #[test]
    fn computes_namespaced_columns_and_hashes() {
        let rows = engine().compute(&bars(40)).unwrap();
        assert_eq!(rows.len(), 40);
        let last = rows.last().unwrap();
        assert!(last.get("atr_atr").unwrap().is_finite());
        assert!(last.get("adx_adx").unwrap().is_finite());
        assert!(last.get("vwap_vwap").unwrap().is_finite());
        assert!(last.get("close").unwrap().is_finite());
        assert_eq!(last.feature_hash.len(), 64);
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let a = engine().compute(&bars(30)).unwrap();
        let b = engine().compute(&bars(30)).unwrap();
        let ha: Vec<_> = a.iter().map(|r| r.feature_hash.clone()).collect();
        let hb: Vec<_> = b.iter().map(|r| r.feature_hash.clone()).collect();
        assert_eq!(ha, hb);
    }

    #[test]
    fn unsorted_input_is_canonicalized() {
        let mut shuffled = bars(30);
        shuffled.reverse();
        let sorted_rows = engine().compute(&bars(30)).unwrap();
        let shuffled_rows = engine().compute(&shuffled).unwrap();
        assert_eq!(
            sorted_rows.last().unwrap().feature_hash,
            shuffled_rows.last().unwrap().feature_hash
        );
    }

    #[test]
    fn unknown_indicator_is_fatal() {
        let cfg = FeatureEngineConfig {
            indicators: vec![IndicatorSpec {
                name: "macd".to_string(),
                params: serde_json::Value::Null,
            }],
            ..FeatureEngineConfig::default()
        };
        assert!(matches!(
            FeatureEngine::new(cfg).compute(&bars(10)),
            Err(SignalError::UnknownIndicator(_))
        ));
    }

    #[test]
    fn duplicate_indicator_columns_are_fatal() {
        let cfg = FeatureEngineConfig {
            indicators: vec![
                IndicatorSpec {
                    name: "atr".to_string(),
                    params: serde_json::Value::Null,
                },
                IndicatorSpec {
                    name: "atr".to_string(),
                    params: serde_json::json!({"period": 20}),
                },
            ],
            ..FeatureEngineConfig::default()
        };
        assert!(matches!(
            FeatureEngine::new(cfg).compute(&bars(10)),
            Err(SignalError::DuplicateColumn(_))
        ));
    }

    #[test]
    fn indicator_params_flow_through() {
        let cfg = FeatureEngineConfig {
            indicators: vec![IndicatorSpec {
                name: "atr".to_string(),
                params: serde_json::json!({"period": 3, "natr": true}),
            }],
            ..FeatureEngineConfig::default()
        };
        let rows = FeatureEngine::new(cfg).compute(&bars(10)).unwrap();
        assert!(rows.last().unwrap().get("atr_natr").is_some());
    }
}
