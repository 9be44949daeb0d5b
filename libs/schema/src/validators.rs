//! Built-in schema definitions and their domain constraints.

use serde_json::Value;
use thiserror::Error;
use types::event::ALLOWED_TIMEFRAMES;

use crate::registry::{FieldSpec, FieldType, SchemaDef};

/// Structural validation failure. The display string becomes the DLT
/// diagnostic, so messages stay short and field-specific.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("field {field} has wrong type, expected {expected}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },

    #[error("unknown schema {name} v{version}")]
    UnknownSchema { name: String, version: String },

    #[error("constraint violated: {0}")]
    Constraint(String),
}

fn constraint(msg: impl Into<String>) -> ValidationError {
    ValidationError::Constraint(msg.into())
}

/// Ingest schema v2: the [`types::NormalizedEvent`] wire shape.
pub fn ingest_v2() -> SchemaDef {
    SchemaDef {
        name: "ingest",
        version: "2",
        fields: vec![
            FieldSpec::required("v", FieldType::Integer),
            FieldSpec::required("source", FieldType::String),
            FieldSpec::required("event_type", FieldType::String),
            FieldSpec::required("symbol", FieldType::String),
            FieldSpec::required("tf", FieldType::NullableString),
            FieldSpec::required("ts_event", FieldType::Integer),
            FieldSpec::required("ingest_ts", FieldType::Integer),
            FieldSpec::required("correlation_id", FieldType::String),
            FieldSpec::required("payload", FieldType::Object),
        ],
        constraint: Some(check_ingest_v2),
    }
}

fn check_ingest_v2(value: &Value) -> Result<(), ValidationError> {
    let event_type = value["event_type"].as_str().unwrap_or_default();
    if !matches!(event_type, "ohlcv" | "tick" | "funding" | "oi") {
        return Err(constraint(format!("unknown event_type {event_type:?}")));
    }

    if let Some(tf) = value["tf"].as_str() {
        if !ALLOWED_TIMEFRAMES.contains(&tf) {
            return Err(constraint(format!("timeframe {tf:?} not allowed")));
        }
    }

    let ts_event = value["ts_event"].as_i64().unwrap_or(0);
    if ts_event <= 0 {
        return Err(constraint("ts_event must be positive"));
    }

    let cid = value["correlation_id"].as_str().unwrap_or_default();
    if cid.len() != 64 || !cid.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(constraint("correlation_id must be 64 hex chars"));
    }

    if event_type == "ohlcv" {
        check_ohlcv_payload(&value["payload"])?;
    }
    Ok(())
}

fn check_ohlcv_payload(payload: &Value) -> Result<(), ValidationError> {
    let mut prices = [0.0f64; 5];
    for (i, key) in ["o", "h", "l", "c", "v"].iter().enumerate() {
        let n = payload[*key]
            .as_f64()
            .ok_or_else(|| constraint(format!("ohlcv payload missing numeric {key:?}")))?;
        if !n.is_finite() || n < 0.0 {
            return Err(constraint(format!("ohlcv field {key:?} must be >= 0")));
        }
        prices[i] = n;
    }
    let [o, h, l, c, _v] = prices;
    if l > o.min(c) || h < o.max(c) {
        return Err(constraint(format!(
            "ohlcv ordering violated: l={l} o={o} c={c} h={h}"
        )));
    }
    Ok(())
}

/// Features schema v2: symbol/tf/timestamp plus an open indicator map.
pub fn features_v2() -> SchemaDef {
    SchemaDef {
        name: "features",
        version: "2",
        fields: vec![
            FieldSpec::required("symbol", FieldType::String),
            FieldSpec::required("tf", FieldType::String),
            FieldSpec::required("timestamp", FieldType::Integer),
            FieldSpec::required("indicators", FieldType::Object),
        ],
        constraint: None,
    }
}

/// Signal schema v2: the [`types::Signal`] wire shape.
pub fn signal_v2() -> SchemaDef {
    SchemaDef {
        name: "signal",
        version: "2",
        fields: vec![
            FieldSpec::required("schema_version", FieldType::String),
            FieldSpec::required("signal_id", FieldType::String),
            FieldSpec::required("symbol", FieldType::String),
            FieldSpec::required("tf", FieldType::String),
            FieldSpec::required("ts_event", FieldType::String),
            FieldSpec::required("ts_signal", FieldType::String),
            FieldSpec::required("side", FieldType::String),
            FieldSpec::required("prob_tp", FieldType::Number),
            FieldSpec::required("entry", FieldType::Number),
            FieldSpec::required("sl", FieldType::Number),
            FieldSpec::required("tp", FieldType::Number),
            FieldSpec::required("model_version", FieldType::String),
            FieldSpec::optional("rationale", FieldType::Object),
            FieldSpec::optional("risk", FieldType::Object),
            FieldSpec::optional("extra", FieldType::Object),
        ],
        constraint: Some(check_signal_v2),
    }
}

fn check_signal_v2(value: &Value) -> Result<(), ValidationError> {
    let side = value["side"].as_str().unwrap_or_default();
    if !matches!(side, "LONG" | "SHORT" | "NEUTRAL") {
        return Err(constraint(format!("unknown side {side:?}")));
    }
    let prob = value["prob_tp"].as_f64().unwrap_or(-1.0);
    if !(0.0..=1.0).contains(&prob) {
        return Err(constraint("prob_tp must be within [0, 1]"));
    }
    let id = value["signal_id"].as_str().unwrap_or_default();
    if id.len() != 16 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(constraint("signal_id must be 16 hex chars"));
    }
    Ok(())
}
