//! Signal v2 envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Trade direction for an emitted signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
    Neutral,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Side::Long => "LONG",
            Side::Short => "SHORT",
            Side::Neutral => "NEUTRAL",
        };
        f.write_str(s)
    }
}

/// A versioned trading signal, published keyed by `signal_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub schema_version: String,
    /// 16-hex digest over `symbol|tf|ts_event` (ISO UTC).
    pub signal_id: String,
    pub symbol: String,
    pub tf: String,
    /// Event time of the bar the signal was computed on, ISO8601 UTC.
    pub ts_event: String,
    /// Wall-clock emission time, ISO8601 UTC.
    pub ts_signal: String,
    pub side: Side,
    /// Take-profit probability in [0, 1].
    pub prob_tp: f64,
    pub entry: f64,
    pub sl: f64,
    pub tp: f64,
    pub model_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rationale: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn side_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Side::Long).unwrap(), "\"LONG\"");
        let s: Side = serde_json::from_str("\"NEUTRAL\"").unwrap();
        assert_eq!(s, Side::Neutral);
    }

    #[test]
    fn optional_sections_are_omitted() {
        let sig = Signal {
            schema_version: "2.0.0".into(),
            signal_id: "0123456789abcdef".into(),
            symbol: "BTCUSDT".into(),
            tf: "1h".into(),
            ts_event: "2024-01-01T00:00:00.000Z".into(),
            ts_signal: "2024-01-01T00:00:01.000Z".into(),
            side: Side::Long,
            prob_tp: 0.8,
            entry: 100.0,
            sl: 97.0,
            tp: 106.0,
            model_version: "linear-v1".into(),
            rationale: None,
            risk: None,
            extra: None,
        };
        let json = serde_json::to_string(&sig).unwrap();
        assert!(!json.contains("rationale"));
        assert!(!json.contains("extra"));
    }
}
