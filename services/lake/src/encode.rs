//! Record encoding behind a capability trait.
//!
//! The shipped encoder writes canonical JSONL; a columnar encoder (e.g.
//! Parquet) implements the same trait without touching the write path. The
//! content hash is always taken over the canonical JSON of the batch so a
//! batch hashes identically regardless of the on-disk format.

use serde_json::Value;
use types::sha256_hex;

use crate::error::Result;

/// Serialize a batch of JSON records to bytes.
pub trait RecordEncoder: Send + Sync {
    /// File extension for the produced format, e.g. `jsonl`.
    fn ext(&self) -> &'static str;

    fn encode(&self, records: &[Value]) -> Result<Vec<u8>>;
}

/// Newline-delimited canonical JSON.
pub struct JsonlEncoder;

impl RecordEncoder for JsonlEncoder {
    fn ext(&self) -> &'static str {
        "jsonl"
    }

    fn encode(&self, records: &[Value]) -> Result<Vec<u8>> {
        let mut out = String::new();
        for record in records {
            out.push_str(&canonical_json(record));
            out.push('\n');
        }
        Ok(out.into_bytes())
    }
}

/// Stable, canonicalized JSON: object keys sorted recursively, compact
/// separators. Hashing this representation is stable across processes.
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: std::collections::BTreeMap<String, Value> =
                    map.iter().map(|(k, v)| (k.clone(), sort(v))).collect();
                serde_json::to_value(sorted).expect("sorted map serializes")
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone(),
        }
    }
    sort(value).to_string()
}

/// Content hash of a record batch: SHA-256 over the canonical JSON array.
pub fn payload_hash(records: &[Value]) -> String {
    let array = Value::Array(records.to_vec());
    sha256_hex(canonical_json(&array).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_keys_recursively() {
        let v = json!({"b": 1, "a": {"z": 1, "y": [ {"k": 2, "j": 1} ]}});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":{"y":[{"j":1,"k":2}],"z":1},"b":1}"#
        );
    }

    #[test]
    fn payload_hash_ignores_key_order() {
        let a = vec![json!({"x": 1, "y": 2})];
        let b = vec![json!({"y": 2, "x": 1})];
        assert_eq!(payload_hash(&a), payload_hash(&b));
        let c = vec![json!({"x": 1, "y": 3})];
        assert_ne!(payload_hash(&a), payload_hash(&c));
    }

    #[test]
    fn jsonl_is_one_record_per_line() {
        let records = vec![json!({"a": 1}), json!({"b": 2})];
        let bytes = JsonlEncoder.encode(&records).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "{\"a\":1}\n{\"b\":2}\n");
    }
}
