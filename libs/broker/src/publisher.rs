//! The publisher contract.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use types::partition_key_bytes;

/// Suffix appended to a primary topic to form its dead-letter sibling.
pub const DLT_SUFFIX: &str = ".DLT";

/// String headers attached to a message.
pub type Headers = Vec<(String, String)>;

/// Broker-facing errors. Cloneable so batch accounting can carry them.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BrokerError {
    #[error("publish to {topic} failed: {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("flush timed out after {0:?}")]
    FlushTimeout(Duration),

    #[error("broker is closed")]
    Closed,
}

/// Fields a stream message is keyed by. The broker key is the full SHA-256
/// digest of `symbol|tf`, holding partition affinity per stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFields {
    pub symbol: String,
    pub tf: Option<String>,
}

impl KeyFields {
    pub fn new(symbol: impl Into<String>, tf: Option<String>) -> Self {
        Self {
            symbol: symbol.into(),
            tf,
        }
    }

    pub fn to_key(&self) -> [u8; 32] {
        partition_key_bytes(&self.symbol, self.tf.as_deref())
    }
}

/// One message as stored/delivered by a broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub headers: Headers,
    /// Original event time, not the publish time.
    pub timestamp_ms: i64,
}

impl Record {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn value_json(&self) -> Option<Value> {
        serde_json::from_slice(&self.value).ok()
    }
}

/// Idempotent, keyed, timestamped publishing with DLT routing.
///
/// Implementations retry and batch internally with at-least-once delivery;
/// `produce_to_dlt` is best-effort and MUST NOT fail the primary path.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish with an explicit key.
    async fn publish_keyed(
        &self,
        topic: &str,
        key: &[u8],
        value: &Value,
        headers: &Headers,
        timestamp_ms: i64,
    ) -> Result<(), BrokerError>;

    /// Publish a stream message keyed by `symbol|tf`.
    async fn publish(
        &self,
        topic: &str,
        value: &Value,
        key_fields: &KeyFields,
        headers: &Headers,
        timestamp_ms: i64,
    ) -> Result<(), BrokerError> {
        self.publish_keyed(topic, &key_fields.to_key(), value, headers, timestamp_ms)
            .await
    }

    /// Quarantine raw bytes on the `.DLT` sibling of `topic`, tagging the
    /// reason. DLT failures are logged, never propagated.
    async fn produce_to_dlt(&self, topic: &str, raw: &[u8], reason: &str, headers: &Headers);

    /// Self-reported local send-queue depth; `-1` when unavailable.
    fn queue_len(&self) -> i64 {
        -1
    }

    /// Block until outstanding messages are delivered or `timeout` passes.
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}
