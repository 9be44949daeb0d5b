//! In-process broker used by tests and single-node deployments.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::publisher::{BrokerError, Headers, Publisher, Record, DLT_SUFFIX};

/// Topic-keyed in-memory log with live subscriptions.
///
/// Delivery is immediate, so the real queue depth is always zero; the
/// reported depth defaults to `-1` (unknown) and can be pinned by tests to
/// drive the ingestion manager's backpressure adaptation.
pub struct MemoryBroker {
    topics: DashMap<String, Vec<Record>>,
    subscribers: DashMap<String, Vec<mpsc::UnboundedSender<Record>>>,
    /// Remaining publish attempts to fail, per topic.
    fail_injections: Mutex<std::collections::HashMap<String, usize>>,
    reported_queue_len: AtomicI64,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
            subscribers: DashMap::new(),
            fail_injections: Mutex::new(std::collections::HashMap::new()),
            reported_queue_len: AtomicI64::new(-1),
        }
    }

    /// All records published to `topic` so far.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        self.topics
            .get(topic)
            .map(|r| r.value().clone())
            .unwrap_or_default()
    }

    pub fn len(&self, topic: &str) -> usize {
        self.topics.get(topic).map(|r| r.value().len()).unwrap_or(0)
    }

    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }

    /// Subscribe to future records on `topic`.
    pub fn subscribe(&self, topic: &str) -> mpsc::UnboundedReceiver<Record> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .entry(topic.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Make the next `count` publishes to `topic` fail.
    pub fn fail_next(&self, topic: &str, count: usize) {
        self.fail_injections
            .lock()
            .insert(topic.to_string(), count);
    }

    /// Pin the queue depth this broker reports through
    /// [`Publisher::queue_len`].
    pub fn set_reported_queue_len(&self, len: i64) {
        self.reported_queue_len.store(len, Ordering::Relaxed);
    }

    fn take_injected_failure(&self, topic: &str) -> bool {
        let mut injections = self.fail_injections.lock();
        match injections.get_mut(topic) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }

    fn append(&self, topic: &str, record: Record) {
        if let Some(mut subs) = self.subscribers.get_mut(topic) {
            subs.retain(|tx| tx.send(record.clone()).is_ok());
        }
        self.topics
            .entry(topic.to_string())
            .or_default()
            .push(record);
    }
}

#[async_trait]
impl Publisher for MemoryBroker {
    async fn publish_keyed(
        &self,
        topic: &str,
        key: &[u8],
        value: &Value,
        headers: &Headers,
        timestamp_ms: i64,
    ) -> Result<(), BrokerError> {
        if self.take_injected_failure(topic) {
            counter!("broker_publish_total", "topic" => topic.to_string(), "result" => "fail")
                .increment(1);
            return Err(BrokerError::PublishFailed {
                topic: topic.to_string(),
                reason: "injected failure".to_string(),
            });
        }

        let record = Record {
            key: key.to_vec(),
            value: serde_json::to_vec(value).expect("JSON value serializes"),
            headers: headers.clone(),
            timestamp_ms,
        };
        self.append(topic, record);
        counter!("broker_publish_total", "topic" => topic.to_string(), "result" => "ok")
            .increment(1);
        Ok(())
    }

    async fn produce_to_dlt(&self, topic: &str, raw: &[u8], reason: &str, headers: &Headers) {
        let dlt_topic = format!("{topic}{DLT_SUFFIX}");
        let mut hdrs: Headers = vec![("dlt_reason".to_string(), reason.to_string())];
        hdrs.extend(headers.iter().cloned());

        // the DLT path must never fail the primary path
        if self.take_injected_failure(&dlt_topic) {
            warn!(topic = %dlt_topic, reason, "dead-letter write failed, dropping");
            counter!("broker_dlt_failed_total", "topic" => dlt_topic).increment(1);
            return;
        }

        debug!(topic = %dlt_topic, reason, bytes = raw.len(), "dead-lettered message");
        self.append(
            &dlt_topic,
            Record {
                key: Vec::new(),
                value: raw.to_vec(),
                headers: hdrs,
                timestamp_ms: 0,
            },
        );
        counter!("broker_dlt_total", "reason" => reason.to_string()).increment(1);
    }

    fn queue_len(&self) -> i64 {
        self.reported_queue_len.load(Ordering::Relaxed)
    }

    async fn flush(&self, _timeout: Duration) -> Result<(), BrokerError> {
        // in-memory delivery is synchronous; nothing outstanding
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::KeyFields;
    use serde_json::json;

    #[tokio::test]
    async fn publish_appends_and_notifies_subscribers() {
        let broker = MemoryBroker::new();
        let mut rx = broker.subscribe("events.v2");

        let kf = KeyFields::new("BTCUSDT", Some("1m".into()));
        broker
            .publish(
                "events.v2",
                &json!({"x": 1}),
                &kf,
                &vec![("correlation_id".into(), "abc".into())],
                1_700_000_000_000,
            )
            .await
            .unwrap();

        assert_eq!(broker.len("events.v2"), 1);
        let delivered = rx.recv().await.unwrap();
        assert_eq!(delivered.timestamp_ms, 1_700_000_000_000);
        assert_eq!(delivered.header("correlation_id"), Some("abc"));
        assert_eq!(delivered.key, kf.to_key());
    }

    #[tokio::test]
    async fn injected_failures_surface_then_clear() {
        let broker = MemoryBroker::new();
        broker.fail_next("events.v2", 1);
        let kf = KeyFields::new("BTCUSDT", None);

        let err = broker
            .publish("events.v2", &json!({}), &kf, &Vec::new(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::PublishFailed { .. }));

        broker
            .publish("events.v2", &json!({}), &kf, &Vec::new(), 0)
            .await
            .unwrap();
        assert_eq!(broker.len("events.v2"), 1);
    }

    #[tokio::test]
    async fn dlt_records_reason_header() {
        let broker = MemoryBroker::new();
        broker
            .produce_to_dlt(
                "events.v2",
                b"raw-bytes",
                "schema_invalid",
                &vec![("correlation_id".into(), "beef".into())],
            )
            .await;

        let dead = broker.records("events.v2.DLT");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].header("dlt_reason"), Some("schema_invalid"));
        assert_eq!(dead[0].header("correlation_id"), Some("beef"));
        assert_eq!(dead[0].value, b"raw-bytes");
    }

    #[test]
    fn queue_len_defaults_to_unknown() {
        let broker = MemoryBroker::new();
        assert_eq!(broker.queue_len(), -1);
        broker.set_reported_queue_len(60_000);
        assert_eq!(broker.queue_len(), 60_000);
    }
}
