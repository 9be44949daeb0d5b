//! Historical replay from archived files.
//!
//! Rows are newline-delimited JSON, each either a full `event` object (or
//! JSON string) or the individual normalized-event columns. Replayed
//! messages keep the original `ts_event` as the broker timestamp, so
//! downstream windowing sees the historical clock.

use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;

use broker::{Headers, KeyFields, Publisher};
use serde_json::Value;
use types::NormalizedEvent;

use crate::error::{IngestError, Result};
use crate::metrics::{mark_replay_event, mark_replay_file, mark_replay_parse_error};
use crate::now_ms;

pub struct ReplayEngine {
    producer: Arc<dyn Publisher>,
    topic: String,
    source_name: String,
}

impl ReplayEngine {
    pub fn new(producer: Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        Self {
            producer,
            topic: topic.into(),
            source_name: "replay".to_string(),
        }
    }

    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = name.into();
        self
    }

    /// Reconstruct a normalized event from one archived row.
    fn row_to_event(&self, row: &Value) -> Result<NormalizedEvent> {
        // preferred layout: the whole event stored under `event`
        if let Some(stored) = row.get("event") {
            let value = match stored {
                Value::String(s) => serde_json::from_str(s)?,
                other => other.clone(),
            };
            return Ok(serde_json::from_value(value)?);
        }

        // column layout: payload may itself be a JSON string
        let mut columns = row.clone();
        if let Some(payload) = columns.get("payload") {
            if let Value::String(s) = payload {
                if let Ok(decoded) = serde_json::from_str::<Value>(s) {
                    columns["payload"] = decoded;
                }
            }
        }
        if columns.get("source").is_none() {
            columns["source"] = Value::String(self.source_name.clone());
        }
        if columns.get("v").is_none() {
            columns["v"] = Value::from(types::SCHEMA_VERSION);
        }
        Ok(serde_json::from_value(columns)?)
    }

    /// Read archived JSONL files in order and republish every event with
    /// its original timestamp. Returns the number of events emitted;
    /// unparseable rows are counted and skipped.
    pub async fn replay_files<P: AsRef<Path>>(&self, paths: &[P]) -> Result<usize> {
        let started = std::time::Instant::now();
        let mut count = 0usize;

        for path in paths {
            let path = path.as_ref();
            mark_replay_file();
            let file = std::fs::File::open(path).map_err(IngestError::Io)?;
            for line in std::io::BufReader::new(file).lines() {
                let line = line.map_err(IngestError::Io)?;
                if line.trim().is_empty() {
                    continue;
                }
                let event = serde_json::from_str::<Value>(&line)
                    .map_err(IngestError::from)
                    .and_then(|row| self.row_to_event(&row));
                let event = match event {
                    Ok(ev) => ev,
                    Err(err) => {
                        mark_replay_parse_error();
                        tracing::warn!(path = %path.display(), error = %err, "skipping unparseable row");
                        continue;
                    }
                };

                let ts = if event.ts_event > 0 {
                    event.ts_event
                } else {
                    now_ms()
                };
                let key_fields = KeyFields::new(event.symbol.clone(), event.tf.clone());
                let headers: Headers =
                    vec![("correlation_id".to_string(), event.correlation_id.clone())];
                let value = serde_json::to_value(&event).expect("event serializes");
                self.producer
                    .publish(&self.topic, &value, &key_fields, &headers, ts)
                    .await?;
                count += 1;
                mark_replay_event();
            }
        }

        self.producer
            .flush(std::time::Duration::from_secs(10))
            .await?;
        tracing::info!(
            topic = %self.topic,
            events = count,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replay complete"
        );
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::MemoryBroker;
    use std::io::Write;
    use types::{EventType, OhlcvPayload};

    fn archived_event(ts: i64) -> NormalizedEvent {
        NormalizedEvent::ohlcv(
            "binance",
            "BTCUSDT",
            "1m",
            ts,
            ts + 5,
            OhlcvPayload {
                o: 1.0,
                h: 2.0,
                l: 0.5,
                c: 1.5,
                v: 3.0,
            },
        )
    }

    #[tokio::test]
    async fn replays_event_column_and_flat_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.jsonl");
        let mut file = std::fs::File::create(&path).unwrap();

        let ev1 = archived_event(1_700_000_000_000);
        let ev2 = archived_event(1_700_000_060_000);
        // row 1: event as a nested JSON string, row 2: plain columns,
        // row 3: garbage that must be skipped
        writeln!(
            file,
            "{}",
            serde_json::json!({"event": serde_json::to_string(&ev1).unwrap()})
        )
        .unwrap();
        writeln!(file, "{}", serde_json::to_string(&ev2).unwrap()).unwrap();
        writeln!(file, "{{\"event\": 42}}").unwrap();

        let broker = Arc::new(MemoryBroker::new());
        let engine = ReplayEngine::new(broker.clone(), "events.replayed");
        let count = engine.replay_files(&[&path]).await.unwrap();

        assert_eq!(count, 2);
        let records = broker.records("events.replayed");
        assert_eq!(records.len(), 2);
        // original event time is preserved as the broker timestamp
        assert_eq!(records[0].timestamp_ms, 1_700_000_000_000);
        assert_eq!(records[1].timestamp_ms, 1_700_000_060_000);
        let replayed: NormalizedEvent =
            serde_json::from_slice(&records[0].value).unwrap();
        assert_eq!(replayed.event_type, EventType::Ohlcv);
        assert_eq!(replayed.correlation_id, ev1.correlation_id);
    }
}
