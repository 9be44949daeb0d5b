//! Fan-in, deduplication, validation, adaptive batching and publishing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use broker::{DeliveryReport, Headers, KeyFields, Publisher};
use schema::{dlt_reason, SchemaRegistry};
use types::NormalizedEvent;

use crate::dedup::DedupStore;
use crate::metrics::{
    mark_batch_flushed, mark_dlt, mark_drop, mark_duplicate, mark_msg, mark_produced,
    mark_validation_failed, observe_flush_duration, set_batch_size, set_lag, set_queue_len,
};
use crate::now_ms;
use crate::queue::EventQueue;

/// Batching and backpressure knobs. The defaults are the spec values.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Primary events topic; the DLT is its `.DLT` sibling.
    pub topic: String,
    /// Producer-queue hysteresis: shrink at/above HIGH, grow at/below LOW.
    pub high_watermark_queue: i64,
    pub low_watermark_queue: i64,
    pub min_batch: usize,
    pub max_batch: usize,
    /// Flush a non-empty batch after this long even if under-size.
    pub max_batch_latency_ms: u64,
    /// Internal fan-in queue bound.
    pub queue_capacity: usize,
    /// Queue poll timeout; bounds idle-time latency.
    pub poll_timeout_ms: u64,
    /// Producer flush deadline after each batch.
    pub flush_timeout: Duration,
    /// Producer flush deadline at shutdown.
    pub final_flush_timeout: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            topic: "events.v2".to_string(),
            high_watermark_queue: 50_000,
            low_watermark_queue: 5_000,
            min_batch: 50,
            max_batch: 5_000,
            max_batch_latency_ms: 800,
            queue_capacity: 100_000,
            poll_timeout_ms: 200,
            flush_timeout: Duration::from_millis(500),
            final_flush_timeout: Duration::from_secs(10),
        }
    }
}

/// Orchestrates all ingestion sources: dedup by correlation id, schema
/// validation with DLT routing, adaptive batch publishing, and cooperative
/// shutdown that drains the pending batch.
///
/// A single manager is the serial section of the pipeline, which is what
/// preserves per-(source, symbol, tf) ordering through to the broker.
pub struct IngestionManager {
    producer: Arc<dyn Publisher>,
    cfg: ManagerConfig,
    registry: SchemaRegistry,
    dedupe: DedupStore,
    queue: Arc<EventQueue>,
    sources: Vec<Arc<EventQueue>>,
    current_batch_size: usize,
    shutdown: Arc<AtomicBool>,
}

impl IngestionManager {
    pub fn new(producer: Arc<dyn Publisher>, cfg: ManagerConfig) -> Self {
        let queue = Arc::new(EventQueue::new(cfg.queue_capacity));
        let current_batch_size = cfg.min_batch;
        Self {
            producer,
            cfg,
            registry: SchemaRegistry::with_builtin(),
            dedupe: DedupStore::new(),
            queue,
            sources: Vec::new(),
            current_batch_size,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Register a source queue (one per WebSocket consumer).
    pub fn register_source(&mut self, source: Arc<EventQueue>) {
        self.sources.push(source);
    }

    /// Current adaptive batch size.
    pub fn batch_size(&self) -> usize {
        self.current_batch_size
    }

    /// Token that requests a cooperative shutdown when set.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Main loop: pump sources into the fan-in queue, then collect, dedupe,
    /// validate, batch, publish. Returns once shutdown is requested and the
    /// pending batch has drained.
    pub async fn run(&mut self) {
        let pumps: Vec<_> = self
            .sources
            .iter()
            .cloned()
            .map(|source| {
                let sink = self.queue.clone();
                let shutdown = self.shutdown.clone();
                tokio::spawn(async move {
                    while !shutdown.load(Ordering::SeqCst) {
                        if let Some(ev) = source.pop_timeout(Duration::from_millis(200)).await {
                            sink.push(ev);
                        }
                    }
                })
            })
            .collect();

        let poll_timeout = Duration::from_millis(self.cfg.poll_timeout_ms);
        let mut batch: Vec<NormalizedEvent> = Vec::with_capacity(self.cfg.max_batch);
        let mut batch_started_ms = now_ms();

        loop {
            let event = self.queue.pop_timeout(poll_timeout).await;
            let at_ms = now_ms();
            let idle = event.is_none();

            if let Some(event) = event {
                if let Some(event) = self.admit(event, at_ms).await {
                    batch.push(event);
                }
            } else if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let timed_out = at_ms - batch_started_ms >= self.cfg.max_batch_latency_ms as i64;
            let should_flush =
                batch.len() >= self.current_batch_size || (idle && !batch.is_empty() && timed_out);

            if should_flush && !batch.is_empty() {
                self.flush(&mut batch).await;
                batch_started_ms = at_ms;
            }
        }

        // drain whatever was collected before the shutdown request
        if !batch.is_empty() {
            self.flush(&mut batch).await;
        }
        let _ = self.producer.flush(self.cfg.final_flush_timeout).await;

        for pump in pumps {
            pump.abort();
        }
        tracing::info!(topic = %self.cfg.topic, "ingestion manager stopped");
    }

    /// Dedup + validate one event. Returns it when it should join the
    /// batch; duplicates are dropped, invalid events go to the DLT.
    async fn admit(&mut self, mut event: NormalizedEvent, at_ms: i64) -> Option<NormalizedEvent> {
        if self.dedupe.contains(&event.correlation_id) {
            mark_drop(&event.source, "duplicate_correlation_id");
            mark_duplicate();
            return None;
        }
        self.dedupe.add(&event.correlation_id);

        set_lag(&event.source, (at_ms - event.ts_event).max(0) as f64);

        if event.ingest_ts <= 0 {
            event.ingest_ts = at_ms;
        }

        let wire = serde_json::to_value(&event).expect("event serializes");
        if let Err(err) = self.registry.validate("ingest", "2", &wire) {
            mark_validation_failed();
            mark_drop(&event.source, "schema_invalid");
            tracing::debug!(
                source = %event.source,
                symbol = %event.symbol,
                error = %err,
                "event failed validation, dead-lettering"
            );
            let raw = serde_json::to_vec(&wire).expect("event serializes");
            let headers: Headers =
                vec![("correlation_id".to_string(), event.correlation_id.clone())];
            self.producer
                .produce_to_dlt(&self.cfg.topic, &raw, dlt_reason::SCHEMA_INVALID, &headers)
                .await;
            mark_dlt();
            return None;
        }

        mark_msg(&event.source, &event.event_type.to_string());
        Some(event)
    }

    /// Publish every batched item, route produce failures to the DLT, then
    /// adapt the batch size from the producer's self-reported queue depth.
    async fn flush(&mut self, batch: &mut Vec<NormalizedEvent>) {
        let flush_started = std::time::Instant::now();
        let mut report = DeliveryReport::new();

        for item in batch.iter() {
            let key_fields = KeyFields::new(item.symbol.clone(), item.tf.clone());
            let headers: Headers =
                vec![("correlation_id".to_string(), item.correlation_id.clone())];
            let value = serde_json::to_value(item).expect("event serializes");
            match self
                .producer
                .publish(&self.cfg.topic, &value, &key_fields, &headers, item.ts_event)
                .await
            {
                Ok(()) => {
                    mark_produced();
                    report.record_published();
                }
                Err(err) => {
                    mark_drop(&item.source, "produce_failed");
                    tracing::warn!(symbol = %item.symbol, error = %err, "produce failed, dead-lettering");
                    let raw = serde_json::to_vec(&value).expect("event serializes");
                    self.producer
                        .produce_to_dlt(&self.cfg.topic, &raw, dlt_reason::PRODUCE_FAILED, &headers)
                        .await;
                    mark_dlt();
                    report.record_dead_letter(
                        item.correlation_id.clone(),
                        dlt_reason::PRODUCE_FAILED,
                        err,
                    );
                }
            }
        }

        let _ = self.producer.flush(self.cfg.flush_timeout).await;
        batch.clear();

        observe_flush_duration(flush_started.elapsed().as_secs_f64());
        mark_batch_flushed();
        if report.is_split() {
            tracing::warn!(
                published = report.published(),
                dead_lettered = report.dead_letters().len(),
                "batch split between primary topic and DLT"
            );
        }

        let qlen = self.producer.queue_len();
        set_queue_len(qlen);
        self.adjust_batch_size(qlen);
    }

    /// Hysteresis rule: halve at/above HIGH, grow 1.5x at/below LOW, hold
    /// when the depth is unknown (negative).
    fn adjust_batch_size(&mut self, qlen: i64) {
        if qlen < 0 {
            return;
        }
        if qlen >= self.cfg.high_watermark_queue {
            self.current_batch_size = (self.current_batch_size / 2).max(self.cfg.min_batch);
        } else if qlen <= self.cfg.low_watermark_queue {
            let grown = (self.current_batch_size as f64 * 1.5).ceil() as usize;
            self.current_batch_size = grown.min(self.cfg.max_batch);
        }
        set_batch_size(self.current_batch_size);
    }

    /// Enqueue directly into the fan-in queue (used by tests and replay
    /// glue).
    pub fn ingest_queue(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::MemoryBroker;
    use types::OhlcvPayload;

    fn event(symbol: &str, ts: i64, candle: OhlcvPayload) -> NormalizedEvent {
        NormalizedEvent::ohlcv("binance", symbol, "1m", ts, ts + 10, candle)
    }

    fn good_candle() -> OhlcvPayload {
        OhlcvPayload {
            o: 1.0,
            h: 2.0,
            l: 0.5,
            c: 1.5,
            v: 3.0,
        }
    }

    fn manager_with(broker: Arc<MemoryBroker>, cfg: ManagerConfig) -> IngestionManager {
        IngestionManager::new(broker, cfg)
    }

    async fn run_until_drained(manager: &mut IngestionManager, events: Vec<NormalizedEvent>) {
        let queue = manager.ingest_queue();
        for ev in events {
            queue.push(ev);
        }
        let shutdown = manager.shutdown_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(400)).await;
            shutdown.store(true, Ordering::SeqCst);
        });
        manager.run().await;
    }

    #[tokio::test]
    async fn duplicate_events_are_suppressed() {
        let broker = Arc::new(MemoryBroker::new());
        let mut manager = manager_with(broker.clone(), ManagerConfig::default());
        let ev = event("BTCUSDT", 1_700_000_000_000, good_candle());
        run_until_drained(&mut manager, vec![ev.clone(), ev.clone()]).await;

        let records = broker.records("events.v2");
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].header("correlation_id"),
            Some(ev.correlation_id.as_str())
        );
        assert_eq!(records[0].timestamp_ms, 1_700_000_000_000);
        assert!(broker.is_empty("events.v2.DLT"));
    }

    #[tokio::test]
    async fn invalid_schema_routes_to_dlt() {
        let broker = Arc::new(MemoryBroker::new());
        let mut manager = manager_with(broker.clone(), ManagerConfig::default());
        // low above high violates the OHLCV ordering invariant
        let bad = event(
            "BTCUSDT",
            1_700_000_000_000,
            OhlcvPayload {
                o: 1.0,
                h: 1.0,
                l: 2.0,
                c: 1.0,
                v: 0.0,
            },
        );
        run_until_drained(&mut manager, vec![bad]).await;

        assert!(broker.is_empty("events.v2"));
        let dead = broker.records("events.v2.DLT");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].header("dlt_reason"), Some("schema_invalid"));
    }

    #[tokio::test]
    async fn produce_failure_routes_single_item_to_dlt() {
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_next("events.v2", 1);
        let mut manager = manager_with(broker.clone(), ManagerConfig::default());
        let first = event("BTCUSDT", 1_700_000_000_000, good_candle());
        let second = event("ETHUSDT", 1_700_000_060_000, good_candle());
        run_until_drained(&mut manager, vec![first, second]).await;

        assert_eq!(broker.len("events.v2"), 1);
        let dead = broker.records("events.v2.DLT");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].header("dlt_reason"), Some("produce_failed"));
    }

    #[tokio::test]
    async fn batch_size_halves_under_backpressure_and_respects_min() {
        let broker = Arc::new(MemoryBroker::new());
        let cfg = ManagerConfig {
            min_batch: 10,
            ..ManagerConfig::default()
        };
        let mut manager = manager_with(broker.clone(), cfg);
        manager.current_batch_size = 50;

        broker.set_reported_queue_len(60_000);
        manager.adjust_batch_size(broker.queue_len());
        assert_eq!(manager.batch_size(), 25);
        manager.adjust_batch_size(broker.queue_len());
        assert_eq!(manager.batch_size(), 12);
        // two more flushes floor at min_batch
        manager.adjust_batch_size(broker.queue_len());
        manager.adjust_batch_size(broker.queue_len());
        assert_eq!(manager.batch_size(), 10);
    }

    #[tokio::test]
    async fn batch_size_grows_when_queue_subsides_and_holds_when_unknown() {
        let broker = Arc::new(MemoryBroker::new());
        let mut manager = manager_with(broker.clone(), ManagerConfig::default());
        assert_eq!(manager.batch_size(), 50);

        manager.adjust_batch_size(1_000);
        assert_eq!(manager.batch_size(), 75);

        // unknown depth keeps the current size
        manager.adjust_batch_size(-1);
        assert_eq!(manager.batch_size(), 75);

        // between watermarks: no change either
        manager.adjust_batch_size(20_000);
        assert_eq!(manager.batch_size(), 75);

        // growth saturates at max_batch
        for _ in 0..20 {
            manager.adjust_batch_size(0);
        }
        assert_eq!(manager.batch_size(), 5_000);
    }

    #[tokio::test]
    async fn idle_timeout_flushes_partial_batch() {
        let broker = Arc::new(MemoryBroker::new());
        let cfg = ManagerConfig {
            max_batch_latency_ms: 100,
            ..ManagerConfig::default()
        };
        let mut manager = manager_with(broker.clone(), cfg);
        // one event, far below the batch size of 50
        run_until_drained(
            &mut manager,
            vec![event("BTCUSDT", 1_700_000_000_000, good_candle())],
        )
        .await;
        assert_eq!(broker.len("events.v2"), 1);
    }
}
