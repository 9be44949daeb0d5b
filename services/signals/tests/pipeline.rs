//! End-to-end pipeline test: raw kline events through the ingestion
//! manager to the broker, then through the signal worker to the signals
//! topic.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use broker::MemoryBroker;
use config::Settings;
use ingest::{IngestionManager, ManagerConfig};
use signals::{ModelRunner, SignalWorker, WorkerConfig};
use types::{sha256_hex, NormalizedEvent, OhlcvPayload, Signal};

fn kline(i: i64) -> NormalizedEvent {
    let base = 100.0 + (i as f64 * 0.25).sin() * 2.0 + i as f64 * 0.05;
    NormalizedEvent::ohlcv(
        "binance",
        "BTCUSDT",
        "1m",
        1_700_000_000_000 + i * 60_000,
        1_700_000_000_000 + i * 60_000 + 7,
        OhlcvPayload {
            o: base,
            h: base + 1.0,
            l: base - 1.0,
            c: base + 0.1,
            v: 3.0 + (i % 5) as f64,
        },
    )
}

fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.signals.producer_out_dir = std::env::temp_dir()
        .join("tidemark-pipeline-test")
        .display()
        .to_string();
    settings
}

#[tokio::test]
async fn events_flow_from_ingestion_to_signals() {
    let broker = Arc::new(MemoryBroker::new());
    let events_rx = broker.subscribe("events.v2");

    // ingestion: 80 bars, a duplicate of bar 10, and one invalid candle
    let mut manager = IngestionManager::new(broker.clone(), ManagerConfig::default());
    let queue = manager.ingest_queue();
    for i in 0..80 {
        queue.push(kline(i));
    }
    queue.push(kline(10)); // duplicate correlation id
    let mut broken = kline(80);
    broken.payload = serde_json::json!({"o": 1.0, "h": 1.0, "l": 2.0, "c": 1.0, "v": 0.0});
    queue.push(broken);

    let shutdown = manager.shutdown_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(600)).await;
        shutdown.store(true, Ordering::SeqCst);
    });
    manager.run().await;

    // duplicate suppressed, invalid candle dead-lettered
    assert_eq!(broker.len("events.v2"), 80);
    let dead = broker.records("events.v2.DLT");
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].header("dlt_reason"), Some("schema_invalid"));

    // every published event carries its correlation id and event time
    let ev10 = kline(10);
    let expected_cid = sha256_hex(b"BTCUSDT|ohlcv|1700000600000");
    assert_eq!(ev10.correlation_id, expected_cid);
    let records = broker.records("events.v2");
    assert_eq!(records[10].header("correlation_id"), Some(expected_cid.as_str()));
    assert_eq!(records[10].timestamp_ms, ev10.ts_event);

    // worker: consume the published events and emit signals
    let settings = test_settings();
    let mut worker = SignalWorker::new(
        broker.clone(),
        &settings,
        ModelRunner::constant(0.9),
        WorkerConfig::default(),
    );
    worker.risk_mut().update_equity(100_000.0, 1_700_000_000_000);

    let mut worker_rx = events_rx;
    let mut emitted = 0usize;
    while let Ok(record) = worker_rx.try_recv() {
        if worker.process_record(&record).await.unwrap().is_some() {
            emitted += 1;
        }
    }
    assert!(emitted > 0, "warm indicators should emit signals");

    let signals = broker.records("signals.v2");
    assert_eq!(signals.len(), emitted);
    let last: Signal = serde_json::from_slice(&signals.last().unwrap().value).unwrap();
    assert_eq!(last.symbol, "BTCUSDT");
    assert_eq!(last.tf, "1m");
    // publish key equals the signal id
    assert_eq!(signals.last().unwrap().key, last.signal_id.as_bytes());
    assert!((0.0..=1.0).contains(&last.prob_tp));
    assert!(last.sl <= last.entry || last.side == types::Side::Short);
}
