//! Ingestion metric helpers over the `metrics` facade.
//!
//! The libraries only emit; binaries decide whether an exporter is
//! installed. Without one, every call is a no-op.

use metrics::{counter, gauge, histogram};

pub fn mark_msg(source: &str, event_type: &str) {
    counter!(
        "ing_msgs_total",
        "source" => source.to_string(),
        "event_type" => event_type.to_string()
    )
    .increment(1);
}

pub fn mark_drop(source: &str, reason: &'static str) {
    counter!(
        "ing_drops_total",
        "source" => source.to_string(),
        "reason" => reason
    )
    .increment(1);
}

pub fn set_lag(source: &str, lag_millis: f64) {
    gauge!("ing_lag_ms", "source" => source.to_string()).set(lag_millis);
}

pub fn set_queue_len(n: i64) {
    gauge!("ing_producer_queue_len").set(n as f64);
}

pub fn set_batch_size(n: usize) {
    gauge!("ing_batch_size").set(n as f64);
}

pub fn observe_flush_duration(seconds: f64) {
    histogram!("ing_batch_flush_duration_seconds").record(seconds);
}

pub fn mark_batch_flushed() {
    counter!("ing_batches_total").increment(1);
}

pub fn mark_produced() {
    counter!("ing_produced_total").increment(1);
}

pub fn mark_dlt() {
    counter!("ing_dlt_total").increment(1);
}

pub fn mark_duplicate() {
    counter!("ing_duplicates_total").increment(1);
}

pub fn mark_validation_failed() {
    counter!("ing_validation_failed_total").increment(1);
}

pub fn mark_ws_connect(source: &str) {
    counter!("ws_connects_total", "source" => source.to_string()).increment(1);
}

pub fn mark_ws_reconnect(source: &str) {
    counter!("ws_reconnects_total", "source" => source.to_string()).increment(1);
}

pub fn mark_ws_error(source: &str) {
    counter!("ws_errors_total", "source" => source.to_string()).increment(1);
}

pub fn mark_ws_msg(source: &str) {
    counter!("ws_msgs_total", "source" => source.to_string()).increment(1);
}

pub fn mark_ws_overflow_drop(source: &str) {
    counter!("ws_queue_dropped_total", "source" => source.to_string()).increment(1);
}

pub fn observe_connect_duration(seconds: f64) {
    histogram!("ws_connect_duration_seconds").record(seconds);
}

pub fn mark_replay_event() {
    counter!("replay_events_total").increment(1);
}

pub fn mark_replay_file() {
    counter!("replay_files_total").increment(1);
}

pub fn mark_replay_parse_error() {
    counter!("replay_parse_errors_total").increment(1);
}
