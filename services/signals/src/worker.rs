//! The events-to-signals worker loop.
//!
//! One worker instance owns one broker partition cursor: records arrive in
//! order per (symbol, tf), flow through window state, feature computation,
//! rule+model scoring and risk gating, and leave as published signals. A
//! failing row is skipped and counted; it never stops the loop.

use std::sync::Arc;

use broker::{Headers, Publisher, Record};
use config::Settings;
use metrics::counter;
use schema::dlt_reason;
use tokio::sync::mpsc;
use types::{NormalizedEvent, Side, Signal};

use crate::bar::Bar;
use crate::emitter::SignalEmitter;
use crate::error::Result;
use crate::features::{FeatureEngine, FeatureEngineConfig};
use crate::model::ModelRunner;
use crate::rationale::{RationaleConfig, RationaleMapper};
use crate::risk::RiskController;
use crate::rules::rule_score_row;
use crate::scorer::fuse;
use crate::state::{FeatureCache, KvStore, MemoryKvStore, OffsetTracker, StateManager, WindowMode};

/// Worker knobs not covered by the service settings.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Window length per (symbol, tf) stream.
    pub window: usize,
    pub mode: WindowMode,
    pub slide: usize,
    /// Desired notional per order handed to the risk gate.
    pub order_notional: f64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            window: 64,
            mode: WindowMode::Sliding,
            slide: 1,
            order_notional: 1_000.0,
        }
    }
}

pub struct SignalWorker {
    publisher: Arc<dyn Publisher>,
    events_topic: String,
    state: StateManager,
    engine: FeatureEngine,
    model: ModelRunner,
    risk: RiskController,
    emitter: SignalEmitter,
    rationale: RationaleMapper,
    offsets: OffsetTracker,
    cache: FeatureCache,
    cfg: WorkerConfig,
}

impl SignalWorker {
    pub fn new(
        publisher: Arc<dyn Publisher>,
        settings: &Settings,
        model: ModelRunner,
        cfg: WorkerConfig,
    ) -> Self {
        let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
        Self {
            events_topic: settings.ingestion.topic.clone(),
            state: StateManager::new(),
            engine: FeatureEngine::new(FeatureEngineConfig::from(&settings.features)),
            model,
            risk: RiskController::new(settings.risk.clone()),
            emitter: SignalEmitter::new(publisher.clone(), settings.signals.clone()),
            rationale: RationaleMapper::new(RationaleConfig::default()),
            offsets: OffsetTracker::new(kv.clone()),
            cache: FeatureCache::new(kv),
            publisher,
            cfg,
        }
    }

    pub fn risk_mut(&mut self) -> &mut RiskController {
        &mut self.risk
    }

    pub fn offsets(&self) -> &OffsetTracker {
        &self.offsets
    }

    /// Consume records until the subscription closes; returns the number
    /// of signals emitted.
    pub async fn run(&mut self, mut records: mpsc::UnboundedReceiver<Record>) -> usize {
        let mut emitted = 0usize;
        while let Some(record) = records.recv().await {
            match self.process_record(&record).await {
                Ok(Some(_)) => emitted += 1,
                Ok(None) => {}
                Err(err) => {
                    counter!("signals_worker_errors_total").increment(1);
                    tracing::warn!(error = %err, "row skipped");
                }
            }
        }
        tracing::info!(emitted, "signal worker stopped");
        emitted
    }

    /// Decode one broker record and process it. Undecodable payloads go to
    /// the events DLT with `json_decode_error`.
    pub async fn process_record(&mut self, record: &Record) -> Result<Option<Signal>> {
        let event: NormalizedEvent = match serde_json::from_slice(&record.value) {
            Ok(ev) => ev,
            Err(err) => {
                counter!("signals_worker_decode_errors_total").increment(1);
                tracing::warn!(error = %err, "undecodable event, dead-lettering");
                let headers: Headers = record
                    .header("correlation_id")
                    .map(|cid| vec![("correlation_id".to_string(), cid.to_string())])
                    .unwrap_or_default();
                self.publisher
                    .produce_to_dlt(
                        &self.events_topic,
                        &record.value,
                        dlt_reason::JSON_DECODE_ERROR,
                        &headers,
                    )
                    .await;
                return Ok(None);
            }
        };
        self.process_event(&event).await
    }

    /// Advance window state with one event; emit when a window closes.
    pub async fn process_event(&mut self, event: &NormalizedEvent) -> Result<Option<Signal>> {
        let Some(bar) = Bar::from_event(event) else {
            return Ok(None);
        };
        if !self.state.is_configured(&bar.symbol, &bar.tf) {
            self.state.configure_stream(
                &bar.symbol,
                &bar.tf,
                self.cfg.window,
                self.cfg.mode,
                self.cfg.slide,
            );
        }
        let Some(frame) = self.state.update(bar)? else {
            return Ok(None);
        };

        let rows = self.engine.compute(&frame)?;
        let Some(row) = rows.last() else {
            return Ok(None);
        };

        let Some(rule) = rule_score_row(row) else {
            // warm-up rows without finite rule inputs are expected
            counter!("signals_worker_rows_skipped_total", "reason" => "rule_inputs")
                .increment(1);
            return Ok(None);
        };
        let prob_tp = self.model.predict_proba(std::slice::from_ref(row))[0];
        let fused = fuse(rule, prob_tp);

        let risk_payload = if fused.side != Side::Neutral {
            let decision =
                self.risk
                    .evaluate_order(&row.symbol, self.cfg.order_notional, row.ts_event);
            Some(serde_json::json!({
                "approved": decision.approved,
                "reason": decision.reason,
                "allowed_notional": decision.allowed_notional,
            }))
        } else {
            None
        };

        let rationale = serde_json::to_value(self.rationale.explain_row(row))?;
        let extra = serde_json::json!({
            "score": fused.score,
            "confidence": fused.confidence,
            "rule_score": rule,
            "feature_hash": row.feature_hash,
        });

        let (signal, _outcome) = self
            .emitter
            .emit(
                row,
                prob_tp,
                fused.side,
                self.model.version(),
                Some(rationale),
                risk_payload,
                Some(extra),
            )
            .await?;

        let stream = format!("{}:{}", row.symbol, row.tf);
        self.offsets.commit(&stream, row.ts_event);
        self.cache
            .put(&row.symbol, &row.tf, &serde_json::to_value(row)?);

        Ok(Some(signal))
    }
}
