//! # Tidemark Signals Service
//!
//! The compute half of the pipeline: consume normalized events from the
//! broker, maintain per-(symbol, tf) window state, compute indicator
//! features, fuse rule and model scores, gate through risk limits and emit
//! v2 signals.
//!
//! - [`state`] — sliding/tumbling window buffers plus offset tracking and
//!   a read-through feature cache behind a key-value capability trait
//! - [`features`] — canonicalization, indicators, quality control and
//!   per-row content hashes
//! - [`rules`] / [`model`] / [`scorer`] — bounded rule score, TP
//!   probability, and their fusion into direction + confidence
//! - [`risk`] — kill-switch, drawdown cap and per-asset exposure limits
//! - [`emitter`] — signal assembly with ATR-based SL/TP and broker-or-file
//!   publishing
//! - [`worker`] — the single-consumer-per-partition loop tying it together

pub mod bar;
pub mod emitter;
pub mod error;
pub mod features;
pub mod model;
pub mod rationale;
pub mod risk;
pub mod rules;
pub mod scorer;
pub mod state;
pub mod worker;

pub use bar::Bar;
pub use emitter::{PublishOutcome, SignalEmitter, Sink};
pub use error::{Result, SignalError};
pub use features::{FeatureEngine, FeatureEngineConfig};
pub use model::{Calibrator, LinearModel, ModelRunner, ProbabilityPredictor};
pub use rationale::{Rationale, RationaleMapper};
pub use risk::{RiskController, RiskDecision};
pub use scorer::{final_score, FinalScore};
pub use state::{FeatureCache, KvStore, MemoryKvStore, OffsetTracker, StateManager, WindowMode};
pub use worker::{SignalWorker, WorkerConfig};
