//! # Tidemark Lake
//!
//! Partitioned archive for normalized events and feature rows:
//!
//! - deterministic partition keys derived from candle-aligned event time
//! - content-hashed, idempotent data files (`part-<hash16>-<rand8>.<ext>`)
//! - per-partition `_manifest.json` bookkeeping
//! - compaction and retention planning over hot/warm/cold/delete tiers
//!
//! The storage backend and record encoder are capability traits: the crate
//! ships a local-filesystem backend (temp file + atomic rename) and a
//! canonical-JSONL encoder; an object store or Parquet encoder slot behind
//! the same seams. On backends without rename, idempotence holds through
//! the content-hashed file name alone.

pub mod backend;
pub mod encode;
pub mod error;
pub mod manager;
pub mod partition;
pub mod retention;

pub use backend::{LocalFs, StorageBackend};
pub use encode::{canonical_json, JsonlEncoder, RecordEncoder};
pub use error::{LakeError, Result};
pub use manager::{PartitionManager, WriteResult};
pub use partition::{PartitionKey, PartitionPolicy};
pub use retention::{CompactionPlan, RetentionAction, RetentionPolicy, Tier};
