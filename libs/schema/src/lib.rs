//! # Tidemark Schema Validation
//!
//! In-memory registry of versioned message schemas with structural
//! validation: required keys, value types, and domain constraints (allowed
//! timeframes, OHLCV price ordering). The registry is an explicit object
//! passed to whoever validates, never process-global state.
//!
//! Three schemas ship registered out of the box:
//!
//! | name | version | shape |
//! |------|---------|-------|
//! | `ingest` | `2` | [`types::NormalizedEvent`] wire form |
//! | `features` | `2` | per-row feature payload |
//! | `signal` | `2` | [`types::Signal`] wire form |

pub mod registry;
pub mod validators;

pub use registry::{FieldSpec, FieldType, SchemaDef, SchemaRegistry};
pub use validators::ValidationError;

/// Reasons attached to dead-lettered messages.
pub mod dlt_reason {
    pub const SCHEMA_INVALID: &str = "schema_invalid";
    pub const PRODUCE_FAILED: &str = "produce_failed";
    pub const JSON_DECODE_ERROR: &str = "json_decode_error";
}
