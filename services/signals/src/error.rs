//! Error types for the signals service.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SignalError>;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("duplicate feature column after namespacing: {0}")]
    DuplicateColumn(String),

    #[error("missing required column: {0}")]
    MissingColumn(&'static str),

    #[error("invalid indicator params for {name}: {detail}")]
    InvalidParams { name: String, detail: String },

    #[error("non-finite close price; cannot compute SL/TP")]
    NonFiniteClose,

    #[error("invalid event timestamp")]
    InvalidTimestamp,

    #[error("unconfigured stream: {0}")]
    UnconfiguredStream(String),

    #[error("model artifact error: {0}")]
    Model(String),

    #[error("schema validation failed: {0}")]
    Schema(#[from] schema::ValidationError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("broker error: {0}")]
    Broker(#[from] broker::BrokerError),
}
