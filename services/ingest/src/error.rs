//! Error types for the ingestion service.

use thiserror::Error;

/// Result alias for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Main error type for ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("connection failed for venue {venue}: {reason}")]
    ConnectionFailed { venue: String, reason: String },

    #[error("connection timeout for venue {venue} after {timeout_ms}ms")]
    ConnectionTimeout { venue: String, timeout_ms: u64 },

    #[error("connection closed for venue {venue}: {reason:?}")]
    ConnectionClosed {
        venue: String,
        reason: Option<String>,
    },

    #[error("certificate pin mismatch for venue {venue}")]
    PinMismatch { venue: String },

    #[error("maximum reconnection attempts ({max_attempts}) exceeded for venue {venue}")]
    MaxReconnectAttemptsExceeded { venue: String, max_attempts: u32 },

    #[error("parse error for venue {venue}: {detail}")]
    Parse { venue: String, detail: String },

    #[error("unknown venue: {0}")]
    UnknownVenue(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("broker error: {0}")]
    Broker(#[from] broker::BrokerError),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("TLS error: {0}")]
    Tls(String),
}

impl IngestError {
    /// Recoverable errors are retried with backoff; the rest abort the
    /// consumer.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            IngestError::ConnectionFailed { .. }
                | IngestError::ConnectionTimeout { .. }
                | IngestError::ConnectionClosed { .. }
                | IngestError::PinMismatch { .. }
                | IngestError::WebSocket(_)
                | IngestError::Io(_)
        )
    }
}
