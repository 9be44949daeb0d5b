//! Error types for the lake.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LakeError>;

#[derive(Debug, Error)]
pub enum LakeError {
    #[error("empty record batch")]
    EmptyBatch,

    #[error("timeframe error: {0}")]
    Timeframe(#[from] types::TimeframeError),

    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("storage I/O at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid partition path: {0}")]
    InvalidPath(String),
}

impl LakeError {
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        LakeError::Io {
            path: path.into(),
            source,
        }
    }
}
