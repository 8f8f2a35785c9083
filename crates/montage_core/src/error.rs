use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("timeline has no clips")]
    EmptyTimeline,

    #[error("clip {index} ({}) is unreadable: {reason}", path.display())]
    UnreadableMedia {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("invalid trim: {0}")]
    InvalidTrim(String),

    #[error("Clip not found: {0}")]
    ClipNotFound(uuid::Uuid),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
