use montage_core::error::CoreError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no clips to merge")]
    EmptyTimeline,

    #[error("clip {index} ({}) is unreadable: {reason}", path.display())]
    UnreadableMedia {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("audio track {index} ({}) is unreadable: {reason}", path.display())]
    UnreadableAudio {
        index: usize,
        path: PathBuf,
        reason: String,
    },

    #[error("frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("render produced no frames")]
    EmptyOutput,

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("invalid merge request: {0}")]
    InvalidRequest(String),

    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to execute ffprobe: {0}")]
    FfprobeExec(String),

    #[error("ffprobe failed: {0}")]
    FfprobeFailed(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffmpeg failed: {0}")]
    FfmpegFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The failure classes a caller is expected to tell apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    EmptyTimeline,
    UnreadableMedia,
    EmptyOutput,
    Encoding,
    InvalidRequest,
}

impl RenderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::EmptyTimeline => ErrorKind::EmptyTimeline,
            RenderError::UnreadableMedia { .. }
            | RenderError::UnreadableAudio { .. }
            | RenderError::FileNotFound(_)
            | RenderError::FfprobeExec(_)
            | RenderError::FfprobeFailed(_)
            | RenderError::FrameSize { .. }
            | RenderError::Json(_) => ErrorKind::UnreadableMedia,
            RenderError::EmptyOutput => ErrorKind::EmptyOutput,
            RenderError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            RenderError::Encoding(_)
            | RenderError::FfmpegNotFound
            | RenderError::FfmpegFailed(_)
            | RenderError::Io(_) => ErrorKind::Encoding,
        }
    }

    /// Attach a clip position to a media-level failure.
    pub(crate) fn for_clip(self, index: usize, path: &std::path::Path) -> Self {
        match self {
            RenderError::UnreadableMedia { .. } | RenderError::EmptyTimeline => self,
            other => RenderError::UnreadableMedia {
                index,
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        }
    }

    pub(crate) fn for_track(self, index: usize, path: &std::path::Path) -> Self {
        RenderError::UnreadableAudio {
            index,
            path: path.to_path_buf(),
            reason: self.to_string(),
        }
    }
}

impl From<CoreError> for RenderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::EmptyTimeline => RenderError::EmptyTimeline,
            CoreError::UnreadableMedia {
                index,
                path,
                reason,
            } => RenderError::UnreadableMedia {
                index,
                path,
                reason,
            },
            CoreError::Io(e) => RenderError::Io(e),
            other => RenderError::InvalidRequest(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
