use crate::error::{CoreError, Result};
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the editor hands over for one merge: an immutable snapshot of
/// the clip order, the music, the canvas and the transition choice.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MergeRequest {
    pub clips: Vec<ClipDescriptor>,
    #[serde(default)]
    pub audio_tracks: Vec<AudioTrackDescriptor>,
    #[serde(default)]
    pub canvas: CanvasSize,
    #[serde(default)]
    pub transition: TransitionSpec,
}

impl MergeRequest {
    pub fn new(canvas: CanvasSize, transition: TransitionSpec) -> Self {
        Self {
            clips: vec![],
            audio_tracks: vec![],
            canvas,
            transition,
        }
    }

    /// Check what can be checked without touching media.
    pub fn validate(&self) -> Result<()> {
        if self.clips.is_empty() {
            return Err(CoreError::EmptyTimeline);
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(CoreError::InvalidOperation(format!(
                "canvas size {} is empty",
                self.canvas
            )));
        }
        if self.transition.window < TimeUs::ZERO {
            return Err(CoreError::InvalidOperation(
                "transition window must not be negative".into(),
            ));
        }
        for clip in &self.clips {
            if let Some(trim) = clip.trim {
                trim.validate()?;
            }
        }
        Ok(())
    }

    /// Save request to a file as pretty-printed JSON.
    /// Automatically appends `.montage` extension if not present.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = ensure_extension(path.as_ref());
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load a request from a JSON file.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let request: MergeRequest = serde_json::from_str(&data)?;
        Ok(request)
    }
}

fn ensure_extension(path: &Path) -> std::path::PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some("montage") {
        path.to_path_buf()
    } else {
        let mut p = path.to_path_buf();
        let mut name = p.file_name().unwrap_or_default().to_os_string();
        name.push(".montage");
        p.set_file_name(name);
        p
    }
}
