use crate::timeline::IMAGE_FALLBACK_DURATION;
use crate::types::*;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// VP9 video + Opus audio in WebM.
    #[default]
    Webm,
    /// H.264 video + AAC audio in fragmented MP4.
    Mp4,
}

impl OutputFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Webm => "video/webm",
            OutputFormat::Mp4 => "video/mp4",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webm => "webm",
            OutputFormat::Mp4 => "mp4",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> crate::error::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "webm" => Ok(OutputFormat::Webm),
            "mp4" => Ok(OutputFormat::Mp4),
            other => Err(crate::error::CoreError::InvalidOperation(format!(
                "unknown output format: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Pacing
// ---------------------------------------------------------------------------

/// How the render loop is ticked.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Virtual clock stepping at the output frame rate, as fast as possible.
    #[default]
    Offline,
    /// Wall-clock ticks at the output frame rate.
    Realtime,
}

// ---------------------------------------------------------------------------
// RenderSettings
// ---------------------------------------------------------------------------

/// Highest output frame rate a render accepts.
pub const MAX_FPS: f64 = 240.0;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    pub fps: f64,
    pub image_fallback: TimeUs,
    pub max_blur_radius: f32,
    pub video_bitrate: u32,
    pub audio_sample_rate: u32,
    pub format: OutputFormat,
    pub pacing: Pacing,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fps: 30.0,
            image_fallback: IMAGE_FALLBACK_DURATION,
            max_blur_radius: 10.0,
            video_bitrate: 5_000_000,
            audio_sample_rate: 48_000,
            format: OutputFormat::Webm,
            pacing: Pacing::Offline,
        }
    }
}

// ---------------------------------------------------------------------------
// Canvas presets
// ---------------------------------------------------------------------------

/// 1920x1080 (16:9) "Wide Screen" preset.
pub fn preset_wide() -> CanvasSize {
    CanvasSize::new(1920, 1080)
}

/// 1080x1920 (9:16) "Full Portrait" preset.
pub fn preset_portrait() -> CanvasSize {
    CanvasSize::new(1080, 1920)
}

/// 1080x1080 (1:1) "Square" preset.
pub fn preset_square() -> CanvasSize {
    CanvasSize::new(1080, 1080)
}

/// Look up a preset by name or aspect ratio (`wide`, `16:9`, ...).
pub fn preset_by_name(name: &str) -> Option<CanvasSize> {
    match name.to_ascii_lowercase().as_str() {
        "wide" | "widescreen" | "16:9" => Some(preset_wide()),
        "portrait" | "9:16" => Some(preset_portrait()),
        "square" | "1:1" => Some(preset_square()),
        _ => None,
    }
}

impl Default for CanvasSize {
    fn default() -> Self {
        preset_portrait()
    }
}
