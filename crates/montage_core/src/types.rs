use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};
use std::path::PathBuf;
use uuid::Uuid;

use crate::error::{CoreError, Result};

// ---------------------------------------------------------------------------
// TimeUs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeUs(pub i64);

impl TimeUs {
    pub const ZERO: Self = Self(0);

    pub fn from_seconds(s: f64) -> Self {
        Self((s * 1_000_000.0).round() as i64)
    }

    pub fn from_millis(ms: i64) -> Self {
        Self(ms * 1_000)
    }

    pub fn as_seconds(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn as_millis(&self) -> i64 {
        self.0 / 1_000
    }
}

impl Add for TimeUs {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sub for TimeUs {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Mul<i64> for TimeUs {
    type Output = Self;
    fn mul(self, rhs: i64) -> Self {
        Self(self.0 * rhs)
    }
}

impl Div<i64> for TimeUs {
    type Output = Self;
    fn div(self, rhs: i64) -> Self {
        Self(self.0 / rhs)
    }
}

impl std::iter::Sum for TimeUs {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(TimeUs::ZERO, |acc, t| acc + t)
    }
}

impl fmt::Display for TimeUs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_us = self.0.unsigned_abs();
        let total_ms = total_us / 1_000;
        let ms = total_ms % 1_000;
        let total_secs = total_ms / 1_000;
        let secs = total_secs % 60;
        let total_mins = total_secs / 60;
        let mins = total_mins % 60;
        let hours = total_mins / 60;
        if self.0 < 0 {
            write!(f, "-{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        } else {
            write!(f, "{:02}:{:02}:{:02}.{:03}", hours, mins, secs, ms)
        }
    }
}

// ---------------------------------------------------------------------------
// MediaKind / ClipKind
// ---------------------------------------------------------------------------

/// What a probed file turned out to contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Audio,
    Image,
}

/// The two kinds of entry a timeline can hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClipKind {
    Video,
    Image,
}

// ---------------------------------------------------------------------------
// ProbeResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProbeResult {
    pub duration_us: TimeUs,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub codec: String,
    pub audio_channels: u32,
    pub audio_sample_rate: u32,
}

impl ProbeResult {
    pub fn has_video(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn has_audio(&self) -> bool {
        self.audio_channels > 0
    }
}

// ---------------------------------------------------------------------------
// Trim
// ---------------------------------------------------------------------------

/// A `[start, end)` sub-range of a clip's source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Trim {
    pub start: TimeUs,
    pub end: TimeUs,
}

impl Trim {
    /// Build a trim, rejecting negative starts and empty or inverted ranges.
    pub fn new(start: TimeUs, end: TimeUs) -> Result<Self> {
        let trim = Self { start, end };
        trim.validate()?;
        Ok(trim)
    }

    pub fn from_seconds(start: f64, end: f64) -> Result<Self> {
        Self::new(TimeUs::from_seconds(start), TimeUs::from_seconds(end))
    }

    pub fn duration(&self) -> TimeUs {
        self.end - self.start
    }

    pub fn validate(&self) -> Result<()> {
        if self.start < TimeUs::ZERO {
            return Err(CoreError::InvalidTrim(format!(
                "trim start {} is negative",
                self.start
            )));
        }
        if self.end <= self.start {
            return Err(CoreError::InvalidTrim(format!(
                "trim end {} must be after start {}",
                self.end, self.start
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ClipDescriptor
// ---------------------------------------------------------------------------

/// One entry of the caller's ordered clip list.
///
/// `intrinsic_duration` is unknown until the source has been probed; images
/// never need it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClipDescriptor {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: ClipKind,
    pub source: PathBuf,
    #[serde(default)]
    pub trim: Option<Trim>,
    #[serde(default)]
    pub intrinsic_duration: Option<TimeUs>,
}

impl ClipDescriptor {
    pub fn video(source: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ClipKind::Video,
            source: source.into(),
            trim: None,
            intrinsic_duration: None,
        }
    }

    pub fn image(source: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ClipKind::Image,
            source: source.into(),
            trim: None,
            intrinsic_duration: None,
        }
    }

    pub fn with_trim(mut self, trim: Trim) -> Self {
        self.trim = Some(trim);
        self
    }

    pub fn with_intrinsic_duration(mut self, duration: TimeUs) -> Self {
        self.intrinsic_duration = Some(duration);
        self
    }
}

// ---------------------------------------------------------------------------
// AudioTrackDescriptor
// ---------------------------------------------------------------------------

/// A background music track, looped over the whole output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioTrackDescriptor {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub source: PathBuf,
}

impl AudioTrackDescriptor {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CanvasSize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Bytes in one RGBA frame of this size.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }
}

impl fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ---------------------------------------------------------------------------
// TransitionKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    #[default]
    None,
    Fade,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    ZoomIn,
    ZoomOut,
    Blur,
}

impl TransitionKind {
    pub const ALL: [TransitionKind; 9] = [
        TransitionKind::None,
        TransitionKind::Fade,
        TransitionKind::SlideLeft,
        TransitionKind::SlideRight,
        TransitionKind::SlideUp,
        TransitionKind::SlideDown,
        TransitionKind::ZoomIn,
        TransitionKind::ZoomOut,
        TransitionKind::Blur,
    ];

    /// Wire name, as used in merge requests.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::None => "none",
            TransitionKind::Fade => "fade",
            TransitionKind::SlideLeft => "slideLeft",
            TransitionKind::SlideRight => "slideRight",
            TransitionKind::SlideUp => "slideUp",
            TransitionKind::SlideDown => "slideDown",
            TransitionKind::ZoomIn => "zoomIn",
            TransitionKind::ZoomOut => "zoomOut",
            TransitionKind::Blur => "blur",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            TransitionKind::None => "No Transition",
            TransitionKind::Fade => "Fade",
            TransitionKind::SlideLeft => "Slide Left",
            TransitionKind::SlideRight => "Slide Right",
            TransitionKind::SlideUp => "Slide Up",
            TransitionKind::SlideDown => "Slide Down",
            TransitionKind::ZoomIn => "Zoom In",
            TransitionKind::ZoomOut => "Zoom Out",
            TransitionKind::Blur => "Blur",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TransitionKind::None => "Simple cut between clips",
            TransitionKind::Fade => "Smooth fade between clips",
            TransitionKind::SlideLeft => "Slide from right to left",
            TransitionKind::SlideRight => "Slide from left to right",
            TransitionKind::SlideUp => "Slide from bottom to top",
            TransitionKind::SlideDown => "Slide from top to bottom",
            TransitionKind::ZoomIn => "Zoom in effect",
            TransitionKind::ZoomOut => "Zoom out effect",
            TransitionKind::Blur => "Blur transition",
        }
    }
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        TransitionKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::InvalidOperation(format!("unknown transition: {s}")))
    }
}

// ---------------------------------------------------------------------------
// TransitionSpec
// ---------------------------------------------------------------------------

pub const DEFAULT_TRANSITION_WINDOW: TimeUs = TimeUs(500_000);

/// One transition applied between every adjacent pair of clips.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransitionSpec {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    #[serde(default = "default_window")]
    pub window: TimeUs,
}

fn default_window() -> TimeUs {
    DEFAULT_TRANSITION_WINDOW
}

impl TransitionSpec {
    pub fn new(kind: TransitionKind) -> Self {
        Self {
            kind,
            window: DEFAULT_TRANSITION_WINDOW,
        }
    }

    pub fn none() -> Self {
        Self::new(TransitionKind::None)
    }

    pub fn is_cut(&self) -> bool {
        self.kind == TransitionKind::None || self.window <= TimeUs::ZERO
    }
}

impl Default for TransitionSpec {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_us_add_sub() {
        let a = TimeUs(5_000_000);
        let b = TimeUs(3_000_000);
        assert_eq!(a + b, TimeUs(8_000_000));
        assert_eq!(a - b, TimeUs(2_000_000));
    }

    #[test]
    fn time_us_from_seconds_as_seconds() {
        let t = TimeUs::from_seconds(2.5);
        assert_eq!(t, TimeUs(2_500_000));
        assert!((t.as_seconds() - 2.5).abs() < 1e-9);
        assert_eq!(TimeUs::from_millis(500), TimeUs(500_000));
        assert_eq!(TimeUs(1_750_000).as_millis(), 1_750);
    }

    #[test]
    fn time_us_display() {
        assert_eq!(TimeUs(0).to_string(), "00:00:00.000");
        assert_eq!(TimeUs(1_500_000).to_string(), "00:00:01.500");
        assert_eq!(TimeUs::from_seconds(3661.5).to_string(), "01:01:01.500");
        assert_eq!(TimeUs(-250_000).to_string(), "-00:00:00.250");
    }

    #[test]
    fn time_us_sum() {
        let total: TimeUs = [TimeUs(1), TimeUs(2), TimeUs(3)].into_iter().sum();
        assert_eq!(total, TimeUs(6));
    }

    #[test]
    fn trim_rejects_zero_length() {
        let err = Trim::from_seconds(2.0, 2.0).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTrim(_)));
    }

    #[test]
    fn trim_rejects_inverted_and_negative() {
        assert!(Trim::from_seconds(3.0, 1.0).is_err());
        assert!(Trim::from_seconds(-1.0, 1.0).is_err());
    }

    #[test]
    fn trim_duration() {
        let trim = Trim::from_seconds(1.25, 4.0).unwrap();
        assert_eq!(trim.duration(), TimeUs(2_750_000));
    }

    #[test]
    fn transition_kind_wire_names() {
        let json = serde_json::to_string(&TransitionKind::SlideLeft).unwrap();
        assert_eq!(json, "\"slideLeft\"");
        let back: TransitionKind = serde_json::from_str("\"zoomOut\"").unwrap();
        assert_eq!(back, TransitionKind::ZoomOut);
        for kind in TransitionKind::ALL {
            assert_eq!(kind.as_str().parse::<TransitionKind>().unwrap(), kind);
        }
    }

    #[test]
    fn transition_kind_unknown_name() {
        assert!("wipe".parse::<TransitionKind>().is_err());
    }

    #[test]
    fn transition_spec_defaults_window() {
        let transition: TransitionSpec = serde_json::from_str(r#"{"type":"fade"}"#).unwrap();
        assert_eq!(transition.kind, TransitionKind::Fade);
        assert_eq!(transition.window, DEFAULT_TRANSITION_WINDOW);
        assert!(!transition.is_cut());
        assert!(TransitionSpec::none().is_cut());
    }

    #[test]
    fn clip_descriptor_from_json_gets_id() {
        let clip: ClipDescriptor =
            serde_json::from_str(r#"{"kind":"image","source":"/tmp/a.png"}"#).unwrap();
        assert_eq!(clip.kind, ClipKind::Image);
        assert!(clip.trim.is_none());
        assert!(!clip.id.is_nil());
    }

    #[test]
    fn canvas_frame_len() {
        assert_eq!(CanvasSize::new(4, 2).frame_len(), 32);
        assert_eq!(CanvasSize::new(1920, 1080).to_string(), "1920x1080");
    }
}
