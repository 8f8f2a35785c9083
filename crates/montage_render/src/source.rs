//! Per-clip frame sources.
//!
//! A source is idle until the compositor enters its clip, plays while the
//! clip (or its transition tail) is on screen, and is paused on exit. Video
//! decoding runs in an ffmpeg child that streams raw RGBA frames; images are
//! decoded once up front.

use montage_core::types::{CanvasSize, ClipDescriptor, ClipKind, TimeUs};
use montage_core::timeline::TimelineClip;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::error::{RenderError, Result};
use crate::frame::Frame;
use crate::probe::probe_media;
use crate::sink::watch_stderr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
}

// ---------------------------------------------------------------------------
// Preparation
// ---------------------------------------------------------------------------

/// Media loaded before the timeline is resolved.
#[derive(Debug, Clone)]
pub enum PreparedMedia {
    /// Probed video, decoded lazily at `rate` frames per second.
    Video { rate: f64 },
    /// Fully decoded still image.
    Image(Frame),
}

/// Probe or decode one clip. On success the returned descriptor carries the
/// probed intrinsic duration for videos.
pub async fn prepare_clip(
    index: usize,
    clip: &ClipDescriptor,
    canvas: CanvasSize,
    fallback_rate: f64,
) -> Result<(ClipDescriptor, PreparedMedia)> {
    match clip.kind {
        ClipKind::Video => {
            let probe = probe_media(&clip.source)
                .await
                .map_err(|e| e.for_clip(index, &clip.source))?;
            if !probe.has_video() {
                return Err(RenderError::UnreadableMedia {
                    index,
                    path: clip.source.clone(),
                    reason: "no video stream".into(),
                });
            }
            if probe.duration_us <= TimeUs::ZERO {
                return Err(RenderError::UnreadableMedia {
                    index,
                    path: clip.source.clone(),
                    reason: "unknown duration".into(),
                });
            }
            let rate = if probe.fps > 0.0 { probe.fps } else { fallback_rate };
            tracing::debug!(clip = index, duration = %probe.duration_us, rate, "video ready");
            let resolved = clip.clone().with_intrinsic_duration(probe.duration_us);
            Ok((resolved, PreparedMedia::Video { rate }))
        }
        ClipKind::Image => {
            let frame = decode_image(&clip.source, canvas)
                .await
                .map_err(|e| e.for_clip(index, &clip.source))?;
            tracing::debug!(clip = index, "image ready");
            Ok((clip.clone(), PreparedMedia::Image(frame)))
        }
    }
}

/// Decode a still image into a canvas-sized, letterboxed raster.
pub async fn decode_image(path: &Path, canvas: CanvasSize) -> Result<Frame> {
    if !path.exists() {
        return Err(RenderError::FileNotFound(path.to_path_buf()));
    }

    let output = Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args(["-vf", &fit_filter(canvas), "-frames:v", "1"])
        .args(["-f", "rawvideo", "-pix_fmt", "rgba", "-"])
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(spawn_error)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RenderError::FfmpegFailed(format!(
            "{} ({})",
            stderr.trim(),
            output.status
        )));
    }

    Frame::from_rgba(canvas.width, canvas.height, output.stdout)
}

/// Scale to fit inside the canvas, then pad to its exact size.
fn fit_filter(canvas: CanvasSize) -> String {
    let (w, h) = (canvas.width, canvas.height);
    format!(
        "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black"
    )
}

fn spawn_error(e: std::io::Error) -> RenderError {
    if e.kind() == std::io::ErrorKind::NotFound {
        RenderError::FfmpegNotFound
    } else {
        RenderError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// FrameSource
// ---------------------------------------------------------------------------

pub enum FrameSource {
    Video(VideoSource),
    Image(ImageSource),
}

impl FrameSource {
    /// Build the source for clip `index` of a resolved timeline.
    pub fn from_prepared(
        index: usize,
        clip: &TimelineClip,
        media: PreparedMedia,
        canvas: CanvasSize,
    ) -> Self {
        match media {
            PreparedMedia::Video { rate } => FrameSource::Video(VideoSource::new(
                index,
                clip.descriptor.source.clone(),
                clip.source_offset(),
                clip.effective_duration,
                rate,
                canvas,
            )),
            PreparedMedia::Image(frame) => FrameSource::Image(ImageSource::new(frame)),
        }
    }

    pub fn state(&self) -> PlaybackState {
        match self {
            FrameSource::Video(v) => v.state,
            FrameSource::Image(i) => i.state,
        }
    }

    /// Idle to playing. Only the first call has an effect.
    pub async fn start(&mut self) -> Result<()> {
        match self {
            FrameSource::Video(v) => v.start().await,
            FrameSource::Image(i) => {
                if i.state == PlaybackState::Idle {
                    i.state = PlaybackState::Playing;
                }
                Ok(())
            }
        }
    }

    pub async fn current_frame(&mut self, elapsed: TimeUs) -> Result<&Frame> {
        match self {
            FrameSource::Video(v) => v.current_frame(elapsed).await,
            FrameSource::Image(i) => Ok(&i.frame),
        }
    }

    /// Stop playback and release the decoder.
    pub async fn pause(&mut self) {
        match self {
            FrameSource::Video(v) => v.pause().await,
            FrameSource::Image(i) => i.state = PlaybackState::Paused,
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameSource::Video(v) => f
                .debug_struct("Video")
                .field("state", &v.state)
                .field("rate", &v.rate)
                .field("frames_read", &v.frames_read)
                .finish(),
            FrameSource::Image(i) => f.debug_struct("Image").field("state", &i.state).finish(),
        }
    }
}

// ---------------------------------------------------------------------------
// ImageSource
// ---------------------------------------------------------------------------

pub struct ImageSource {
    frame: Frame,
    state: PlaybackState,
}

impl ImageSource {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            state: PlaybackState::Idle,
        }
    }
}

// ---------------------------------------------------------------------------
// VideoSource
// ---------------------------------------------------------------------------

struct DecodeJob {
    offset: TimeUs,
    duration: TimeUs,
}

type FrameStream = Box<dyn AsyncRead + Send + Unpin>;

pub struct VideoSource {
    index: usize,
    path: PathBuf,
    job: Option<DecodeJob>,
    stream: Option<FrameStream>,
    child: Option<Child>,
    stderr_task: Option<JoinHandle<Vec<String>>>,
    rate: f64,
    canvas: CanvasSize,
    frame: Frame,
    back: Frame,
    frames_read: u64,
    exhausted: bool,
    state: PlaybackState,
}

impl VideoSource {
    /// A source for clip `index` that spawns its decoder on `start`.
    pub fn new(
        index: usize,
        path: PathBuf,
        offset: TimeUs,
        duration: TimeUs,
        rate: f64,
        canvas: CanvasSize,
    ) -> Self {
        Self::with_parts(index, path, Some(DecodeJob { offset, duration }), None, rate, canvas)
    }

    /// A source for clip `index` reading raw canvas-sized RGBA frames from
    /// `stream`.
    pub fn from_stream(
        index: usize,
        stream: impl AsyncRead + Send + Unpin + 'static,
        rate: f64,
        canvas: CanvasSize,
    ) -> Self {
        let stream: FrameStream = Box::new(stream);
        Self::with_parts(index, PathBuf::from("pipe:"), None, Some(stream), rate, canvas)
    }

    fn with_parts(
        index: usize,
        path: PathBuf,
        job: Option<DecodeJob>,
        stream: Option<FrameStream>,
        rate: f64,
        canvas: CanvasSize,
    ) -> Self {
        let black = Frame::solid(canvas.width, canvas.height, [0, 0, 0, 255]);
        Self {
            index,
            path,
            job,
            stream,
            child: None,
            stderr_task: None,
            rate,
            canvas,
            back: black.clone(),
            frame: black,
            frames_read: 0,
            exhausted: false,
            state: PlaybackState::Idle,
        }
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    fn unreadable(&self, reason: impl Into<String>) -> RenderError {
        RenderError::UnreadableMedia {
            index: self.index,
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.state != PlaybackState::Idle {
            return Ok(());
        }
        if let Some(job) = self.job.take() {
            let mut child = Command::new("ffmpeg")
                .args(decoder_args(&self.path, &job, self.rate, self.canvas))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(spawn_error)?;
            let stdout = child
                .stdout
                .take()
                .ok_or_else(|| self.unreadable("decoder stdout unavailable"))?;
            if let Some(stderr) = child.stderr.take() {
                self.stderr_task = Some(tokio::spawn(watch_stderr(stderr, job.duration.as_seconds())));
            }
            tracing::debug!(clip = self.index, path = %self.path.display(), offset = %job.offset, "decoder started");
            let stream: FrameStream = Box::new(stdout);
            self.stream = Some(stream);
            self.child = Some(child);
        }
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Read forward until the frame due at `elapsed` is decoded. Holds the
    /// last frame once the stream ends. A stream that ends before its first
    /// frame, or a decoder that exits with an error, fails the clip.
    async fn current_frame(&mut self, elapsed: TimeUs) -> Result<&Frame> {
        if self.state != PlaybackState::Playing || self.exhausted {
            return Ok(&self.frame);
        }
        let due = (elapsed.0.max(0) as f64 * self.rate / 1_000_000.0).floor() as u64 + 1;
        while self.frames_read < due {
            let Some(stream) = self.stream.as_mut() else {
                break;
            };
            match stream.read_exact(self.back.as_bytes_mut()).await {
                Ok(_) => {
                    std::mem::swap(&mut self.frame, &mut self.back);
                    self.frames_read += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::trace!(clip = self.index, frames = self.frames_read, "decoder stream ended");
                    self.exhausted = true;
                    self.stream = None;
                    self.finish_decoder().await?;
                    break;
                }
                Err(e) => {
                    self.exhausted = true;
                    return Err(self.unreadable(format!("decoder read failed: {e}")));
                }
            }
        }
        Ok(&self.frame)
    }

    /// Reap the decoder after end of stream and surface its failure, if any.
    async fn finish_decoder(&mut self) -> Result<()> {
        let status = match self.child.take() {
            Some(mut child) => Some(
                child
                    .wait()
                    .await
                    .map_err(|e| self.unreadable(format!("decoder wait failed: {e}")))?,
            ),
            None => None,
        };
        let tail = match self.stderr_task.take() {
            Some(task) => task.await.unwrap_or_default(),
            None => Vec::new(),
        };

        if let Some(status) = status.filter(|s| !s.success()) {
            let mut reason = format!("decoder exited with {status}");
            if !tail.is_empty() {
                reason.push_str(": ");
                reason.push_str(&tail.join("\n"));
            }
            return Err(self.unreadable(reason));
        }
        if self.frames_read == 0 {
            let mut reason = String::from("decoder produced no frames");
            if let Some(last) = tail.last() {
                reason.push_str(": ");
                reason.push_str(last);
            }
            return Err(self.unreadable(reason));
        }
        Ok(())
    }

    async fn pause(&mut self) {
        self.state = PlaybackState::Paused;
        self.stream = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.start_kill();
            let _ = child.wait().await;
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

fn decoder_args(path: &Path, job: &DecodeJob, rate: f64, canvas: CanvasSize) -> Vec<String> {
    vec![
        "-v".into(),
        "error".into(),
        "-ss".into(),
        format!("{:.6}", job.offset.as_seconds()),
        "-t".into(),
        format!("{:.6}", job.duration.as_seconds()),
        "-i".into(),
        path.to_string_lossy().to_string(),
        "-an".into(),
        "-vf".into(),
        format!("{},fps={rate}", fit_filter(canvas)),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgba".into(),
        "-".into(),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
