//! Encoder sinks: where composited frames go.
//!
//! [`FfmpegSink`] pipes raw RGBA frames into an ffmpeg child together with the
//! mixed audio route and collects the encoded container from its stdout.
//! [`MemorySink`] keeps raw frames in memory.

use montage_core::settings::{OutputFormat, RenderSettings};
use montage_core::types::{CanvasSize, TimeUs};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;

use crate::error::{RenderError, Result};
use crate::frame::FrameBuffer;
use crate::mixer::{AudioRoute, MIX_LABEL};

const CHUNK_SIZE: usize = 64 * 1024;
const STDERR_TAIL_LINES: usize = 20;

/// The finished output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub frames: u64,
}

/// Consumes composited frames and produces one artifact.
pub trait FrameSink: Send {
    /// Record the frame buffer as it looks at `pts`.
    fn push_frame(
        &mut self,
        pts: TimeUs,
        buffer: &FrameBuffer,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Stop recording and hand back everything recorded.
    fn finish(self) -> impl Future<Output = Result<Artifact>> + Send
    where
        Self: Sized;
}

// ---------------------------------------------------------------------------
// FramePacer
// ---------------------------------------------------------------------------

/// Maps tick timestamps onto a constant frame rate: a frame is repeated when
/// ticks arrive late and dropped when they arrive early.
#[derive(Debug, Clone)]
pub struct FramePacer {
    fps: f64,
    emitted: u64,
}

impl FramePacer {
    pub fn new(fps: f64) -> Self {
        Self { fps, emitted: 0 }
    }

    /// How many copies of the frame at `pts` to emit.
    pub fn frames_for(&mut self, pts: TimeUs) -> u64 {
        let due = (pts.0.max(0) as f64 * self.fps / 1_000_000.0).round() as u64 + 1;
        let count = due.saturating_sub(self.emitted);
        self.emitted += count;
        count
    }

    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}

// ---------------------------------------------------------------------------
// EncodePlan
// ---------------------------------------------------------------------------

/// Everything the encoder process needs to know up front.
#[derive(Debug, Clone)]
pub struct EncodePlan {
    pub canvas: CanvasSize,
    pub fps: f64,
    pub format: OutputFormat,
    pub video_bitrate: u32,
    pub audio_sample_rate: u32,
    pub audio: AudioRoute,
}

impl EncodePlan {
    pub fn new(settings: &RenderSettings, canvas: CanvasSize, audio: AudioRoute) -> Self {
        Self {
            canvas,
            fps: settings.fps,
            format: settings.format,
            video_bitrate: settings.video_bitrate,
            audio_sample_rate: settings.audio_sample_rate,
            audio,
        }
    }
}

/// Build ffmpeg args: raw frames on stdin (input 0), audio tracks after it,
/// the container on stdout.
pub fn build_ffmpeg_args(plan: &EncodePlan) -> Vec<String> {
    let mut args = Vec::new();
    push_args(&mut args, &["-y", "-hide_banner", "-loglevel", "error", "-stats"]);
    push_args(
        &mut args,
        &[
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &plan.canvas.to_string(),
            "-framerate",
            &plan.fps.to_string(),
            "-i",
            "-",
        ],
    );

    args.extend(plan.audio.input_args());

    push_args(&mut args, &["-map", "0:v"]);
    if let Some(graph) = plan.audio.filter_graph(1) {
        push_args(&mut args, &["-filter_complex", &graph, "-map", MIX_LABEL]);
    }

    let with_audio = !plan.audio.is_silent();
    match plan.format {
        OutputFormat::Webm => {
            push_args(
                &mut args,
                &[
                    "-c:v",
                    "libvpx-vp9",
                    "-b:v",
                    &plan.video_bitrate.to_string(),
                    "-deadline",
                    "realtime",
                    "-cpu-used",
                    "8",
                    "-row-mt",
                    "1",
                ],
            );
            if with_audio {
                push_args(&mut args, &["-c:a", "libopus"]);
            }
        }
        OutputFormat::Mp4 => {
            push_args(&mut args, &["-c:v", "libx264", "-preset", "veryfast", "-crf", "23"]);
            if with_audio {
                push_args(&mut args, &["-c:a", "aac", "-b:a", "192k"]);
            }
            push_args(&mut args, &["-movflags", "frag_keyframe+empty_moov"]);
        }
    }

    push_args(&mut args, &["-pix_fmt", "yuv420p"]);
    if with_audio {
        push_args(&mut args, &["-ar", &plan.audio_sample_rate.to_string()]);
    }
    push_args(&mut args, &["-f", plan.format.extension(), "pipe:1"]);
    args
}

fn push_args(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

// ---------------------------------------------------------------------------
// FfmpegSink
// ---------------------------------------------------------------------------

pub struct FfmpegSink {
    child: Child,
    stdin: Option<ChildStdin>,
    collector: JoinHandle<std::io::Result<Vec<Vec<u8>>>>,
    stderr_task: JoinHandle<Vec<String>>,
    pacer: FramePacer,
    frame_len: usize,
    mime_type: &'static str,
}

impl FfmpegSink {
    /// Start the encoder. `total` is only used to scale progress logging.
    pub fn spawn(plan: &EncodePlan, total: TimeUs) -> Result<Self> {
        let args = build_ffmpeg_args(plan);
        tracing::debug!(args = ?args, "starting encoder");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RenderError::FfmpegNotFound
                } else {
                    RenderError::Io(e)
                }
            })?;

        let missing = |what: &str| RenderError::Encoding(format!("encoder {what} unavailable"));
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        let collector = tokio::spawn(collect_chunks(stdout));
        let stderr_task = tokio::spawn(watch_stderr(stderr, total.as_seconds()));

        Ok(Self {
            child,
            stdin: Some(stdin),
            collector,
            stderr_task,
            pacer: FramePacer::new(plan.fps),
            frame_len: plan.canvas.frame_len(),
            mime_type: plan.format.mime_type(),
        })
    }

    async fn failure(stderr_task: JoinHandle<Vec<String>>, fallback: String) -> RenderError {
        let tail = stderr_task.await.unwrap_or_default();
        if tail.is_empty() {
            RenderError::Encoding(fallback)
        } else {
            RenderError::Encoding(tail.join("\n"))
        }
    }
}

impl FrameSink for FfmpegSink {
    async fn push_frame(&mut self, pts: TimeUs, buffer: &FrameBuffer) -> Result<()> {
        if buffer.as_bytes().len() != self.frame_len {
            return Err(RenderError::FrameSize {
                expected: self.frame_len,
                actual: buffer.as_bytes().len(),
            });
        }
        let copies = self.pacer.frames_for(pts);
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(RenderError::Encoding("encoder input already closed".into()));
        };
        for _ in 0..copies {
            stdin
                .write_all(buffer.as_bytes())
                .await
                .map_err(|e| RenderError::Encoding(format!("writing frame: {e}")))?;
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<Artifact> {
        // Closing stdin is the encoder's end-of-stream.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        let frames = self.pacer.emitted();

        let status = self.child.wait().await?;
        let chunks = match self.collector.await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => return Err(RenderError::Encoding(format!("reading output: {e}"))),
            Err(e) => return Err(RenderError::Encoding(e.to_string())),
        };

        if frames == 0 {
            return Err(RenderError::EmptyOutput);
        }
        if !status.success() {
            return Err(Self::failure(self.stderr_task, format!("ffmpeg exited with {status}")).await);
        }
        let _ = self.stderr_task.await;

        let data = chunks.concat();
        if data.is_empty() {
            return Err(RenderError::Encoding("encoder produced no data".into()));
        }
        tracing::info!(frames, bytes = data.len(), "encoding finished");

        Ok(Artifact {
            data,
            mime_type: self.mime_type.to_string(),
            frames,
        })
    }
}

async fn collect_chunks(mut stdout: impl AsyncRead + Unpin) -> std::io::Result<Vec<Vec<u8>>> {
    let mut chunks = Vec::new();
    loop {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let n = stdout.read(&mut chunk).await?;
        if n == 0 {
            return Ok(chunks);
        }
        chunk.truncate(n);
        tracing::trace!(bytes = n, "encoder output chunk");
        chunks.push(chunk);
    }
}

/// Log progress lines and keep the tail of everything else for errors.
/// ffmpeg ends stats lines with `\r`, so both separators split lines.
pub(crate) async fn watch_stderr(mut stderr: impl AsyncRead + Unpin, total_secs: f64) -> Vec<String> {
    let mut tail: Vec<String> = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    let handle_line = |bytes: &[u8], tail: &mut Vec<String>| {
        let line = String::from_utf8_lossy(bytes);
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if let Some(p) = parse_progress(line, total_secs) {
            tracing::debug!(percent = p.percent, frame = p.frame, speed = %p.speed, "encoder progress");
        } else {
            if tail.len() == STDERR_TAIL_LINES {
                tail.remove(0);
            }
            tail.push(line.to_string());
        }
    };

    loop {
        let n = match stderr.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &b in &buf[..n] {
            if b == b'\r' || b == b'\n' {
                handle_line(&pending, &mut tail);
                pending.clear();
            } else {
                pending.push(b);
            }
        }
    }
    handle_line(&pending, &mut tail);
    tail
}

// ---------------------------------------------------------------------------
// Progress parsing
// ---------------------------------------------------------------------------

/// Encoder statistics parsed from one ffmpeg stats line.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EncodeProgress {
    pub percent: f64,
    pub frame: u64,
    pub fps: f64,
    pub speed: String,
    pub eta_seconds: Option<f64>,
}

/// Parse an ffmpeg stats line.
///
/// Example line: `frame=  123 fps= 60 ... time=00:01:02.05 speed=1.50x`
pub fn parse_progress(line: &str, total_secs: f64) -> Option<EncodeProgress> {
    if !line.contains("time=") {
        return None;
    }

    let frame = extract_value(line, "frame=")
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = extract_value(line, "fps=")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0);

    let speed = extract_value(line, "speed=").unwrap_or_default();

    let time_secs = extract_value(line, "time=")
        .and_then(|v| parse_time_str(&v))
        .unwrap_or(0.0);

    let percent = if total_secs > 0.0 {
        (time_secs / total_secs * 100.0).min(100.0)
    } else {
        0.0
    };

    let speed_factor = speed.trim_end_matches('x').parse::<f64>().unwrap_or(0.0);
    let eta_seconds = (speed_factor > 0.0 && total_secs > time_secs)
        .then(|| (total_secs - time_secs) / speed_factor);

    Some(EncodeProgress {
        percent,
        frame,
        fps,
        speed,
        eta_seconds,
    })
}

fn extract_value(line: &str, key: &str) -> Option<String> {
    let start = line.find(key)? + key.len();
    let trimmed = line[start..].trim_start();
    let end = trimmed
        .find(|c: char| c.is_whitespace())
        .unwrap_or(trimmed.len());
    let val = &trimmed[..end];
    (!val.is_empty()).then(|| val.to_string())
}

/// "00:01:02.05" to seconds.
fn parse_time_str(s: &str) -> Option<f64> {
    let mut parts = s.split(':');
    let (h, m, sec) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    Some(h.parse::<f64>().ok()? * 3600.0 + m.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?)
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps every pushed frame as raw RGBA, one entry per tick.
#[derive(Debug, Default)]
pub struct MemorySink {
    data: Vec<u8>,
    timestamps: Vec<TimeUs>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timestamps(&self) -> &[TimeUs] {
        &self.timestamps
    }
}

impl FrameSink for MemorySink {
    async fn push_frame(&mut self, pts: TimeUs, buffer: &FrameBuffer) -> Result<()> {
        self.data.extend_from_slice(buffer.as_bytes());
        self.timestamps.push(pts);
        Ok(())
    }

    async fn finish(self) -> Result<Artifact> {
        if self.timestamps.is_empty() {
            return Err(RenderError::EmptyOutput);
        }
        Ok(Artifact {
            data: self.data,
            mime_type: "video/x-raw-rgba".into(),
            frames: self.timestamps.len() as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::tool_available;
    use montage_core::types::AudioTrackDescriptor;
    use crate::mixer::AudioMixer;

    fn plan(format: OutputFormat, audio: AudioRoute) -> EncodePlan {
        EncodePlan {
            canvas: CanvasSize::new(1080, 1920),
            fps: 30.0,
            format,
            video_bitrate: 5_000_000,
            audio_sample_rate: 48_000,
            audio,
        }
    }

    #[test]
    fn pacer_one_frame_per_matching_tick() {
        let mut pacer = FramePacer::new(30.0);
        for k in 0..10 {
            let pts = TimeUs((k as f64 * 1_000_000.0 / 30.0).round() as i64);
            assert_eq!(pacer.frames_for(pts), 1);
        }
        assert_eq!(pacer.emitted(), 10);
    }

    #[test]
    fn pacer_duplicates_sparse_and_drops_dense_ticks() {
        let mut pacer = FramePacer::new(10.0);
        assert_eq!(pacer.frames_for(TimeUs::ZERO), 1);
        assert_eq!(pacer.frames_for(TimeUs::from_millis(300)), 3);
        assert_eq!(pacer.frames_for(TimeUs::from_millis(320)), 0);
        assert_eq!(pacer.frames_for(TimeUs::from_millis(400)), 1);
    }

    #[test]
    fn webm_args_stream_raw_frames_to_stdout() {
        let args = build_ffmpeg_args(&plan(OutputFormat::Webm, AudioRoute::Silent));
        assert_eq!(args[0], "-y");
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-s") + 1], "1080x1920");
        assert_eq!(args[pos("-framerate") + 1], "30");
        assert_eq!(args[pos("-c:v") + 1], "libvpx-vp9");
        assert_eq!(args[pos("-b:v") + 1], "5000000");
        assert!(!args.contains(&"-filter_complex".to_string()));
        assert!(!args.contains(&"-c:a".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
        assert_eq!(args[args.len() - 2], "webm");
    }

    #[test]
    fn mixed_audio_maps_into_output() {
        let tracks: Vec<_> = ["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]
            .into_iter()
            .map(AudioTrackDescriptor::new)
            .collect();
        let route = AudioMixer::mix(&tracks, TimeUs::from_seconds(10.0));
        let args = build_ffmpeg_args(&plan(OutputFormat::Mp4, route));

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 4);
        assert!(args.contains(&"-filter_complex".to_string()));
        assert!(args.contains(&MIX_LABEL.to_string()));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"frag_keyframe+empty_moov".to_string()));
        assert_eq!(args[args.len() - 2], "mp4");
    }

    #[test]
    fn parse_progress_extracts_time_and_calculates_percent() {
        let line =
            "frame=  150 fps= 30 q=28.0 size=    1024kB time=00:00:05.00 bitrate= 200.0kbits/s speed=1.50x";
        let progress = parse_progress(line, 10.0).unwrap();

        assert_eq!(progress.frame, 150);
        assert!((progress.fps - 30.0).abs() < 0.01);
        assert!((progress.percent - 50.0).abs() < 0.1);
        assert_eq!(progress.speed, "1.50x");
        assert!((progress.eta_seconds.unwrap() - 3.33).abs() < 0.1);
    }

    #[test]
    fn parse_progress_ignores_other_lines() {
        assert!(parse_progress("Input #0, rawvideo, from 'pipe:':", 10.0).is_none());
        assert!(parse_progress("", 10.0).is_none());
        let zero = parse_progress("frame=  10 fps= 30 time=00:00:01.00 speed=1.00x", 0.0).unwrap();
        assert_eq!(zero.percent, 0.0);
    }

    #[test]
    fn parse_time_str_cases() {
        assert!((parse_time_str("00:01:02.05").unwrap() - 62.05).abs() < 0.001);
        assert!((parse_time_str("01:00:00.00").unwrap() - 3600.0).abs() < 0.001);
        assert!(parse_time_str("00:00").is_none());
        assert!(parse_time_str("00:00:00:00").is_none());
        assert!(parse_time_str("invalid").is_none());
    }

    #[test]
    fn extract_value_works() {
        let line = "frame=  150 fps= 30.0 time=00:00:05.00 speed=1.50x";
        assert_eq!(extract_value(line, "frame=").unwrap(), "150");
        assert_eq!(extract_value(line, "speed=").unwrap(), "1.50x");
        assert!(extract_value(line, "missing=").is_none());
    }

    #[tokio::test]
    async fn stderr_watcher_splits_carriage_returns() {
        let input: &[u8] =
            b"frame=1 time=00:00:00.03 speed=1x\rframe=2 time=00:00:00.06 speed=1x\rUnknown encoder 'foo'\n";
        let tail = watch_stderr(input, 1.0).await;
        assert_eq!(tail, vec!["Unknown encoder 'foo'".to_string()]);
    }

    #[tokio::test]
    async fn memory_sink_records_frames() {
        let canvas = CanvasSize::new(2, 2);
        let fb = FrameBuffer::new(canvas);
        let mut sink = MemorySink::new();
        sink.push_frame(TimeUs::ZERO, &fb).await.unwrap();
        sink.push_frame(TimeUs(33_333), &fb).await.unwrap();
        assert_eq!(sink.timestamps(), &[TimeUs::ZERO, TimeUs(33_333)]);

        let artifact = sink.finish().await.unwrap();
        assert_eq!(artifact.frames, 2);
        assert_eq!(artifact.data.len(), 2 * canvas.frame_len());
    }

    #[tokio::test]
    async fn memory_sink_without_frames_is_empty_output() {
        let err = MemorySink::new().finish().await.unwrap_err();
        assert!(matches!(err, RenderError::EmptyOutput));
    }

    #[tokio::test]
    async fn ffmpeg_sink_encodes_webm() {
        if !tool_available("ffmpeg") {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }
        let canvas = CanvasSize::new(64, 36);
        let mut p = plan(OutputFormat::Webm, AudioRoute::Silent);
        p.canvas = canvas;
        let mut sink = FfmpegSink::spawn(&p, TimeUs::from_seconds(1.0)).unwrap();
        let fb = FrameBuffer::new(canvas);
        for k in 0..30 {
            let pts = TimeUs((k as f64 * 1_000_000.0 / 30.0).round() as i64);
            sink.push_frame(pts, &fb).await.unwrap();
        }
        let artifact = sink.finish().await.unwrap();
        assert_eq!(artifact.frames, 30);
        assert_eq!(artifact.mime_type, "video/webm");
        // EBML magic
        assert_eq!(&artifact.data[..4], &[0x1A, 0x45, 0xDF, 0xA3]);
    }

    #[tokio::test]
    async fn ffmpeg_sink_without_frames_is_empty_output() {
        if !tool_available("ffmpeg") {
            eprintln!("ffmpeg not installed, skipping");
            return;
        }
        let mut p = plan(OutputFormat::Webm, AudioRoute::Silent);
        p.canvas = CanvasSize::new(16, 16);
        let sink = FfmpegSink::spawn(&p, TimeUs::from_seconds(1.0)).unwrap();
        let err = sink.finish().await.unwrap_err();
        assert!(matches!(err, RenderError::EmptyOutput));
    }
}
