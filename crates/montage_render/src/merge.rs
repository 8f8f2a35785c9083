//! The merge operation: clip descriptors in, one encoded artifact out.

use montage_core::request::MergeRequest;
use montage_core::settings::{Pacing, RenderSettings, MAX_FPS};
use montage_core::timeline::Timeline;
use montage_core::types::TimeUs;

use crate::clock::{FrameClock, RealtimeClock, TickSource};
use crate::compositor::Compositor;
use crate::error::{RenderError, Result};
use crate::mixer::AudioMixer;
use crate::probe::probe_media;
use crate::progress::{ProgressReporter, COMPLETE, RENDER_DONE, SETUP_DONE};
use crate::sink::{Artifact, EncodePlan, FfmpegSink, FrameSink};
use crate::source::{prepare_clip, FrameSource};
use crate::transition::TransitionEngine;

#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub artifact: Artifact,
    /// Rendered length after transition overlaps.
    pub total_duration: TimeUs,
    pub frames: u64,
}

/// Merge with the ffmpeg encoder, ticking the way `settings.pacing` asks.
pub async fn merge(
    request: &MergeRequest,
    settings: &RenderSettings,
    on_progress: impl FnMut(f64),
) -> Result<MergeOutput> {
    match settings.pacing {
        Pacing::Offline => {
            let mut clock = FrameClock::new(settings.fps);
            merge_with(request, settings, &mut clock, FfmpegSink::spawn, on_progress).await
        }
        Pacing::Realtime => {
            let mut clock = RealtimeClock::new(settings.fps);
            merge_with(request, settings, &mut clock, FfmpegSink::spawn, on_progress).await
        }
    }
}

/// Merge with a caller-supplied clock and sink.
///
/// `make_sink` runs only after every clip and audio track has been loaded,
/// so a request that fails early never starts an encoder.
pub async fn merge_with<C, S, F>(
    request: &MergeRequest,
    settings: &RenderSettings,
    clock: &mut C,
    make_sink: F,
    on_progress: impl FnMut(f64),
) -> Result<MergeOutput>
where
    C: TickSource,
    S: FrameSink,
    F: FnOnce(&EncodePlan, TimeUs) -> Result<S>,
{
    request.validate()?;
    if !settings.fps.is_finite() || settings.fps <= 0.0 || settings.fps > MAX_FPS {
        return Err(RenderError::InvalidRequest(format!(
            "frame rate must be in (0, {MAX_FPS}], got {}",
            settings.fps
        )));
    }

    let mut progress = ProgressReporter::new(on_progress);
    let canvas = request.canvas;
    tracing::info!(
        clips = request.clips.len(),
        tracks = request.audio_tracks.len(),
        canvas = %canvas,
        transition = %request.transition.kind,
        "starting merge"
    );
    progress.report(SETUP_DONE);

    // Clips load one at a time so progress stays in clip order.
    let n = request.clips.len();
    let mut descriptors = Vec::with_capacity(n);
    let mut media = Vec::with_capacity(n);
    for (index, clip) in request.clips.iter().enumerate() {
        let (descriptor, prepared) = prepare_clip(index, clip, canvas, settings.fps).await?;
        descriptors.push(descriptor);
        media.push(prepared);
        progress.clip_ready(index + 1, n);
    }

    for (index, track) in request.audio_tracks.iter().enumerate() {
        let probe = probe_media(&track.source)
            .await
            .map_err(|e| e.for_track(index, &track.source))?;
        if !probe.has_audio() {
            return Err(RenderError::UnreadableAudio {
                index,
                path: track.source.clone(),
                reason: "no audio stream".into(),
            });
        }
    }

    let timeline = Timeline::resolve_with(&descriptors, settings.image_fallback)?;
    let total = timeline.render_duration(&request.transition);
    let sources: Vec<FrameSource> = timeline
        .clips()
        .iter()
        .zip(media)
        .enumerate()
        .map(|(index, (clip, prepared))| FrameSource::from_prepared(index, clip, prepared, canvas))
        .collect();

    let route = AudioMixer::mix(&request.audio_tracks, total);
    let plan = EncodePlan::new(settings, canvas, route);

    let mut compositor = Compositor::new(
        &timeline,
        request.transition,
        sources,
        canvas,
        TransitionEngine::new(settings.max_blur_radius),
    )?;
    let mut sink = make_sink(&plan, total)?;

    let total_secs = total.as_seconds();
    let frames = compositor
        .run(clock, &mut sink, |t| progress.rendering(t.as_seconds(), total_secs))
        .await?;
    progress.report(RENDER_DONE);

    let artifact = sink.finish().await?;
    progress.report(COMPLETE);

    tracing::info!(
        frames,
        duration = %total,
        bytes = artifact.data.len(),
        "merge complete"
    );
    Ok(MergeOutput {
        artifact,
        total_duration: total,
        frames,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
