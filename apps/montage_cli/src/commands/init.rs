//! Build a merge request from media files on the command line.

use std::path::PathBuf;

use anyhow::{bail, Context};
use montage_core::request::MergeRequest;
use montage_core::types::{AudioTrackDescriptor, ClipDescriptor, MediaKind, TransitionSpec};
use montage_render::probe::{detect_media_kind, probe_media};

pub async fn run(
    output: PathBuf,
    media: Vec<PathBuf>,
    music: Vec<PathBuf>,
    preset: String,
    transition: String,
) -> anyhow::Result<()> {
    let canvas = super::parse_preset(&preset)?;
    let kind = super::parse_transition(&transition)?;
    let mut request = MergeRequest::new(canvas, TransitionSpec::new(kind));

    for path in media {
        let probe = probe_media(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        match detect_media_kind(&path, &probe) {
            MediaKind::Image => request.clips.push(ClipDescriptor::image(&path)),
            MediaKind::Video => request.clips.push(
                ClipDescriptor::video(&path).with_intrinsic_duration(probe.duration_us),
            ),
            MediaKind::Audio => bail!(
                "{} is an audio file; pass it with --music instead",
                path.display()
            ),
        }
    }
    request
        .audio_tracks
        .extend(music.into_iter().map(AudioTrackDescriptor::new));

    request.validate()?;
    request.save_to_file(&output)?;

    println!(
        "Wrote request: {} clips, {} music tracks, {} canvas, {} transition",
        request.clips.len(),
        request.audio_tracks.len(),
        canvas,
        kind.display_name()
    );
    Ok(())
}
