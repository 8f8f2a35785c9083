//! Render a merge request to a file.

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use montage_core::request::MergeRequest;
use montage_core::settings::{OutputFormat, Pacing, RenderSettings};
use montage_core::types::TimeUs;
use montage_render::merge;

pub struct MergeArgs {
    pub request: PathBuf,
    pub output: Option<PathBuf>,
    pub preset: Option<String>,
    pub transition: Option<String>,
    pub window_ms: Option<i64>,
    pub fps: f64,
    pub format: String,
    pub realtime: bool,
}

pub async fn run(args: MergeArgs) -> anyhow::Result<()> {
    let mut request = MergeRequest::load_from_file(&args.request)
        .with_context(|| format!("failed to load request {}", args.request.display()))?;

    if let Some(preset) = &args.preset {
        request.canvas = super::parse_preset(preset)?;
    }
    if let Some(name) = &args.transition {
        request.transition.kind = super::parse_transition(name)?;
    }
    if let Some(ms) = args.window_ms {
        request.transition.window = TimeUs::from_millis(ms);
    }

    let format: OutputFormat = args.format.parse()?;
    let settings = RenderSettings {
        fps: args.fps,
        format,
        pacing: if args.realtime {
            Pacing::Realtime
        } else {
            Pacing::Offline
        },
        ..RenderSettings::default()
    };

    let output = args
        .output
        .unwrap_or_else(|| args.request.with_extension(format.extension()));

    tracing::info!(
        request = %args.request.display(),
        output = %output.display(),
        "merging"
    );

    let result = merge(&request, &settings, |percent| {
        eprint!("\rMerging... {percent:>3.0}%");
        let _ = std::io::stderr().flush();
    })
    .await;
    eprintln!();

    let merged = result.with_context(|| "merge failed")?;
    std::fs::write(&output, &merged.artifact.data)
        .with_context(|| format!("failed to write {}", output.display()))?;

    println!(
        "Wrote {} ({} frames, {}, {} bytes)",
        output.display(),
        merged.frames,
        merged.total_duration,
        merged.artifact.data.len()
    );
    Ok(())
}
