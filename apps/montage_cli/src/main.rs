//! montage: merge video clips, stills and music into one video.
//!
//! Usage:
//!   montage init <OUT> <MEDIA>...   Write a merge request for the given files
//!   montage merge <REQUEST>         Render a merge request
//!   montage transitions             List the available transitions
//!   montage check                   Check for ffmpeg/ffprobe

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "montage",
    about = "Merge clips, stills and music into a single video",
    version
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a merge request listing media files in order
    Init {
        /// Request file to write (".montage" is appended if missing)
        output: PathBuf,

        /// Video clips and still images, in timeline order
        #[arg(required = true)]
        media: Vec<PathBuf>,

        /// Background music track (repeatable)
        #[arg(short, long)]
        music: Vec<PathBuf>,

        /// Canvas preset: wide|portrait|square
        #[arg(long, default_value = "portrait")]
        preset: String,

        /// Transition between clips
        #[arg(short, long, default_value = "none")]
        transition: String,
    },

    /// Render a merge request to a video file
    Merge {
        /// Path to the merge request
        request: PathBuf,

        /// Output file (defaults to the request path with the format's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Override the canvas: wide|portrait|square
        #[arg(long)]
        preset: Option<String>,

        /// Override the transition
        #[arg(short, long)]
        transition: Option<String>,

        /// Transition length in milliseconds
        #[arg(long)]
        window_ms: Option<i64>,

        /// Output frame rate
        #[arg(long, default_value = "30")]
        fps: f64,

        /// Output format: webm|mp4
        #[arg(long, default_value = "webm")]
        format: String,

        /// Tick the render loop from the wall clock instead of as fast as possible
        #[arg(long)]
        realtime: bool,
    },

    /// List available transitions
    Transitions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that ffmpeg and ffprobe are installed
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init {
            output,
            media,
            music,
            preset,
            transition,
        } => commands::init::run(output, media, music, preset, transition).await,
        Commands::Merge {
            request,
            output,
            preset,
            transition,
            window_ms,
            fps,
            format,
            realtime,
        } => {
            commands::merge::run(commands::merge::MergeArgs {
                request,
                output,
                preset,
                transition,
                window_ms,
                fps,
                format,
                realtime,
            })
            .await
        }
        Commands::Transitions { json } => commands::transitions::run(json),
        Commands::Check => commands::check::run(),
    }
}
