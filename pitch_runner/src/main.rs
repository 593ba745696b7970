mod detections;
mod output;
mod video_io;

use anyhow::Context;
use clap::Parser;
use detections::DetectionLog;
use output::{DetectionCsv, OutputPaths, RunSink};
use pitch_vision::PipelineConfig;
use pitch_vision::calibration::{self, HSV_RANGES_FILE};
use pitch_vision::pipeline::{FrameProcessor, RunSummary, VideoProcessor};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use video_io::{Preview, VideoInput, VideoOutput};

const PREVIEW_WINDOW: &str = "pitch_vision";

#[derive(Parser, Debug)]
#[command(name = "pitch_runner")]
#[command(about = "Render team-colored pitch occupancy heatmaps from a match video and its detections")]
struct Args {
    /// Match video to process
    input_video: PathBuf,

    /// Top-down image of the pitch
    layout_image: PathBuf,

    /// JSON-lines detection log for the video
    detections: PathBuf,

    /// Base directory; outputs go to <output_dir>/<video name>/
    #[arg(long, default_value = "outputs")]
    output_dir: PathBuf,

    /// Pipeline config (JSON); defaults are used for missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Team HSV ranges (JSON); defaults to hsv_ranges.json in the output directory
    #[arg(long)]
    hsv_ranges: Option<PathBuf>,

    /// Camera-to-layout homography (JSON 3x3); defaults to h_matrix.json in the output directory
    #[arg(long)]
    homography: Option<PathBuf>,

    /// Camera/layout point pairs (JSON) to estimate the homography from
    #[arg(long)]
    correspondences: Option<PathBuf>,

    /// Show the composite while processing; press q to stop
    #[arg(long)]
    display: bool,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pitch_vision={level},pitch_runner={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level);

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = {
        let stop = stop.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after the current frame");
                stop.store(true, Ordering::SeqCst);
            }
        })
    };

    let result = tokio::task::spawn_blocking(move || run(args, stop))
        .await
        .context("processing task panicked")?;
    watcher.abort();

    match result {
        Ok(summary) => {
            info!(
                "Done: {} frame(s) processed ({})",
                summary.frames_processed, summary.stop_reason
            );
            for path in &summary.overlay_paths {
                info!("Heatmap overlay: {}", path.display());
            }
            Ok(())
        }
        Err(err) => {
            error!("{:#}", err);
            std::process::exit(1);
        }
    }
}

fn run(args: Args, stop: Arc<AtomicBool>) -> anyhow::Result<RunSummary> {
    // --- 1. Configuration & Calibration ---
    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let paths = OutputPaths::create(&args.output_dir, &args.input_video)?;

    let classifier = calibration::resolve_classifier(args.hsv_ranges.as_deref(), &paths.dir)
        .context("team color calibration is required")?;
    if args.hsv_ranges.is_some() {
        calibration::save_hsv_ranges(paths.dir.join(HSV_RANGES_FILE), classifier.ranges())?;
    }
    let homography = calibration::resolve_homography(
        args.homography.as_deref(),
        args.correspondences.as_deref(),
        &paths.dir,
    )?;

    let layout = image::open(&args.layout_image)
        .with_context(|| format!("loading layout image {}", args.layout_image.display()))?
        .to_rgb8();

    // --- 2. Video I/O Initialization ---
    let mut input = VideoInput::open(&args.input_video)?;
    let processor = FrameProcessor::new(config, classifier, homography, layout)?;
    let canvas = processor.canvas_size();
    info!(
        "Input at {:.2} fps, {} frame(s); composite is {}x{}",
        input.fps(),
        input
            .frame_count()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string()),
        canvas.0,
        canvas.1
    );

    let video = VideoOutput::create(&paths.composite_video, input.fps(), canvas)?;
    let csv = DetectionCsv::create(&paths.detections_csv)?;
    let preview = if args.display { Some(Preview::open(PREVIEW_WINDOW)?) } else { None };
    let mut sink = RunSink::new(video, csv, preview, stop.clone());
    let mut detector = DetectionLog::open(&args.detections)?;

    // --- 3. Main Processing Loop ---
    let mut runner = VideoProcessor::new(processor).with_total_frames(input.frame_count());
    let summary = runner.run(&mut input, &mut detector, &mut sink, &stop, &paths.dir)?;
    info!("Composite video saved to {}", paths.composite_video.display());
    Ok(summary)
}
