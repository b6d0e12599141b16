//! facemesh - stream camera frames through the MediaPipe face mesh graph.

mod config;

use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use facecap_capture::{
    CancelFlag, CaptureConfig, CaptureError, CapturePipeline, CaptureSource, FrameOutcome,
    PipelineConfig, PixelFormat, TestPatternSource, Throttle, VideoSize,
};
use facecap_mediapipe::{DirResourceManager, Environment, GraphSolution, NativeApi, SolutionConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

/// Print face mesh landmarks for frames from a camera.
///
/// Frames are captured from /dev/video<CAMERA_INDEX>, converted to RGBA and
/// run through the MediaPipe face mesh graph one at a time. Press Ctrl-C to
/// stop; everything is released before exit.
#[derive(Parser, Debug)]
#[command(name = "facemesh")]
#[command(about = "Print MediaPipe face mesh landmarks for camera frames")]
#[command(version)]
struct Cli {
    /// Index of the camera to use
    camera_index: u32,

    /// Capture width in pixels (requires --height)
    #[arg(long)]
    width: Option<u32>,

    /// Capture height in pixels (requires --width)
    #[arg(long)]
    height: Option<u32>,

    /// Camera pixel format (rgba, rgb24, bgr24, yuyv422, mjpeg)
    #[arg(short = 'f', long)]
    input_format: Option<PixelFormat>,

    /// Capture framerate
    #[arg(long)]
    framerate: Option<u32>,

    /// Load graph assets through a resource manager
    #[arg(long)]
    use_resource_manager: bool,

    /// Asset root for the resource manager (default: current directory)
    #[arg(long)]
    assets: Option<PathBuf>,

    /// Text-format graph config replacing the built-in face mesh graph
    #[arg(long)]
    graph: Option<PathBuf>,

    /// Maximum number of faces to track
    #[arg(long)]
    num_faces: Option<i32>,

    /// Wait for graph output per frame, in milliseconds
    #[arg(long)]
    poll_timeout_ms: Option<u64>,

    /// Process at most this many frames per second (0 = unlimited)
    #[arg(long)]
    max_fps: Option<u32>,

    /// Use a synthetic test pattern instead of a camera
    #[arg(long)]
    test_pattern: bool,

    /// Stop after this many frames
    #[arg(short = 'n', long)]
    frames: Option<u64>,

    /// Output as JSON lines
    #[arg(long)]
    json: bool,

    /// Config file (default is ~/.facecap/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let file = config::load_config(cli.config.as_deref())?;

    let capture_config = CaptureConfig::new(cli.camera_index)
        .with_video_size(video_size(&cli))
        .with_input_format(cli.input_format)
        .with_framerate(cli.framerate);

    let env = Environment::init(native_api(&cli)?, "facemesh").context("initialize mediapipe")?;

    let mut solution = GraphSolution::new(env.clone(), solution_config(&cli, &file)?);
    if cli.use_resource_manager {
        let root = cli
            .assets
            .clone()
            .or_else(|| file.assets.root.clone())
            .unwrap_or_else(|| PathBuf::from("."));
        info!(root = %root.display(), "using resource manager");
        solution = solution.with_resources(Arc::new(DirResourceManager::new(root)));
    }

    let source = open_source(&cli, &capture_config)
        .with_context(|| format!("cannot use camera at index {}", cli.camera_index))?;
    info!(camera = %source.describe(), "using camera");

    let cancel = CancelFlag::global();
    let flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("exiting...");
            flag.cancel();
        }
    });

    let throttle = cli
        .max_fps
        .or(file.pipeline.max_fps)
        .map_or(Throttle::Unlimited, Throttle::MaxFps);
    let mut pipeline = CapturePipeline::new(source, solution)
        .with_config(PipelineConfig::default().with_throttle(throttle))
        .with_cancel_flag(cancel);

    let json = cli.json;
    let limit = cli.frames;
    let summary = tokio::task::spawn_blocking(move || {
        pipeline.run(|index, outcome| {
            report(index, &outcome, json);
            if limit.is_some_and(|n| index + 1 >= n) {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
    })
    .await
    .context("capture task failed")??;

    info!(
        frames = summary.frames,
        detections = summary.detections,
        errors = summary.errors,
        reason = ?summary.reason,
        "done"
    );
    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Both or neither of width and height. A lone dimension is reported and
/// ignored; capture goes on at the device's default size.
fn video_size(cli: &Cli) -> Option<VideoSize> {
    match VideoSize::from_parts(cli.width, cli.height) {
        Ok(size) => size,
        Err(e) => {
            eprintln!("{e}");
            None
        }
    }
}

fn solution_config(cli: &Cli, file: &AppConfig) -> anyhow::Result<SolutionConfig> {
    let num_faces = cli.num_faces.or(file.graph.num_faces).unwrap_or(1);
    let mut config = SolutionConfig::face_mesh(num_faces);
    if let Some(path) = cli.graph.as_ref().or(file.graph.config.as_ref()) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read graph config {}", path.display()))?;
        config = config.with_graph_config(text);
    }
    if let Some(ms) = cli.poll_timeout_ms.or(file.graph.poll_timeout_ms) {
        config = config.with_poll_timeout(Duration::from_millis(ms));
    }
    Ok(config)
}

/// The runtime this binary was built with, if it may serve this run.
fn native_api(cli: &Cli) -> anyhow::Result<Arc<dyn NativeApi>> {
    runtime_check(cfg!(feature = "native"), cfg!(feature = "dry-run"), cli.test_pattern)?;
    runtime()
}

/// Without the native runtime only synthetic frames may be processed, and
/// only in a `dry-run` build.
fn runtime_check(native: bool, dry_run: bool, test_pattern: bool) -> anyhow::Result<()> {
    if native {
        return Ok(());
    }
    if !dry_run {
        anyhow::bail!("built without the native MediaPipe runtime; rebuild with `--features native`");
    }
    if !test_pattern {
        anyhow::bail!(
            "dry-run build has no face detector; only --test-pattern is allowed, rebuild with `--features native` for cameras"
        );
    }
    Ok(())
}

#[cfg(feature = "native")]
fn runtime() -> anyhow::Result<Arc<dyn NativeApi>> {
    Ok(Arc::new(facecap_mediapipe::LinkedApi::new()))
}

#[cfg(all(not(feature = "native"), feature = "dry-run"))]
fn runtime() -> anyhow::Result<Arc<dyn NativeApi>> {
    tracing::warn!("dry run: landmarks come from an in-process stand-in, not MediaPipe");
    Ok(facecap_mediapipe::mock::MockApi::new())
}

#[cfg(not(any(feature = "native", feature = "dry-run")))]
fn runtime() -> anyhow::Result<Arc<dyn NativeApi>> {
    anyhow::bail!("no MediaPipe runtime compiled in")
}

fn open_source(cli: &Cli, config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    if cli.test_pattern {
        return Ok(Box::new(TestPatternSource::from_config(config)?));
    }
    open_camera(config)
}

#[cfg(feature = "v4l2")]
fn open_camera(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Ok(Box::new(facecap_capture::V4l2Source::open(config)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_camera(config: &CaptureConfig) -> Result<Box<dyn CaptureSource>, CaptureError> {
    Err(CaptureError::Open {
        device_index: config.device_index(),
        reason: "built without v4l2 support, use --test-pattern".into(),
    })
}

fn report(index: u64, outcome: &FrameOutcome, json: bool) {
    match outcome {
        Err(e) if !json => eprintln!("frame {index}: {e}"),
        _ => println!("{}", format_outcome(index, outcome, json)),
    }
}

fn format_outcome(index: u64, outcome: &FrameOutcome, json: bool) -> String {
    if json {
        let value = match outcome {
            Ok(set) => serde_json::json!({
                "frame": index,
                "faces": set.as_ref().map(|s| &s.faces),
            }),
            Err(e) => serde_json::json!({ "frame": index, "error": e.to_string() }),
        };
        return value.to_string();
    }
    match outcome {
        Ok(Some(set)) => format!(
            "Got a list of {} landmarks at frame {index}",
            set.faces.first().map_or(0, |face| face.len())
        ),
        Ok(None) => "Got null landmarks".to_string(),
        Err(e) => format!("frame {index}: {e}"),
    }
}
