use facecap_mediapipe::MediapipeError;
use thiserror::Error;

/// Errors from capture sources and frame converters.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture: cannot open camera at index {device_index}: {reason}")]
    Open { device_index: u32, reason: String },

    #[error("capture: device: {0}")]
    Device(String),

    #[error("capture: convert: {0}")]
    Convert(String),

    /// The source has no more frames to give.
    #[error("capture: end of stream")]
    EndOfStream,

    #[error("capture: source is stopped")]
    Closed,
}

/// Invalid capture settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("capture: specifying width requires specifying height")]
    MissingHeight,

    #[error("capture: specifying height requires specifying width")]
    MissingWidth,

    #[error("capture: video size {width}x{height} has a zero dimension")]
    EmptyVideoSize { width: u32, height: u32 },

    #[error("capture: unknown pixel format {0:?}")]
    UnknownPixelFormat(String),
}

/// Errors that end a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("capture: graph failed to start: {0}")]
    Startup(#[source] MediapipeError),

    #[error("capture: frame acquisition failed: {0}")]
    Capture(#[source] CaptureError),

    #[error("capture: pipeline already torn down")]
    Closed,
}

/// A failure confined to one frame; the loop may go on.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("capture: convert frame: {0}")]
    Convert(#[source] CaptureError),

    #[error("capture: build frame buffer: {0}")]
    Frame(#[source] MediapipeError),

    #[error("capture: compute: {0}")]
    Compute(#[source] MediapipeError),
}
