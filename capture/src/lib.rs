//! Frame capture and the face landmark capture loop.
//!
//! A [`CaptureSource`] yields raw frames, a [`FrameConverter`] turns them
//! into packed RGBA, and [`CapturePipeline`] feeds the result through a
//! [`facecap_mediapipe::GraphSolution`] one frame at a time.
//!
//! # Backends
//!
//! - [`TestPatternSource`]: synthetic moving gradient, always available.
//! - `V4l2Source`: Video4Linux2 cameras, behind the `v4l2` feature.

pub mod config;
pub mod convert;
pub mod error;
pub mod pipeline;
pub mod source;
pub mod synthetic;
pub mod worker;

#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use config::{CaptureConfig, PipelineConfig, Throttle, VideoSize};
pub use convert::{ConvertedFrame, FrameConverter, RgbaConverter};
pub use error::{CaptureError, ConfigError, FrameError, PipelineError};
pub use pipeline::{CancelFlag, CapturePipeline, FrameOutcome, RunSummary, StopReason};
pub use source::{CaptureSource, PixelFormat, RawFrame};
pub use synthetic::TestPatternSource;
pub use worker::ProducerThread;

#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Source;
