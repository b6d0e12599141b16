//! The steady-state capture loop.
//!
//! Each iteration checks for cancellation, paces itself, pulls one raw frame,
//! converts it to RGBA, runs it through the graph and hands the outcome to
//! the caller. Teardown releases the converter, the graph and the capture
//! source, in that order, exactly once.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use facecap_mediapipe::{FrameBuffer, GraphSolution, ImageFormat, LandmarkSet};
use once_cell::sync::Lazy;
use tracing::{debug, info, warn};

use crate::config::{PipelineConfig, Throttle};
use crate::convert::{FrameConverter, RgbaConverter};
use crate::error::{CaptureError, FrameError, PipelineError};
use crate::source::{CaptureSource, RawFrame};

static GLOBAL_CANCEL: Lazy<CancelFlag> = Lazy::new(CancelFlag::new);

/// Shared stop request, checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide flag, e.g. for a Ctrl-C handler.
    pub fn global() -> Self {
        GLOBAL_CANCEL.clone()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one frame as seen by the callback.
pub type FrameOutcome = Result<Option<LandmarkSet>, FrameError>;

/// Why a run ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cancel flag was set.
    Cancelled,
    /// The callback asked to stop.
    Stopped,
    /// The source ran out of frames.
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub detections: u64,
    pub errors: u64,
    pub reason: StopReason,
}

type ConverterFactory = dyn FnMut(&RawFrame) -> Box<dyn FrameConverter> + Send;

fn rgba_converter(raw: &RawFrame) -> Box<dyn FrameConverter> {
    Box::new(RgbaConverter::for_frame(raw))
}

/// Spaces iteration starts by at least the throttle interval.
struct Pacer {
    interval: Option<Duration>,
    next: Option<Instant>,
}

impl Pacer {
    fn new(throttle: Throttle) -> Self {
        Self {
            interval: throttle.min_interval(),
            next: None,
        }
    }

    fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        if let Some(next) = self.next {
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            }
        }
        self.next = Some(Instant::now() + interval);
    }
}

/// Drives frames from a capture source through a graph solution.
pub struct CapturePipeline {
    converter: Option<Box<dyn FrameConverter>>,
    solution: Option<GraphSolution>,
    source: Option<Box<dyn CaptureSource>>,
    make_converter: Box<ConverterFactory>,
    config: PipelineConfig,
    cancel: CancelFlag,
    next_index: u64,
    torn_down: bool,
}

impl CapturePipeline {
    pub fn new(source: Box<dyn CaptureSource>, solution: GraphSolution) -> Self {
        Self {
            converter: None,
            solution: Some(solution),
            source: Some(source),
            make_converter: Box::new(rgba_converter),
            config: PipelineConfig::default(),
            cancel: CancelFlag::new(),
            next_index: 0,
            torn_down: false,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replaces the converter built from the first frame.
    pub fn with_converter_factory<F>(mut self, factory: F) -> Self
    where
        F: FnMut(&RawFrame) -> Box<dyn FrameConverter> + Send + 'static,
    {
        self.make_converter = Box::new(factory);
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// Runs the loop until cancellation, the callback breaks, the source
    /// ends or capture fails. Tears the pipeline down before returning.
    ///
    /// `on_result` receives every frame's outcome with an index counting up
    /// from 0. Per-frame failures are passed to it and do not end the run.
    pub fn run<F>(&mut self, mut on_result: F) -> Result<RunSummary, PipelineError>
    where
        F: FnMut(u64, FrameOutcome) -> ControlFlow<()>,
    {
        let result = self.run_loop(&mut on_result);
        match &result {
            Ok(summary) => info!(
                frames = summary.frames,
                detections = summary.detections,
                errors = summary.errors,
                reason = ?summary.reason,
                "capture: run finished"
            ),
            Err(e) => warn!(error = %e, "capture: run failed"),
        }
        self.teardown();
        result
    }

    fn run_loop<F>(&mut self, on_result: &mut F) -> Result<RunSummary, PipelineError>
    where
        F: FnMut(u64, FrameOutcome) -> ControlFlow<()>,
    {
        if self.torn_down {
            return Err(PipelineError::Closed);
        }
        let solution = self.solution.as_mut().ok_or(PipelineError::Closed)?;
        solution.start().map_err(PipelineError::Startup)?;
        if let Some(source) = &self.source {
            info!(source = %source.describe(), "capture: pipeline running");
        }

        let mut pacer = Pacer::new(self.config.throttle());
        let mut summary = RunSummary {
            frames: 0,
            detections: 0,
            errors: 0,
            reason: StopReason::Stopped,
        };

        loop {
            if self.cancel.is_cancelled() {
                info!("capture: cancellation requested");
                summary.reason = StopReason::Cancelled;
                return Ok(summary);
            }
            pacer.wait();

            let source = self.source.as_mut().ok_or(PipelineError::Closed)?;
            let raw = match source.get_frame() {
                Ok(raw) => raw,
                Err(CaptureError::EndOfStream) => {
                    summary.reason = StopReason::EndOfStream;
                    return Ok(summary);
                }
                Err(e) => return Err(PipelineError::Capture(e)),
            };

            let outcome = self.process(&raw);
            let index = self.next_index;
            self.next_index += 1;
            summary.frames += 1;
            match &outcome {
                Ok(Some(set)) => {
                    summary.detections += 1;
                    debug!(index, faces = set.face_count(), "capture: landmarks");
                }
                Ok(None) => debug!(index, "capture: no landmarks"),
                Err(e) => {
                    summary.errors += 1;
                    debug!(index, error = %e, "capture: frame failed");
                }
            }

            if on_result(index, outcome).is_break() {
                summary.reason = StopReason::Stopped;
                return Ok(summary);
            }
        }
    }

    fn process(&mut self, raw: &RawFrame) -> FrameOutcome {
        let make_converter = &mut self.make_converter;
        let converter = self.converter.get_or_insert_with(|| (*make_converter)(raw));
        let converted = converter.convert(raw).map_err(FrameError::Convert)?;

        let solution = self
            .solution
            .as_mut()
            .ok_or(FrameError::Compute(facecap_mediapipe::MediapipeError::Closed))?;
        let frame = FrameBuffer::new(
            solution.environment(),
            ImageFormat::Srgba,
            converted.width,
            converted.height,
            converted.stride,
            converted.data,
        )
        .map_err(FrameError::Frame)?;
        solution.compute(frame).map_err(FrameError::Compute)
    }

    /// Releases the converter, the graph and the capture source, in that
    /// order. Failures are logged and do not stop later steps. Calls after
    /// the first do nothing.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut converter) = self.converter.take() {
            if let Err(e) = converter.close() {
                warn!(error = %e, "capture: converter close failed");
            }
        }
        if let Some(mut solution) = self.solution.take() {
            let status = solution.close();
            if !status.is_ok() {
                warn!(%status, "capture: graph close failed");
            }
        }
        if let Some(mut source) = self.source.take() {
            if let Err(e) = source.stop() {
                warn!(error = %e, "capture: source stop failed");
            }
        }
        info!("capture: pipeline torn down");
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("solution", &self.solution)
            .field("config", &self.config)
            .field("next_index", &self.next_index)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}
