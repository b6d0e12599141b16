//! Single-frame inference over a calculator graph.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::api::SidePacket;
use crate::env::Environment;
use crate::error::MediapipeError;
use crate::graph::CalculatorGraph;
use crate::image_frame::FrameBuffer;
use crate::landmark::LandmarkSet;
use crate::packet::Packet;
use crate::resource::ResourceManager;
use crate::status::Status;

/// CPU face mesh graph: one image stream in, landmark lists out.
pub const FACE_MESH_CPU_GRAPH: &str = r#"# Face mesh on CPU.
input_stream: "input_video"
output_stream: "multi_face_landmarks"
input_side_packet: "num_faces"

node {
  calculator: "FlowLimiterCalculator"
  input_stream: "input_video"
  input_stream: "FINISHED:multi_face_landmarks"
  input_stream_info: { tag_index: "FINISHED" back_edge: true }
  output_stream: "throttled_input_video"
}

node {
  calculator: "FaceLandmarkFrontCpu"
  input_stream: "IMAGE:throttled_input_video"
  input_side_packet: "NUM_FACES:num_faces"
  output_stream: "LANDMARKS:multi_face_landmarks"
  output_stream: "ROIS_FROM_LANDMARKS:face_rects_from_landmarks"
  output_stream: "DETECTIONS:face_detections"
  output_stream: "ROIS_FROM_DETECTIONS:face_rects_from_detections"
}
"#;

/// Model files the face mesh graph opens.
pub const FACE_MESH_ASSETS: &[&str] = &[
    "mediapipe/modules/face_detection/face_detection_short_range.tflite",
    "mediapipe/modules/face_landmark/face_landmark.tflite",
];

/// Default wait for an output packet after each input.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Lifecycle of a [`GraphSolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionState {
    Created,
    Running,
    Closed,
}

impl fmt::Display for SolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Which graph to run and how to talk to it.
#[derive(Debug, Clone)]
pub struct SolutionConfig {
    /// Text-format `CalculatorGraphConfig`.
    pub graph_config: String,
    pub input_stream: String,
    pub output_stream: String,
    pub side_packets: Vec<SidePacket>,
    /// Assets loaded through the resource manager at start, if one is set.
    pub assets: Vec<String>,
    /// Upper bound on the wait for an output packet per frame.
    pub poll_timeout: Duration,
}

impl SolutionConfig {
    /// Face mesh preset tracking up to `num_faces` faces.
    pub fn face_mesh(num_faces: i32) -> Self {
        Self {
            graph_config: FACE_MESH_CPU_GRAPH.to_string(),
            input_stream: "input_video".to_string(),
            output_stream: "multi_face_landmarks".to_string(),
            side_packets: vec![SidePacket::int("num_faces", num_faces)],
            assets: FACE_MESH_ASSETS.iter().map(|s| s.to_string()).collect(),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }

    pub fn with_graph_config(mut self, text: String) -> Self {
        self.graph_config = text;
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

impl Default for SolutionConfig {
    fn default() -> Self {
        Self::face_mesh(1)
    }
}

/// Strictly increasing packet timestamps, in microseconds since the first frame.
#[derive(Debug, Default)]
struct TimestampClock {
    origin: Option<Instant>,
    last: Option<i64>,
}

impl TimestampClock {
    fn next(&mut self) -> i64 {
        let elapsed = self.origin.get_or_insert_with(Instant::now).elapsed();
        let now = i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX);
        let ts = match self.last {
            Some(prev) if now <= prev => prev + 1,
            _ => now,
        };
        self.last = Some(ts);
        ts
    }
}

/// Owns one calculator graph and runs frames through it one at a time.
///
/// `Created --start()--> Running --close()--> Closed`. `close` is valid in
/// every state and idempotent; `Closed` is terminal.
pub struct GraphSolution {
    // Declared before `env` so the graph is deleted before the runtime shuts down.
    graph: Option<CalculatorGraph>,
    env: Arc<Environment>,
    config: SolutionConfig,
    resources: Option<Arc<dyn ResourceManager>>,
    state: SolutionState,
    clock: TimestampClock,
}

impl GraphSolution {
    pub fn new(env: Arc<Environment>, config: SolutionConfig) -> Self {
        Self {
            graph: None,
            env,
            config,
            resources: None,
            state: SolutionState::Created,
            clock: TimestampClock::default(),
        }
    }

    /// Face mesh with the default preset.
    pub fn face_mesh(env: Arc<Environment>) -> Self {
        Self::new(env, SolutionConfig::face_mesh(1))
    }

    pub fn with_resources(mut self, resources: Arc<dyn ResourceManager>) -> Self {
        self.resources = Some(resources);
        self
    }

    pub fn state(&self) -> SolutionState {
        self.state
    }

    pub fn config(&self) -> &SolutionConfig {
        &self.config
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// Builds the graph and starts it.
    ///
    /// On failure the partially built graph is released and the solution
    /// stays `Created`.
    pub fn start(&mut self) -> Result<(), MediapipeError> {
        match self.state {
            SolutionState::Running => return Ok(()),
            SolutionState::Closed => return Err(MediapipeError::Closed),
            SolutionState::Created => {}
        }

        let mut graph = CalculatorGraph::new(self.env.api(), &self.config.graph_config)
            .map_err(|e| init_error("parse graph config", e))?;

        match &self.resources {
            Some(resources) => {
                for asset in &self.config.assets {
                    let data = resources.read(asset)?;
                    graph
                        .register_asset(asset, &data)
                        .map_err(|e| init_error("register asset", e))?;
                    debug!(asset, bytes = data.len(), "mediapipe: asset registered");
                }
            }
            None => info!("mediapipe: no resource manager in use, graph resolves assets itself"),
        }

        graph
            .observe_output(&self.config.output_stream)
            .map_err(|e| init_error("observe output stream", e))?;
        graph
            .start_run(&self.config.side_packets)
            .map_err(|e| init_error("start run", e))?;

        self.graph = Some(graph);
        self.state = SolutionState::Running;
        info!(
            input = %self.config.input_stream,
            output = %self.config.output_stream,
            "mediapipe: graph running"
        );
        Ok(())
    }

    /// Runs one frame through the graph.
    ///
    /// `Ok(None)` means no detection this frame: no output arrived within
    /// the poll timeout, the packet was empty, or it held no faces.
    pub fn compute(&mut self, frame: FrameBuffer) -> Result<Option<LandmarkSet>, MediapipeError> {
        if self.state != SolutionState::Running {
            return Err(MediapipeError::NotRunning(self.state));
        }
        let graph = self
            .graph
            .as_mut()
            .ok_or(MediapipeError::NotRunning(self.state))?;

        let timestamp_us = self.clock.next();
        let packet = Packet::from_frame(self.env.api(), frame, timestamp_us)?;
        let status = graph.add_packet(&self.config.input_stream, packet)?;
        if !status.is_ok() {
            return Err(MediapipeError::Inject {
                timestamp_us,
                status,
            });
        }

        let Some(mut output) = graph.poll_output(&self.config.output_stream, self.config.poll_timeout)?
        else {
            debug!(timestamp_us, "mediapipe: no output packet");
            return Ok(None);
        };

        let result = if output.is_empty()? {
            None
        } else {
            Some(output.landmark_set()?).filter(|set| !set.is_empty())
        };
        output.release();
        debug!(
            timestamp_us,
            faces = result.as_ref().map_or(0, |s| s.face_count()),
            "mediapipe: frame computed"
        );
        Ok(result)
    }

    /// Closes and deletes the graph. Returns the close status; calls after
    /// the first make no foreign calls and return OK.
    pub fn close(&mut self) -> Status {
        if self.state == SolutionState::Closed {
            return Status::OK;
        }
        self.state = SolutionState::Closed;
        let status = self
            .graph
            .take()
            .and_then(|mut graph| graph.close())
            .unwrap_or(Status::OK);
        info!(%status, "mediapipe: graph closed");
        status
    }
}

impl fmt::Debug for GraphSolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphSolution")
            .field("state", &self.state)
            .field("input_stream", &self.config.input_stream)
            .field("output_stream", &self.config.output_stream)
            .finish()
    }
}

/// Tags a startup status failure with the stage that produced it.
fn init_error(stage: &'static str, err: MediapipeError) -> MediapipeError {
    match err {
        MediapipeError::Status { status, .. } => MediapipeError::GraphInit { stage, status },
        other => other,
    }
}
