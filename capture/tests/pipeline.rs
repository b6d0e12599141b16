use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use facecap_capture::{
    CancelFlag, CaptureError, CapturePipeline, CaptureSource, ConvertedFrame, FrameConverter,
    FrameError, PipelineConfig, PipelineError, PixelFormat, RawFrame, RgbaConverter, StopReason,
    TestPatternSource, Throttle,
};
use facecap_mediapipe::mock::{MockApi, MockCall};
use facecap_mediapipe::{Environment, GraphSolution, HandleKind, MediapipeError, StatusCode};
use parking_lot::{Mutex, MutexGuard};

type Log = Arc<Mutex<Vec<&'static str>>>;

fn setup() -> (MutexGuard<'static, ()>, Arc<MockApi>, Arc<Environment>) {
    let guard = facecap_mediapipe::test_lock();
    let mock = MockApi::new();
    let env = Environment::init(mock.clone(), "pipeline-test").unwrap();
    (guard, mock, env)
}

fn rgba(width: u32, height: u32, value: u8) -> RawFrame {
    RawFrame {
        width,
        height,
        format: PixelFormat::Rgba,
        stride: width as usize * 4,
        data: vec![value; (width * height * 4) as usize],
    }
}

/// Plays back a fixed list of frames, then reports the device as gone.
struct ScriptedSource {
    frames: VecDeque<RawFrame>,
    log: Log,
    fail_stop: bool,
    stops: usize,
}

impl ScriptedSource {
    fn new(frames: Vec<RawFrame>, log: Log) -> Self {
        Self {
            frames: frames.into(),
            log,
            fail_stop: false,
            stops: 0,
        }
    }
}

impl CaptureSource for ScriptedSource {
    fn get_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stops > 0 {
            return Err(CaptureError::Closed);
        }
        self.frames
            .pop_front()
            .ok_or_else(|| CaptureError::Device("device unplugged".into()))
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.stops += 1;
        self.log.lock().push("source");
        if self.fail_stop {
            return Err(CaptureError::Device("stop failed".into()));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "scripted".into()
    }
}

struct RecordingConverter {
    inner: RgbaConverter,
    log: Log,
}

impl FrameConverter for RecordingConverter {
    fn convert(&mut self, raw: &RawFrame) -> Result<ConvertedFrame<'_>, CaptureError> {
        self.inner.convert(raw)
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        self.log.lock().push("converter");
        self.inner.close()
    }
}

/// Pipeline whose converter, graph and source all record their release.
fn recorded_pipeline(
    mock: &Arc<MockApi>,
    env: &Arc<Environment>,
    source: ScriptedSource,
    log: &Log,
) -> CapturePipeline {
    let graph_log = log.clone();
    mock.set_observer(move |call| {
        if matches!(call, MockCall::GraphClose) {
            graph_log.lock().push("graph");
        }
    });
    let conv_log = log.clone();
    CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone())).with_converter_factory(
        move |raw| {
            Box::new(RecordingConverter {
                inner: RgbaConverter::for_frame(raw),
                log: conv_log.clone(),
            }) as Box<dyn FrameConverter>
        },
    )
}

#[test]
fn device_error_after_five_frames() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let frames = (0..5).map(|_| rgba(8, 8, 120)).collect();
    let mut pipeline = recorded_pipeline(&mock, &env, ScriptedSource::new(frames, log.clone()), &log);

    let mut seen = Vec::new();
    let err = pipeline
        .run(|index, outcome| {
            seen.push((index, outcome.map(|set| set.map(|s| s.face_count()))));
            ControlFlow::Continue(())
        })
        .unwrap_err();

    assert!(matches!(err, PipelineError::Capture(CaptureError::Device(_))));
    assert_eq!(seen.len(), 5);
    for (i, (index, outcome)) in seen.iter().enumerate() {
        assert_eq!(*index, i as u64);
        assert_eq!(outcome.as_ref().ok(), Some(&Some(1)));
    }
    assert!(pipeline.is_torn_down());
    assert_eq!(*log.lock(), vec!["converter", "graph", "source"]);
    assert_eq!(mock.release_count(HandleKind::Graph), 1);
    assert_eq!(mock.live_objects(), 0);
    assert_eq!(mock.double_frees(), 0);
}

#[test]
fn no_face_is_reported_and_loop_continues() {
    let (_guard, mock, env) = setup();
    mock.set_detector(|_| None);
    let source = TestPatternSource::new(16, 8, PixelFormat::Yuyv)
        .unwrap()
        .with_limit(Some(3));
    let mut pipeline = CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone()));

    let mut outcomes = Vec::new();
    let summary = pipeline
        .run(|_, outcome| {
            outcomes.push(outcome.is_ok_and(|set| set.is_none()));
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(outcomes, vec![true, true, true]);
    assert_eq!(summary.frames, 3);
    assert_eq!(summary.detections, 0);
    assert_eq!(summary.errors, 0);
    assert_eq!(summary.reason, StopReason::EndOfStream);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn cancellation_finishes_current_frame_then_tears_down_in_order() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let frames = (0..10).map(|_| rgba(4, 4, 50)).collect();
    let mut source = ScriptedSource::new(frames, log.clone());
    source.fail_stop = true;
    let cancel = CancelFlag::new();
    let mut pipeline =
        recorded_pipeline(&mock, &env, source, &log).with_cancel_flag(cancel.clone());

    let mut completed = 0;
    let summary = pipeline
        .run(|index, outcome| {
            assert!(outcome.is_ok());
            completed += 1;
            if index == 2 {
                cancel.cancel();
            }
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(summary.frames, 3);
    assert_eq!(completed, 3);
    // A failing source stop is logged, not raised, and nothing is skipped.
    assert_eq!(*log.lock(), vec!["converter", "graph", "source"]);
    assert_eq!(mock.injected_timestamps().len(), 3);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn cancel_during_compute_still_reports_frame() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let frames = (0..5).map(|_| rgba(4, 4, 80)).collect();
    let cancel = CancelFlag::new();
    let mut pipeline = recorded_pipeline(&mock, &env, ScriptedSource::new(frames, log.clone()), &log)
        .with_cancel_flag(cancel.clone());

    // Raise the flag while the graph is still holding the first frame.
    let graph_log = log.clone();
    let mid_compute = cancel.clone();
    mock.set_observer(move |call| match call {
        MockCall::AddPacket { .. } => mid_compute.cancel(),
        MockCall::GraphClose => graph_log.lock().push("graph"),
        _ => {}
    });

    let mut outcomes = Vec::new();
    let summary = pipeline
        .run(|index, outcome| {
            outcomes.push((index, outcome.map(|set| set.map(|s| s.face_count()))));
            ControlFlow::Continue(())
        })
        .unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].0, 0);
    assert_eq!(outcomes[0].1.as_ref().ok(), Some(&Some(1)));
    assert_eq!(summary.frames, 1);
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert_eq!(*log.lock(), vec!["converter", "graph", "source"]);
    assert_eq!(mock.injected_timestamps().len(), 1);
    assert_eq!(mock.release_count(HandleKind::Graph), 1);
    assert_eq!(mock.live_objects(), 0);
    assert_eq!(mock.double_frees(), 0);
}

#[test]
fn zero_sized_frame_is_reported_not_fatal() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let empty = RawFrame {
        width: 0,
        height: 2,
        format: PixelFormat::Rgba,
        stride: 0,
        data: Vec::new(),
    };
    let mut pipeline = recorded_pipeline(&mock, &env, ScriptedSource::new(vec![empty], log.clone()), &log);

    let mut errors = Vec::new();
    let err = pipeline
        .run(|_, outcome| {
            errors.push(matches!(outcome, Err(FrameError::Convert(CaptureError::Convert(_)))));
            ControlFlow::Continue(())
        })
        .unwrap_err();

    assert_eq!(errors, vec![true]);
    assert!(matches!(err, PipelineError::Capture(CaptureError::Device(_))));
    assert_eq!(*log.lock(), vec!["converter", "graph", "source"]);
    assert_eq!(mock.injected_timestamps().len(), 0);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn teardown_twice_makes_no_foreign_calls() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let frames = vec![rgba(4, 4, 1)];
    let mut pipeline = recorded_pipeline(&mock, &env, ScriptedSource::new(frames, log.clone()), &log);
    let _ = pipeline.run(|_, _| ControlFlow::Continue(()));

    let calls = mock.calls().len();
    pipeline.teardown();
    pipeline.teardown();
    drop(pipeline);
    assert_eq!(mock.calls().len(), calls);
    assert_eq!(log.lock().len(), 3);
    assert_eq!(mock.release_count(HandleKind::Graph), 1);
}

#[test]
fn drop_without_run_releases_everything() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    let pipeline = recorded_pipeline(&mock, &env, ScriptedSource::new(Vec::new(), log.clone()), &log);
    drop(pipeline);
    // No converter was ever built and the graph never started.
    assert_eq!(*log.lock(), vec!["source"]);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn callback_break_stops() {
    let (_guard, mock, env) = setup();
    let source = TestPatternSource::new(8, 8, PixelFormat::Rgb24).unwrap();
    let mut pipeline = CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone()));
    let summary = pipeline
        .run(|index, _| {
            if index == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
    assert_eq!(summary.reason, StopReason::Stopped);
    assert_eq!(summary.frames, 5);
    assert_eq!(summary.detections, 5);
    assert_eq!(mock.live_objects(), 0);

    assert!(matches!(
        pipeline.run(|_, _| ControlFlow::Continue(())),
        Err(PipelineError::Closed)
    ));
}

#[test]
fn per_frame_errors_go_to_callback() {
    let (_guard, mock, env) = setup();
    let log: Log = Arc::default();
    // The second frame changes size, which the converter rejects.
    let frames = vec![rgba(4, 4, 9), rgba(8, 4, 9), rgba(4, 4, 9)];
    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedSource::new(frames, log.clone())),
        GraphSolution::face_mesh(env.clone()),
    );

    let mut kinds = Vec::new();
    let err = pipeline
        .run(|_, outcome| {
            kinds.push(match outcome {
                Ok(Some(_)) => "landmarks",
                Ok(None) => "none",
                Err(FrameError::Convert(_)) => "convert",
                Err(_) => "other",
            });
            if kinds.len() == 2 {
                mock.set_fail_inject(Some(StatusCode::Internal));
            }
            ControlFlow::Continue(())
        })
        .unwrap_err();

    assert!(matches!(err, PipelineError::Capture(_)));
    assert_eq!(kinds, vec!["landmarks", "convert", "other"]);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn inject_failure_is_compute_error() {
    let (_guard, mock, env) = setup();
    mock.set_fail_inject(Some(StatusCode::FailedPrecondition));
    let source = TestPatternSource::new(4, 4, PixelFormat::Rgba)
        .unwrap()
        .with_limit(Some(2));
    let mut pipeline = CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone()));

    let mut errors = 0;
    let summary = pipeline
        .run(|_, outcome| {
            if let Err(FrameError::Compute(MediapipeError::Inject { status, .. })) = outcome {
                assert_eq!(status.status_code(), StatusCode::FailedPrecondition);
                errors += 1;
            }
            ControlFlow::Continue(())
        })
        .unwrap();
    assert_eq!(errors, 2);
    assert_eq!(summary.errors, 2);
}

#[test]
fn startup_failure_aborts_and_tears_down() {
    let (_guard, mock, env) = setup();
    mock.set_fail_start(Some(StatusCode::Internal));
    let log: Log = Arc::default();
    let mut pipeline = CapturePipeline::new(
        Box::new(ScriptedSource::new(vec![rgba(4, 4, 1)], log.clone())),
        GraphSolution::face_mesh(env.clone()),
    );
    let mut called = false;
    let err = pipeline
        .run(|_, _| {
            called = true;
            ControlFlow::Continue(())
        })
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Startup(MediapipeError::GraphInit { stage: "start run", .. })
    ));
    assert!(!called);
    assert_eq!(*log.lock(), vec!["source"]);
    assert_eq!(mock.live_objects(), 0);
}

#[test]
fn max_fps_throttles_loop() {
    let (_guard, _mock, env) = setup();
    let source = TestPatternSource::new(4, 4, PixelFormat::Rgba)
        .unwrap()
        .with_limit(Some(5));
    let mut pipeline = CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone()))
        .with_config(PipelineConfig::default().with_throttle(Throttle::MaxFps(50)));

    let start = Instant::now();
    let summary = pipeline.run(|_, _| ControlFlow::Continue(())).unwrap();
    assert_eq!(summary.frames, 5);
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[tokio::test]
async fn cancel_from_async_task() {
    let (_guard, mock, env) = setup();
    let source = TestPatternSource::new(16, 16, PixelFormat::Rgb24).unwrap();
    let cancel = CancelFlag::new();
    let mut pipeline = CapturePipeline::new(Box::new(source), GraphSolution::face_mesh(env.clone()))
        .with_config(PipelineConfig::default().with_throttle(Throttle::MaxFps(200)))
        .with_cancel_flag(cancel.clone());

    let run = tokio::task::spawn_blocking(move || pipeline.run(|_, _| ControlFlow::Continue(())));
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();

    let summary = run.await.unwrap().unwrap();
    assert_eq!(summary.reason, StopReason::Cancelled);
    assert!(summary.frames > 0);
    assert_eq!(mock.live_objects(), 0);
}
