//! In-process stand-in for the native runtime.
//!
//! [`MockApi`] implements [`NativeApi`] over a table of fake objects keyed by
//! opaque non-null pointers. It tracks every allocation and release, so
//! tests can assert that nothing leaked, nothing was freed twice and nothing
//! was touched after release. Graph output comes from a pluggable detector.

use std::collections::{HashMap, VecDeque};
use std::os::raw::c_void;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::api::{NativeApi, RawPtr, SidePacket};
use crate::handle::HandleKind;
use crate::image_frame::ImageFormat;
use crate::landmark::{FaceLandmarks, Landmark};
use crate::status::{Status, StatusCode};

/// Landmark count of the face mesh model.
pub const FACE_MESH_POINTS: usize = 468;

/// A foreign call seen by the mock, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    GlogInitialize { name: String },
    GlogShutdown,
    ImageFrameNew { width: i32, height: i32 },
    PacketFromImage { timestamp_us: i64 },
    GraphNew,
    RegisterAsset { name: String, bytes: usize },
    ObserveOutput { stream: String },
    StartRun { side_packets: Vec<SidePacket> },
    AddPacket { stream: String, timestamp_us: i64 },
    PollOutput { stream: String },
    GraphClose,
    Release(HandleKind),
}

type Detector = dyn Fn(&[u8]) -> Option<Vec<FaceLandmarks>> + Send + Sync;
type Observer = dyn Fn(&MockCall) + Send + Sync;

enum Payload {
    Image(Vec<u8>),
    Landmarks(Vec<Vec<u8>>),
}

#[derive(Default)]
struct MockGraph {
    observed: Vec<String>,
    started: bool,
    last_timestamp: Option<i64>,
    outputs: HashMap<String, VecDeque<(i64, Vec<Vec<u8>>)>>,
}

enum Object {
    Status(Status),
    Image(Vec<u8>),
    Packet { timestamp_us: i64, payload: Payload },
    LandmarkList(Vec<Vec<u8>>),
    Graph(MockGraph),
}

impl Object {
    fn kind(&self) -> HandleKind {
        match self {
            Self::Status(_) => HandleKind::Status,
            Self::Image(_) => HandleKind::Image,
            Self::Packet { .. } => HandleKind::Packet,
            Self::LandmarkList(_) => HandleKind::LandmarkList,
            Self::Graph(_) => HandleKind::Graph,
        }
    }
}

#[derive(Default)]
struct State {
    next_id: usize,
    objects: HashMap<usize, Object>,
    released: HashMap<HandleKind, usize>,
    double_frees: usize,
    dangling: usize,
    init_count: usize,
    shutdown_count: usize,
    injected: Vec<i64>,
    calls: Vec<MockCall>,
    fail_init: Option<StatusCode>,
    fail_start: Option<StatusCode>,
    fail_inject: Option<StatusCode>,
    fail_close: Option<StatusCode>,
    lose_list_items: bool,
}

impl State {
    fn alloc(&mut self, object: Object) -> RawPtr {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(id, object);
        std::ptr::without_provenance_mut::<c_void>(id)
    }

    fn status(&mut self, code: StatusCode) -> RawPtr {
        self.alloc(Object::Status(Status::from_code(code)))
    }

    /// Removes an object for deletion, counting frees of unknown pointers.
    fn free(&mut self, raw: RawPtr, kind: HandleKind) {
        match self.objects.remove(&raw.addr()) {
            Some(object) if object.kind() == kind => {
                *self.released.entry(kind).or_default() += 1;
            }
            Some(object) => {
                // Wrong delete function: put it back and flag it.
                self.objects.insert(raw.addr(), object);
                self.dangling += 1;
            }
            None => self.double_frees += 1,
        }
    }

    /// Removes an object whose ownership moves into another object.
    fn take(&mut self, raw: RawPtr, kind: HandleKind) -> Option<Object> {
        match self.objects.get(&raw.addr()) {
            Some(object) if object.kind() == kind => self.objects.remove(&raw.addr()),
            _ => {
                self.dangling += 1;
                None
            }
        }
    }

    fn get(&mut self, raw: RawPtr) -> Option<&Object> {
        if !self.objects.contains_key(&raw.addr()) {
            self.dangling += 1;
        }
        self.objects.get(&raw.addr())
    }

    fn graph(&mut self, raw: RawPtr) -> Option<&mut MockGraph> {
        match self.objects.get_mut(&raw.addr()) {
            Some(Object::Graph(graph)) => Some(graph),
            _ => {
                self.dangling += 1;
                None
            }
        }
    }
}

/// Fake native runtime for tests and dry runs.
pub struct MockApi {
    state: Mutex<State>,
    detector: Mutex<Arc<Detector>>,
    observer: Mutex<Option<Arc<Observer>>>,
}

impl MockApi {
    /// Creates a mock whose detector finds one face in any frame with a
    /// non-zero byte.
    pub fn new() -> Arc<Self> {
        let detector: Arc<Detector> = Arc::new(default_detector);
        Arc::new(Self {
            state: Mutex::new(State::default()),
            detector: Mutex::new(detector),
            observer: Mutex::new(None),
        })
    }

    /// Replaces the detector run on every input image.
    ///
    /// `None` means the graph emits nothing for that frame; `Some` emits one
    /// landmark list per face.
    pub fn set_detector<F>(&self, detector: F)
    where
        F: Fn(&[u8]) -> Option<Vec<FaceLandmarks>> + Send + Sync + 'static,
    {
        let detector: Arc<Detector> = Arc::new(detector);
        *self.detector.lock() = detector;
    }

    /// Calls `observer` for every recorded foreign call.
    pub fn set_observer<F>(&self, observer: F)
    where
        F: Fn(&MockCall) + Send + Sync + 'static,
    {
        let observer: Arc<Observer> = Arc::new(observer);
        *self.observer.lock() = Some(observer);
    }

    pub fn set_fail_init(&self, code: Option<StatusCode>) {
        self.state.lock().fail_init = code;
    }

    pub fn set_fail_start(&self, code: Option<StatusCode>) {
        self.state.lock().fail_start = code;
    }

    pub fn set_fail_inject(&self, code: Option<StatusCode>) {
        self.state.lock().fail_inject = code;
    }

    pub fn set_fail_close(&self, code: Option<StatusCode>) {
        self.state.lock().fail_close = code;
    }

    /// Makes landmark lists report their length but fail every item lookup.
    pub fn set_lose_list_items(&self, lose: bool) {
        self.state.lock().lose_list_items = lose;
    }

    /// Allocates a status object, as a foreign call would return it.
    pub fn make_status(&self, code: StatusCode) -> RawPtr {
        self.state.lock().status(code)
    }

    /// Number of objects allocated and not yet released or handed over.
    pub fn live_objects(&self) -> usize {
        self.state.lock().objects.len()
    }

    pub fn double_frees(&self) -> usize {
        self.state.lock().double_frees
    }

    /// Reads, transfers or mismatched deletes of pointers that were not live.
    pub fn dangling_accesses(&self) -> usize {
        self.state.lock().dangling
    }

    pub fn release_count(&self, kind: HandleKind) -> usize {
        self.state.lock().released.get(&kind).copied().unwrap_or(0)
    }

    pub fn init_count(&self) -> usize {
        self.state.lock().init_count
    }

    pub fn shutdown_count(&self) -> usize {
        self.state.lock().shutdown_count
    }

    /// Timestamps of every packet a graph accepted, in order.
    pub fn injected_timestamps(&self) -> Vec<i64> {
        self.state.lock().injected.clone()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    fn record(&self, call: MockCall) {
        self.state.lock().calls.push(call.clone());
        let observer = self.observer.lock().clone();
        if let Some(observer) = observer {
            (*observer)(&call);
        }
    }

    fn release(&self, raw: RawPtr, kind: HandleKind) {
        self.state.lock().free(raw, kind);
        self.record(MockCall::Release(kind));
    }
}

fn default_detector(pixels: &[u8]) -> Option<Vec<FaceLandmarks>> {
    if pixels.iter().all(|&b| b == 0) {
        return None;
    }
    // A 22-column grid over the middle of the image.
    let points = (0..FACE_MESH_POINTS)
        .map(|i| {
            let col = (i % 22) as f32 / 21.0;
            let row = (i / 22) as f32 / 21.0;
            Landmark::new(0.3 + 0.4 * col, 0.3 + 0.4 * row, 0.0)
        })
        .collect();
    Some(vec![FaceLandmarks(points)])
}

impl NativeApi for MockApi {
    fn glog_initialize(&self, name: &str) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            match state.fail_init {
                Some(code) => state.status(code),
                None => {
                    state.init_count += 1;
                    state.status(StatusCode::Ok)
                }
            }
        };
        self.record(MockCall::GlogInitialize {
            name: name.to_string(),
        });
        status
    }

    fn glog_shutdown(&self) {
        self.state.lock().shutdown_count += 1;
        self.record(MockCall::GlogShutdown);
    }

    unsafe fn status_ok(&self, status: RawPtr) -> bool {
        match self.state.lock().get(status) {
            Some(Object::Status(s)) => s.is_ok(),
            _ => false,
        }
    }

    unsafe fn status_raw_code(&self, status: RawPtr) -> i32 {
        match self.state.lock().get(status) {
            Some(Object::Status(s)) => s.code(),
            _ => StatusCode::Unknown.raw(),
        }
    }

    unsafe fn status_delete(&self, status: RawPtr) {
        // Status reads are bookkeeping, not part of the call log.
        self.state.lock().free(status, HandleKind::Status);
    }

    fn image_frame_new(
        &self,
        format: ImageFormat,
        width: i32,
        height: i32,
        width_step: i32,
        pixels: &[u8],
        out: &mut RawPtr,
    ) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            let row = width as usize * format.channels();
            let required = width_step as usize * height as usize;
            if width <= 0 || height <= 0 || (width_step as usize) < row || pixels.len() < required {
                state.status(StatusCode::InvalidArgument)
            } else {
                *out = state.alloc(Object::Image(pixels[..required].to_vec()));
                state.status(StatusCode::Ok)
            }
        };
        self.record(MockCall::ImageFrameNew { width, height });
        status
    }

    unsafe fn image_frame_delete(&self, frame: RawPtr) {
        self.release(frame, HandleKind::Image);
    }

    unsafe fn packet_from_image_frame(
        &self,
        frame: RawPtr,
        timestamp_us: i64,
        out: &mut RawPtr,
    ) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            match state.take(frame, HandleKind::Image) {
                Some(Object::Image(pixels)) => {
                    *out = state.alloc(Object::Packet {
                        timestamp_us,
                        payload: Payload::Image(pixels),
                    });
                    state.status(StatusCode::Ok)
                }
                _ => state.status(StatusCode::InvalidArgument),
            }
        };
        self.record(MockCall::PacketFromImage { timestamp_us });
        status
    }

    unsafe fn packet_is_empty(&self, packet: RawPtr) -> bool {
        !matches!(self.state.lock().get(packet), Some(Object::Packet { .. }))
    }

    unsafe fn packet_get_proto_list(&self, packet: RawPtr, out: &mut RawPtr) -> RawPtr {
        let mut state = self.state.lock();
        let items = match state.get(packet) {
            Some(Object::Packet {
                payload: Payload::Landmarks(items),
                ..
            }) => Some(items.clone()),
            _ => None,
        };
        match items {
            Some(items) => {
                *out = state.alloc(Object::LandmarkList(items));
                state.status(StatusCode::Ok)
            }
            None => state.status(StatusCode::InvalidArgument),
        }
    }

    unsafe fn packet_delete(&self, packet: RawPtr) {
        self.release(packet, HandleKind::Packet);
    }

    unsafe fn proto_list_len(&self, list: RawPtr) -> usize {
        match self.state.lock().get(list) {
            Some(Object::LandmarkList(items)) => items.len(),
            _ => 0,
        }
    }

    unsafe fn proto_list_item(&self, list: RawPtr, index: usize) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        let lose = state.lose_list_items;
        match state.get(list) {
            Some(Object::LandmarkList(_)) if lose => None,
            Some(Object::LandmarkList(items)) => items.get(index).cloned(),
            _ => None,
        }
    }

    unsafe fn proto_list_delete(&self, list: RawPtr) {
        self.release(list, HandleKind::LandmarkList);
    }

    fn graph_new(&self, config_text: &str, out: &mut RawPtr) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            if config_text.trim().is_empty() || !config_text.contains("input_stream") {
                state.status(StatusCode::InvalidArgument)
            } else {
                *out = state.alloc(Object::Graph(MockGraph::default()));
                state.status(StatusCode::Ok)
            }
        };
        self.record(MockCall::GraphNew);
        status
    }

    unsafe fn graph_register_asset(&self, graph: RawPtr, name: &str, data: &[u8]) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            match state.graph(graph) {
                Some(g) if !g.started => state.status(StatusCode::Ok),
                Some(_) => state.status(StatusCode::FailedPrecondition),
                None => state.status(StatusCode::InvalidArgument),
            }
        };
        self.record(MockCall::RegisterAsset {
            name: name.to_string(),
            bytes: data.len(),
        });
        status
    }

    unsafe fn graph_observe_output(&self, graph: RawPtr, stream: &str) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            let code = match state.graph(graph) {
                Some(g) if !g.started => {
                    g.observed.push(stream.to_string());
                    g.outputs.entry(stream.to_string()).or_default();
                    StatusCode::Ok
                }
                Some(_) => StatusCode::FailedPrecondition,
                None => StatusCode::InvalidArgument,
            };
            state.status(code)
        };
        self.record(MockCall::ObserveOutput {
            stream: stream.to_string(),
        });
        status
    }

    unsafe fn graph_start_run(&self, graph: RawPtr, side_packets: &[SidePacket]) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            let fail = state.fail_start;
            let code = match (state.graph(graph), fail) {
                (None, _) => StatusCode::InvalidArgument,
                (Some(_), Some(code)) => code,
                (Some(g), None) if g.started => StatusCode::FailedPrecondition,
                (Some(g), None) => {
                    g.started = true;
                    StatusCode::Ok
                }
            };
            state.status(code)
        };
        self.record(MockCall::StartRun {
            side_packets: side_packets.to_vec(),
        });
        status
    }

    unsafe fn graph_add_packet(&self, graph: RawPtr, stream: &str, packet: RawPtr) -> RawPtr {
        let detector = self.detector.lock().clone();
        let (status, timestamp_us) = {
            let mut state = self.state.lock();
            // Ownership moves in whatever the outcome.
            let (timestamp_us, payload) = match state.take(packet, HandleKind::Packet) {
                Some(Object::Packet {
                    timestamp_us,
                    payload,
                }) => (timestamp_us, payload),
                _ => {
                    let status = state.status(StatusCode::InvalidArgument);
                    drop(state);
                    self.record(MockCall::AddPacket {
                        stream: stream.to_string(),
                        timestamp_us: -1,
                    });
                    return status;
                }
            };
            let fail = state.fail_inject;
            let code = match (state.graph(graph), fail) {
                (None, _) => StatusCode::InvalidArgument,
                (Some(_), Some(code)) => code,
                (Some(g), None) if !g.started => StatusCode::FailedPrecondition,
                (Some(g), None) if g.last_timestamp.is_some_and(|last| timestamp_us <= last) => {
                    StatusCode::InvalidArgument
                }
                (Some(g), None) => {
                    g.last_timestamp = Some(timestamp_us);
                    if let Payload::Image(pixels) = &payload {
                        if let Some(faces) = (*detector)(pixels) {
                            let items: Vec<Vec<u8>> = faces.iter().map(FaceLandmarks::encode).collect();
                            for queue in g.outputs.values_mut() {
                                queue.push_back((timestamp_us, items.clone()));
                            }
                        }
                    }
                    StatusCode::Ok
                }
            };
            if code == StatusCode::Ok {
                state.injected.push(timestamp_us);
            }
            (state.status(code), timestamp_us)
        };
        self.record(MockCall::AddPacket {
            stream: stream.to_string(),
            timestamp_us,
        });
        status
    }

    unsafe fn graph_poll_output(
        &self,
        graph: RawPtr,
        stream: &str,
        _timeout_ms: u64,
        out: &mut RawPtr,
    ) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            let next = match state.graph(graph) {
                None => Err(StatusCode::InvalidArgument),
                Some(g) if !g.started => Err(StatusCode::FailedPrecondition),
                Some(g) => match g.outputs.get_mut(stream) {
                    Some(queue) => Ok(queue.pop_front()),
                    None => Err(StatusCode::FailedPrecondition),
                },
            };
            match next {
                Ok(Some((timestamp_us, items))) => {
                    *out = state.alloc(Object::Packet {
                        timestamp_us,
                        payload: Payload::Landmarks(items),
                    });
                    state.status(StatusCode::Ok)
                }
                Ok(None) => state.status(StatusCode::Ok),
                Err(code) => state.status(code),
            }
        };
        self.record(MockCall::PollOutput {
            stream: stream.to_string(),
        });
        status
    }

    unsafe fn graph_close(&self, graph: RawPtr) -> RawPtr {
        let status = {
            let mut state = self.state.lock();
            let fail = state.fail_close;
            let code = match state.graph(graph) {
                None => StatusCode::InvalidArgument,
                Some(g) => {
                    g.started = false;
                    fail.unwrap_or(StatusCode::Ok)
                }
            };
            state.status(code)
        };
        self.record(MockCall::GraphClose);
        status
    }

    unsafe fn graph_delete(&self, graph: RawPtr) {
        self.release(graph, HandleKind::Graph);
    }
}

impl std::fmt::Debug for MockApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockApi")
            .field("live_objects", &state.objects.len())
            .field("double_frees", &state.double_frees)
            .field("dangling", &state.dangling)
            .finish()
    }
}
