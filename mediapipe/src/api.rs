//! The table of foreign entry points the safe layer is written against.
//!
//! Every method mirrors one function of the MediaPipe C shim. Fallible
//! calls return a raw status object (always non-null from the shim) and
//! write results through `out` parameters, exactly like the C signatures;
//! the safe wrappers turn those into `Result`s via [`crate::Status::consume`].

use std::fmt;
use std::os::raw::c_void;

use crate::image_frame::ImageFormat;

/// Untyped pointer to a foreign object.
pub type RawPtr = *mut c_void;

/// Value of a graph input side packet.
#[derive(Debug, Clone, PartialEq)]
pub enum SideValue {
    Int(i32),
    Bool(bool),
}

/// Named input side packet passed at `StartRun`.
#[derive(Debug, Clone, PartialEq)]
pub struct SidePacket {
    pub name: String,
    pub value: SideValue,
}

impl SidePacket {
    pub fn int(name: &str, value: i32) -> Self {
        Self {
            name: name.to_string(),
            value: SideValue::Int(value),
        }
    }

    pub fn bool(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            value: SideValue::Bool(value),
        }
    }
}

/// Foreign entry points of the native runtime.
///
/// # Safety
///
/// Methods marked `unsafe` take pointers that must have been produced by
/// the same implementation and must still be live. Methods documented as
/// taking ownership invalidate their pointer argument; the caller must not
/// delete it afterwards.
pub trait NativeApi: Send + Sync + fmt::Debug {
    /// Process-wide logging setup. Returns a status object.
    fn glog_initialize(&self, name: &str) -> RawPtr;
    /// Matching teardown of [`NativeApi::glog_initialize`].
    fn glog_shutdown(&self);

    unsafe fn status_ok(&self, status: RawPtr) -> bool;
    unsafe fn status_raw_code(&self, status: RawPtr) -> i32;
    unsafe fn status_delete(&self, status: RawPtr);

    /// Allocates an image frame holding a copy of `pixels`.
    fn image_frame_new(
        &self,
        format: ImageFormat,
        width: i32,
        height: i32,
        width_step: i32,
        pixels: &[u8],
        out: &mut RawPtr,
    ) -> RawPtr;
    unsafe fn image_frame_delete(&self, frame: RawPtr);

    /// Wraps an image frame into a packet. Takes ownership of `frame`.
    unsafe fn packet_from_image_frame(
        &self,
        frame: RawPtr,
        timestamp_us: i64,
        out: &mut RawPtr,
    ) -> RawPtr;
    unsafe fn packet_is_empty(&self, packet: RawPtr) -> bool;
    /// Serializes a `std::vector<NormalizedLandmarkList>` packet payload.
    unsafe fn packet_get_proto_list(&self, packet: RawPtr, out: &mut RawPtr) -> RawPtr;
    unsafe fn packet_delete(&self, packet: RawPtr);

    unsafe fn proto_list_len(&self, list: RawPtr) -> usize;
    /// Copies out the serialized message at `index`; `None` if the list
    /// has no such item.
    unsafe fn proto_list_item(&self, list: RawPtr, index: usize) -> Option<Vec<u8>>;
    unsafe fn proto_list_delete(&self, list: RawPtr);

    /// Parses a text-format `CalculatorGraphConfig` and builds a graph.
    fn graph_new(&self, config_text: &str, out: &mut RawPtr) -> RawPtr;
    unsafe fn graph_register_asset(&self, graph: RawPtr, name: &str, data: &[u8]) -> RawPtr;
    /// Attaches an output stream poller to `stream`.
    unsafe fn graph_observe_output(&self, graph: RawPtr, stream: &str) -> RawPtr;
    unsafe fn graph_start_run(&self, graph: RawPtr, side_packets: &[SidePacket]) -> RawPtr;
    /// Adds a packet to an input stream. Takes ownership of `packet`.
    unsafe fn graph_add_packet(&self, graph: RawPtr, stream: &str, packet: RawPtr) -> RawPtr;
    /// Waits up to `timeout_ms` for the next output packet; `out` stays
    /// null if none arrived.
    unsafe fn graph_poll_output(
        &self,
        graph: RawPtr,
        stream: &str,
        timeout_ms: u64,
        out: &mut RawPtr,
    ) -> RawPtr;
    /// Closes all input streams and waits until the graph is done.
    unsafe fn graph_close(&self, graph: RawPtr) -> RawPtr;
    unsafe fn graph_delete(&self, graph: RawPtr);
}
