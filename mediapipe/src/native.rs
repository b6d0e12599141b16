//! [`NativeApi`] implementation over the linked C shim.

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;
use std::slice;

use crate::api::{NativeApi, RawPtr, SidePacket, SideValue};
use crate::ffi;
use crate::image_frame::ImageFormat;
use crate::status::StatusCode;

/// Calls straight into `libmediapipe_c`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinkedApi;

impl LinkedApi {
    pub fn new() -> Self {
        Self
    }
}

/// Status object for arguments rejected before reaching the shim.
fn invalid_argument() -> RawPtr {
    unsafe { ffi::absl_Status__i(StatusCode::InvalidArgument.raw()) }
}

impl NativeApi for LinkedApi {
    fn glog_initialize(&self, name: &str) -> RawPtr {
        let Ok(c_name) = CString::new(name) else {
            return invalid_argument();
        };
        unsafe { ffi::google_InitGoogleLogging__PKc(c_name.as_ptr()) }
    }

    fn glog_shutdown(&self) {
        unsafe { ffi::google_ShutdownGoogleLogging() }
    }

    unsafe fn status_ok(&self, status: RawPtr) -> bool {
        unsafe { ffi::absl_Status__ok(status) }
    }

    unsafe fn status_raw_code(&self, status: RawPtr) -> i32 {
        unsafe { ffi::absl_Status__raw_code(status) }
    }

    unsafe fn status_delete(&self, status: RawPtr) {
        unsafe { ffi::absl_Status__delete(status) }
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
        unsafe {
            ffi::mp_ImageFrame__ui_i_i_i_Pui8(
                format.raw(),
                width,
                height,
                width_step,
                pixels.as_ptr(),
                pixels.len(),
                out,
            )
        }
    }

    unsafe fn image_frame_delete(&self, frame: RawPtr) {
        unsafe { ffi::mp_ImageFrame__delete(frame) }
    }

    unsafe fn packet_from_image_frame(
        &self,
        frame: RawPtr,
        timestamp_us: i64,
        out: &mut RawPtr,
    ) -> RawPtr {
        unsafe { ffi::mp__MakeImageFramePacket_At__PI_ll(frame, timestamp_us, out) }
    }

    unsafe fn packet_is_empty(&self, packet: RawPtr) -> bool {
        unsafe { ffi::mp_Packet__IsEmpty(packet) }
    }

    unsafe fn packet_get_proto_list(&self, packet: RawPtr, out: &mut RawPtr) -> RawPtr {
        unsafe { ffi::mp_Packet__GetNormalizedLandmarkListVector(packet, out) }
    }

    unsafe fn packet_delete(&self, packet: RawPtr) {
        unsafe { ffi::mp_Packet__delete(packet) }
    }

    unsafe fn proto_list_len(&self, list: RawPtr) -> usize {
        unsafe { ffi::mp_api_SerializedProtoArray__size(list) }
    }

    unsafe fn proto_list_item(&self, list: RawPtr, index: usize) -> Option<Vec<u8>> {
        let mut data: *const u8 = ptr::null();
        let mut len: usize = 0;
        let found = unsafe { ffi::mp_api_SerializedProtoArray__get(list, index, &mut data, &mut len) };
        if !found || data.is_null() {
            return None;
        }
        if len == 0 {
            return Some(Vec::new());
        }
        // The bytes belong to the list; copy them out before it is deleted.
        Some(unsafe { slice::from_raw_parts(data, len) }.to_vec())
    }

    unsafe fn proto_list_delete(&self, list: RawPtr) {
        unsafe { ffi::mp_api_SerializedProtoArray__delete(list) }
    }

    fn graph_new(&self, config_text: &str, out: &mut RawPtr) -> RawPtr {
        let Ok(c_config) = CString::new(config_text) else {
            return invalid_argument();
        };
        unsafe { ffi::mp_CalculatorGraph__PKc(c_config.as_ptr(), out) }
    }

    unsafe fn graph_register_asset(&self, graph: RawPtr, name: &str, data: &[u8]) -> RawPtr {
        let Ok(c_name) = CString::new(name) else {
            return invalid_argument();
        };
        unsafe { ffi::mp_CalculatorGraph__RegisterAsset__PKc_Pui8_ui(graph, c_name.as_ptr(), data.as_ptr(), data.len()) }
    }

    unsafe fn graph_observe_output(&self, graph: RawPtr, stream: &str) -> RawPtr {
        let Ok(c_stream) = CString::new(stream) else {
            return invalid_argument();
        };
        unsafe { ffi::mp_CalculatorGraph__AddOutputStreamPoller__PKc(graph, c_stream.as_ptr()) }
    }

    unsafe fn graph_start_run(&self, graph: RawPtr, side_packets: &[SidePacket]) -> RawPtr {
        let mut names = Vec::with_capacity(side_packets.len());
        for packet in side_packets {
            match CString::new(packet.name.as_str()) {
                Ok(name) => names.push(name),
                Err(_) => return invalid_argument(),
            }
        }
        let name_ptrs: Vec<_> = names.iter().map(|n| n.as_ptr()).collect();
        let (kinds, values): (Vec<c_int>, Vec<i64>) = side_packets
            .iter()
            .map(|p| match p.value {
                SideValue::Int(v) => (ffi::SIDE_INT, v as i64),
                SideValue::Bool(v) => (ffi::SIDE_BOOL, v as i64),
            })
            .unzip();
        unsafe {
            ffi::mp_CalculatorGraph__StartRun__Rsp(
                graph,
                name_ptrs.as_ptr(),
                kinds.as_ptr(),
                values.as_ptr(),
                side_packets.len(),
            )
        }
    }

    unsafe fn graph_add_packet(&self, graph: RawPtr, stream: &str, packet: RawPtr) -> RawPtr {
        let Ok(c_stream) = CString::new(stream) else {
            // The shim would have consumed the packet; do the same here.
            unsafe { ffi::mp_Packet__delete(packet) };
            return invalid_argument();
        };
        unsafe { ffi::mp_CalculatorGraph__AddPacketToInputStream__PKc_Ppacket(graph, c_stream.as_ptr(), packet) }
    }

    unsafe fn graph_poll_output(
        &self,
        graph: RawPtr,
        stream: &str,
        timeout_ms: u64,
        out: &mut RawPtr,
    ) -> RawPtr {
        let Ok(c_stream) = CString::new(stream) else {
            return invalid_argument();
        };
        unsafe { ffi::mp_CalculatorGraph__PollOutput__PKc_ui(graph, c_stream.as_ptr(), timeout_ms, out) }
    }

    unsafe fn graph_close(&self, graph: RawPtr) -> RawPtr {
        unsafe { ffi::mp_CalculatorGraph__CloseAndWait(graph) }
    }

    unsafe fn graph_delete(&self, graph: RawPtr) {
        unsafe { ffi::mp_CalculatorGraph__delete(graph) }
    }
}
