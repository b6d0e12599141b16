//! Raw FFI bindings for the MediaPipe C shim (`libmediapipe_c`).
//!
//! The graph API is C++; the shim flattens the subset we need into plain C
//! functions. Fallible calls return an owned `absl::Status*` and write
//! results through out-pointers. We hand-write the declarations instead of
//! using bindgen.
//!
//! Symbols follow the MediaPipe.NET naming scheme: `<namespace>_<Type>__<method>`
//! with an argument-type suffix where overloads exist (`PKc` is a
//! `const char*`, `ll` an `int64_t`).

use std::os::raw::{c_char, c_int, c_void};

/// Opaque `absl::Status*`.
pub type MpStatusT = *mut c_void;
/// Opaque `mediapipe::ImageFrame*`.
pub type MpImageFrameT = *mut c_void;
/// Opaque `mediapipe::Packet*`.
pub type MpPacketT = *mut c_void;
/// Opaque `mediapipe::CalculatorGraph*` (with its pollers).
pub type MpGraphT = *mut c_void;
/// Opaque vector of serialized protobuf messages.
pub type MpProtoListT = *mut c_void;

pub const SIDE_INT: c_int = 0;
pub const SIDE_BOOL: c_int = 1;

#[link(name = "mediapipe_c")]
#[allow(non_snake_case)]
unsafe extern "C" {
    // Logging
    pub fn google_InitGoogleLogging__PKc(name: *const c_char) -> MpStatusT;
    pub fn google_ShutdownGoogleLogging();

    // Status
    pub fn absl_Status__i(code: c_int) -> MpStatusT;
    pub fn absl_Status__ok(status: MpStatusT) -> bool;
    pub fn absl_Status__raw_code(status: MpStatusT) -> c_int;
    pub fn absl_Status__delete(status: MpStatusT);

    // ImageFrame
    pub fn mp_ImageFrame__ui_i_i_i_Pui8(
        format: c_int,
        width: c_int,
        height: c_int,
        width_step: c_int,
        pixels: *const u8,
        pixels_len: usize,
        out: *mut MpImageFrameT,
    ) -> MpStatusT;
    pub fn mp_ImageFrame__delete(frame: MpImageFrameT);

    // Packet
    pub fn mp__MakeImageFramePacket_At__PI_ll(
        frame: MpImageFrameT,
        timestamp_us: i64,
        out: *mut MpPacketT,
    ) -> MpStatusT;
    pub fn mp_Packet__IsEmpty(packet: MpPacketT) -> bool;
    pub fn mp_Packet__GetNormalizedLandmarkListVector(
        packet: MpPacketT,
        out: *mut MpProtoListT,
    ) -> MpStatusT;
    pub fn mp_Packet__delete(packet: MpPacketT);

    // Serialized proto vector
    pub fn mp_api_SerializedProtoArray__size(list: MpProtoListT) -> usize;
    pub fn mp_api_SerializedProtoArray__get(
        list: MpProtoListT,
        index: usize,
        data: *mut *const u8,
        len: *mut usize,
    ) -> bool;
    pub fn mp_api_SerializedProtoArray__delete(list: MpProtoListT);

    // CalculatorGraph
    pub fn mp_CalculatorGraph__PKc(config_text: *const c_char, out: *mut MpGraphT) -> MpStatusT;
    pub fn mp_CalculatorGraph__RegisterAsset__PKc_Pui8_ui(
        graph: MpGraphT,
        name: *const c_char,
        data: *const u8,
        len: usize,
    ) -> MpStatusT;
    pub fn mp_CalculatorGraph__AddOutputStreamPoller__PKc(
        graph: MpGraphT,
        stream: *const c_char,
    ) -> MpStatusT;
    pub fn mp_CalculatorGraph__StartRun__Rsp(
        graph: MpGraphT,
        names: *const *const c_char,
        kinds: *const c_int,
        values: *const i64,
        len: usize,
    ) -> MpStatusT;
    pub fn mp_CalculatorGraph__AddPacketToInputStream__PKc_Ppacket(
        graph: MpGraphT,
        stream: *const c_char,
        packet: MpPacketT,
    ) -> MpStatusT;
    pub fn mp_CalculatorGraph__PollOutput__PKc_ui(
        graph: MpGraphT,
        stream: *const c_char,
        timeout_ms: u64,
        out: *mut MpPacketT,
    ) -> MpStatusT;
    pub fn mp_CalculatorGraph__CloseAndWait(graph: MpGraphT) -> MpStatusT;
    pub fn mp_CalculatorGraph__delete(graph: MpGraphT);
}
