//! Timestamped packets flowing in and out of a graph.

use std::ptr;
use std::sync::Arc;

use crate::api::NativeApi;
use crate::error::MediapipeError;
use crate::handle::{kind, NativeHandle};
use crate::image_frame::FrameBuffer;
use crate::landmark::LandmarkSet;
use crate::status::{Status, StatusCode};

/// An owned `mediapipe::Packet`.
#[derive(Debug)]
pub struct Packet {
    api: Arc<dyn NativeApi>,
    handle: NativeHandle<kind::Packet>,
}

impl Packet {
    /// Adopts a packet returned by a foreign call.
    pub(crate) fn adopt(api: Arc<dyn NativeApi>, raw: crate::api::RawPtr) -> Result<Self, MediapipeError> {
        let handle = NativeHandle::acquire(api.clone(), raw)?;
        Ok(Self { api, handle })
    }

    /// Wraps an image frame. The frame's native buffer moves into the packet.
    pub fn from_frame(
        api: Arc<dyn NativeApi>,
        frame: FrameBuffer,
        timestamp_us: i64,
    ) -> Result<Self, MediapipeError> {
        let raw_frame = frame.into_pixels().transfer()?;
        let mut out = ptr::null_mut();
        // SAFETY: `raw_frame` was just released from its handle; the shim owns it now.
        let status = unsafe { api.packet_from_image_frame(raw_frame, timestamp_us, &mut out) };
        let packet = Self::adopt(api.clone(), out);
        Status::consume(&api, status)?.check("make image frame packet")?;
        packet
    }

    pub fn is_empty(&self) -> Result<bool, MediapipeError> {
        let raw = self.handle.borrow()?;
        // SAFETY: `raw` is live for the duration of the borrow.
        Ok(unsafe { self.api.packet_is_empty(raw) })
    }

    /// Copies out the serialized landmark lists and decodes them.
    ///
    /// The foreign list object is released before returning, on success and
    /// on failure alike.
    pub fn landmark_set(&self) -> Result<LandmarkSet, MediapipeError> {
        let raw = self.handle.borrow()?;
        let mut out = ptr::null_mut();
        // SAFETY: `raw` is live; the list written to `out` is owned by us.
        let status = unsafe { self.api.packet_get_proto_list(raw, &mut out) };
        let list = NativeHandle::<kind::LandmarkList>::acquire(self.api.clone(), out);
        Status::consume(&self.api, status)?.check("get landmark lists")?;
        let mut list = list?;

        let raw_list = list.borrow()?;
        // SAFETY: `raw_list` stays live until `list` is released below.
        let items: Option<Vec<Vec<u8>>> = unsafe {
            let len = self.api.proto_list_len(raw_list);
            (0..len)
                .map(|i| self.api.proto_list_item(raw_list, i))
                .collect()
        };
        list.release();
        let items = items.ok_or_else(|| MediapipeError::Status {
            op: "get landmark list item",
            status: Status::from_code(StatusCode::NotFound),
        })?;
        LandmarkSet::decode_all(&items)
    }

    /// Gives up ownership, e.g. when the graph takes the packet.
    pub(crate) fn into_raw(self) -> Result<crate::api::RawPtr, MediapipeError> {
        self.handle.transfer()
    }

    pub fn release(&mut self) -> Option<Status> {
        self.handle.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::HandleKind;
    use crate::image_frame::ImageFormat;
    use crate::mock::MockApi;

    fn frame(mock: &Arc<MockApi>) -> FrameBuffer {
        FrameBuffer::with_api(mock.clone(), ImageFormat::Srgba, 2, 2, 8, &[9u8; 16]).unwrap()
    }

    #[test]
    fn frame_ownership_moves_into_packet() {
        let mock = MockApi::new();
        let mut packet = Packet::from_frame(mock.clone(), frame(&mock), 10).unwrap();
        assert!(!packet.is_empty().unwrap());
        // The image frame now lives inside the packet, never deleted on its own.
        assert_eq!(mock.release_count(HandleKind::Image), 0);

        packet.release();
        assert_eq!(mock.release_count(HandleKind::Packet), 1);
        assert_eq!(mock.live_objects(), 0);
        assert_eq!(mock.double_frees(), 0);
    }

    #[test]
    fn non_landmark_packet_reports_status() {
        let mock = MockApi::new();
        let packet = Packet::from_frame(mock.clone(), frame(&mock), 10).unwrap();
        let err = packet.landmark_set().unwrap_err();
        assert!(matches!(err, MediapipeError::Status { op: "get landmark lists", .. }));
        drop(packet);
        assert_eq!(mock.live_objects(), 0);
    }
}
