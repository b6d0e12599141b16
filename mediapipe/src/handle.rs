//! Single-owner wrappers around foreign pointers.
//!
//! A [`NativeHandle`] owns exactly one object allocated by the native
//! runtime. It is move-only: there is no `Clone`, and ownership leaves a
//! handle either through [`NativeHandle::release`] (the foreign delete
//! function runs) or through [`NativeHandle::transfer`] (another native
//! owner takes the object over). `Drop` releases whatever is still live.

use std::fmt;
use std::marker::PhantomData;
use std::ptr;
use std::sync::Arc;

use tracing::warn;

use crate::api::{NativeApi, RawPtr};
use crate::error::MediapipeError;
use crate::status::Status;

/// The kinds of foreign objects the bridge hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Status,
    Image,
    Packet,
    Graph,
    LandmarkList,
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Status => "status",
            Self::Image => "image frame",
            Self::Packet => "packet",
            Self::Graph => "graph",
            Self::LandmarkList => "landmark list",
        };
        f.write_str(name)
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Type-level tag selecting the release function of a handle.
pub trait Kind: sealed::Sealed {
    const KIND: HandleKind;
}

/// Marker types for [`NativeHandle`].
pub mod kind {
    use super::{sealed::Sealed, HandleKind, Kind};

    macro_rules! kinds {
        ($($name:ident),* $(,)?) => {$(
            #[derive(Debug)]
            pub enum $name {}
            impl Sealed for $name {}
            impl Kind for $name {
                const KIND: HandleKind = HandleKind::$name;
            }
        )*};
    }

    kinds!(Status, Image, Packet, Graph, LandmarkList);
}

/// Owned pointer to a foreign object of kind `K`.
pub struct NativeHandle<K: Kind> {
    api: Arc<dyn NativeApi>,
    ptr: RawPtr,
    released: bool,
    _kind: PhantomData<K>,
}

// The runtime objects are not tied to the thread that created them; the
// handle is still single-owner, so it is Send but not Sync.
unsafe impl<K: Kind> Send for NativeHandle<K> {}

impl<K: Kind> NativeHandle<K> {
    /// Takes ownership of `raw`, which a foreign call just returned.
    pub fn acquire(api: Arc<dyn NativeApi>, raw: RawPtr) -> Result<Self, MediapipeError> {
        if raw.is_null() {
            return Err(MediapipeError::InvalidHandle(K::KIND));
        }
        Ok(Self {
            api,
            ptr: raw,
            released: false,
            _kind: PhantomData,
        })
    }

    pub fn kind(&self) -> HandleKind {
        K::KIND
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Returns the live pointer for a foreign call that does not take ownership.
    pub fn borrow(&self) -> Result<RawPtr, MediapipeError> {
        if self.released {
            return Err(MediapipeError::UseAfterRelease(K::KIND));
        }
        Ok(self.ptr)
    }

    /// Hands the object to a new native owner without deleting it.
    pub fn transfer(mut self) -> Result<RawPtr, MediapipeError> {
        if self.released {
            return Err(MediapipeError::UseAfterRelease(K::KIND));
        }
        let raw = self.ptr;
        self.released = true;
        self.ptr = ptr::null_mut();
        Ok(raw)
    }

    /// Deletes the foreign object.
    ///
    /// Only the first call reaches the runtime; it returns the release
    /// status, later calls return `None`. A failed release is logged and
    /// otherwise ignored.
    pub fn release(&mut self) -> Option<Status> {
        if self.released {
            return None;
        }
        self.released = true;
        let raw = std::mem::replace(&mut self.ptr, ptr::null_mut());
        let status = release_raw(&self.api, K::KIND, raw);
        if !status.is_ok() {
            warn!(kind = %K::KIND, %status, "mediapipe: release failed");
        }
        Some(status)
    }
}

impl<K: Kind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &K::KIND)
            .field("ptr", &self.ptr)
            .field("released", &self.released)
            .finish()
    }
}

impl<K: Kind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        self.release();
    }
}

fn release_raw(api: &Arc<dyn NativeApi>, kind: HandleKind, raw: RawPtr) -> Status {
    // SAFETY: callers pass a pointer that was live and owned by the handle
    // being released; it is never used again afterwards.
    unsafe {
        match kind {
            HandleKind::Status => api.status_delete(raw),
            HandleKind::Image => api.image_frame_delete(raw),
            HandleKind::Packet => api.packet_delete(raw),
            HandleKind::LandmarkList => api.proto_list_delete(raw),
            HandleKind::Graph => {
                let closed = api.graph_close(raw);
                let status = Status::consume(api, closed).unwrap_or_else(|e| {
                    warn!(error = %e, "mediapipe: graph close returned no status");
                    Status::from_code(crate::status::StatusCode::Unknown)
                });
                api.graph_delete(raw);
                return status;
            }
        }
    }
    Status::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_frame::ImageFormat;
    use crate::mock::MockApi;
    use crate::status::StatusCode;

    fn image(mock: &Arc<MockApi>) -> NativeHandle<kind::Image> {
        let api: Arc<dyn NativeApi> = mock.clone();
        let mut out = ptr::null_mut();
        let pixels = vec![7u8; 4 * 2 * 2];
        let status = api.image_frame_new(ImageFormat::Srgba, 2, 2, 8, &pixels, &mut out);
        assert!(Status::consume(&api, status).unwrap().is_ok());
        NativeHandle::acquire(api, out).unwrap()
    }

    #[test]
    fn acquire_null_fails() {
        let api: Arc<dyn NativeApi> = MockApi::new();
        let err = NativeHandle::<kind::Packet>::acquire(api, ptr::null_mut()).unwrap_err();
        assert!(matches!(err, MediapipeError::InvalidHandle(HandleKind::Packet)));
    }

    #[test]
    fn release_is_idempotent() {
        let mock = MockApi::new();
        let mut handle = image(&mock);
        assert_eq!(mock.live_objects(), 1);

        assert_eq!(handle.release(), Some(Status::OK));
        assert_eq!(handle.release(), None);
        drop(handle);

        assert_eq!(mock.release_count(HandleKind::Image), 1);
        assert_eq!(mock.double_frees(), 0);
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn borrow_after_release_fails() {
        let mock = MockApi::new();
        let mut handle = image(&mock);
        assert!(handle.borrow().is_ok());
        handle.release();
        let err = handle.borrow().unwrap_err();
        assert!(matches!(err, MediapipeError::UseAfterRelease(HandleKind::Image)));
    }

    #[test]
    fn drop_releases_once() {
        let mock = MockApi::new();
        {
            let _handle = image(&mock);
        }
        assert_eq!(mock.release_count(HandleKind::Image), 1);
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn transfer_skips_foreign_release() {
        let mock = MockApi::new();
        let handle = image(&mock);
        let raw = handle.transfer().unwrap();
        assert!(!raw.is_null());
        assert_eq!(mock.release_count(HandleKind::Image), 0);
        assert_eq!(mock.live_objects(), 1);

        // The new owner is responsible for the object.
        let api: Arc<dyn NativeApi> = mock.clone();
        let mut adopted = NativeHandle::<kind::Image>::acquire(api, raw).unwrap();
        adopted.release();
        assert_eq!(mock.live_objects(), 0);
    }

    #[test]
    fn failed_graph_release_is_reported_not_raised() {
        let mock = MockApi::new();
        mock.set_fail_close(Some(StatusCode::Internal));
        let api: Arc<dyn NativeApi> = mock.clone();
        let mut out = ptr::null_mut();
        let status = api.graph_new("input_stream: \"in\"", &mut out);
        assert!(Status::consume(&api, status).unwrap().is_ok());

        let mut graph = NativeHandle::<kind::Graph>::acquire(api, out).unwrap();
        let status = graph.release().unwrap();
        assert_eq!(status.status_code(), StatusCode::Internal);
        assert_eq!(graph.release(), None);
        assert_eq!(mock.release_count(HandleKind::Graph), 1);
        assert_eq!(mock.live_objects(), 0);
    }
}
