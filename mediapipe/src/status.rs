//! Foreign status values.
//!
//! The C shim reports failures as heap-allocated `absl::Status` objects.
//! [`Status`] is the plain-value copy of one of those objects: a success
//! flag and the raw canonical code.

use std::fmt;
use std::sync::Arc;

use crate::api::{NativeApi, RawPtr};
use crate::error::MediapipeError;
use crate::handle::{kind, NativeHandle};

/// Canonical absl status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
    /// A code outside the canonical range.
    Other(i32),
}

impl StatusCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::Cancelled,
            2 => Self::Unknown,
            3 => Self::InvalidArgument,
            4 => Self::DeadlineExceeded,
            5 => Self::NotFound,
            6 => Self::AlreadyExists,
            7 => Self::PermissionDenied,
            8 => Self::ResourceExhausted,
            9 => Self::FailedPrecondition,
            10 => Self::Aborted,
            11 => Self::OutOfRange,
            12 => Self::Unimplemented,
            13 => Self::Internal,
            14 => Self::Unavailable,
            15 => Self::DataLoss,
            16 => Self::Unauthenticated,
            other => Self::Other(other),
        }
    }

    pub fn raw(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Cancelled => 1,
            Self::Unknown => 2,
            Self::InvalidArgument => 3,
            Self::DeadlineExceeded => 4,
            Self::NotFound => 5,
            Self::AlreadyExists => 6,
            Self::PermissionDenied => 7,
            Self::ResourceExhausted => 8,
            Self::FailedPrecondition => 9,
            Self::Aborted => 10,
            Self::OutOfRange => 11,
            Self::Unimplemented => 12,
            Self::Internal => 13,
            Self::Unavailable => 14,
            Self::DataLoss => 15,
            Self::Unauthenticated => 16,
            Self::Other(code) => code,
        }
    }
}

/// Outcome of a foreign call.
///
/// `is_ok()` holds exactly when `code() == 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    ok: bool,
    code: i32,
}

impl Status {
    pub const OK: Status = Status { ok: true, code: 0 };

    /// Builds a status from the flag and code reported by the shim.
    ///
    /// The two values come from separate foreign calls and are normalized
    /// so they never disagree: a set flag with a non-zero code is a failure
    /// carrying that code, and a cleared flag with code 0 becomes `Unknown`.
    pub fn from_raw(ok_flag: bool, raw_code: i32) -> Self {
        match (ok_flag, raw_code) {
            (true, 0) => Self::OK,
            (false, 0) => Self {
                ok: false,
                code: StatusCode::Unknown.raw(),
            },
            (_, code) => Self { ok: false, code },
        }
    }

    pub fn from_code(code: StatusCode) -> Self {
        Self::from_raw(code == StatusCode::Ok, code.raw())
    }

    pub fn is_ok(&self) -> bool {
        self.ok
    }

    /// Raw foreign code, for diagnostics.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_raw(self.code)
    }

    /// Converts to a `Result`, tagging failures with the operation name.
    pub fn check(self, op: &'static str) -> Result<(), MediapipeError> {
        if self.ok {
            Ok(())
        } else {
            Err(MediapipeError::Status { op, status: self })
        }
    }

    /// Reads a foreign status object and releases it.
    pub fn consume(api: &Arc<dyn NativeApi>, raw: RawPtr) -> Result<Self, MediapipeError> {
        let mut handle = NativeHandle::<kind::Status>::acquire(api.clone(), raw)?;
        let ptr = handle.borrow()?;
        // SAFETY: `ptr` is a live status object owned by `handle`.
        let status = unsafe { Self::from_raw(api.status_ok(ptr), api.status_raw_code(ptr)) };
        handle.release();
        Ok(status)
    }
}

impl Default for Status {
    fn default() -> Self {
        Self::OK
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code() {
            StatusCode::Other(code) => write!(f, "status code {code}"),
            named => write!(f, "{named:?} (code {})", self.code),
        }
    }
}
