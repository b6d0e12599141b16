//! Native image frames.

use std::ptr;
use std::sync::Arc;

use crate::api::NativeApi;
use crate::env::Environment;
use crate::error::MediapipeError;
use crate::handle::{kind, NativeHandle};
use crate::status::Status;

/// Pixel layouts understood by `mediapipe::ImageFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Srgb,
    Srgba,
    Gray8,
    Sbgra,
}

impl ImageFormat {
    /// The `ImageFormat::Format` enum value on the native side.
    pub fn raw(self) -> i32 {
        match self {
            Self::Srgb => 1,
            Self::Srgba => 2,
            Self::Gray8 => 3,
            Self::Sbgra => 11,
        }
    }

    pub fn channels(self) -> usize {
        match self {
            Self::Srgb => 3,
            Self::Srgba | Self::Sbgra => 4,
            Self::Gray8 => 1,
        }
    }
}

/// An image copied into native memory, ready to become an input packet.
///
/// The native frame holds its own copy of the pixels, so the source buffer
/// can be reused as soon as construction returns.
#[derive(Debug)]
pub struct FrameBuffer {
    format: ImageFormat,
    width: u32,
    height: u32,
    stride: usize,
    pixels: NativeHandle<kind::Image>,
}

impl FrameBuffer {
    /// Copies `data` (rows of `stride` bytes) into a new native image frame.
    pub fn new(
        env: &Environment,
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: usize,
        data: &[u8],
    ) -> Result<Self, MediapipeError> {
        Self::with_api(env.api(), format, width, height, stride, data)
    }

    pub(crate) fn with_api(
        api: Arc<dyn NativeApi>,
        format: ImageFormat,
        width: u32,
        height: u32,
        stride: usize,
        data: &[u8],
    ) -> Result<Self, MediapipeError> {
        if width == 0 || height == 0 {
            return Err(MediapipeError::InvalidFrame(format!(
                "empty frame {width}x{height}"
            )));
        }
        let row = width as usize * format.channels();
        if stride < row {
            return Err(MediapipeError::InvalidFrame(format!(
                "stride {stride} shorter than row of {row} bytes"
            )));
        }
        let required = stride.checked_mul(height as usize).ok_or_else(|| {
            MediapipeError::InvalidFrame(format!(
                "stride {stride} times height {height} overflows"
            ))
        })?;
        if data.len() < required {
            return Err(MediapipeError::InvalidFrame(format!(
                "data too short: got {}, need {required} ({width}x{height}, stride {stride})",
                data.len()
            )));
        }
        let (w, h, step) = match (i32::try_from(width), i32::try_from(height), i32::try_from(stride)) {
            (Ok(w), Ok(h), Ok(s)) => (w, h, s),
            _ => {
                return Err(MediapipeError::InvalidFrame(format!(
                    "frame {width}x{height} (stride {stride}) exceeds native limits"
                )));
            }
        };

        let mut out = ptr::null_mut();
        let status = api.image_frame_new(format, w, h, step, &data[..required], &mut out);
        // Adopt the output first so it is released even if the status says otherwise.
        let pixels = NativeHandle::acquire(api.clone(), out);
        Status::consume(&api, status)?.check("create image frame")?;
        Ok(Self {
            format,
            width,
            height,
            stride,
            pixels: pixels?,
        })
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Gives up the frame's pixel handle, e.g. to move it into a packet.
    pub fn into_pixels(self) -> NativeHandle<kind::Image> {
        self.pixels
    }
}
