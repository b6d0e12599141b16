//! Capture sources and the raw frames they produce.

use std::fmt;
use std::str::FromStr;

use crate::error::{CaptureError, ConfigError};

/// Pixel layout of a raw captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba,
    Rgb24,
    Bgr24,
    /// YUV 4:2:2 packed as `[Y0, U, Y1, V]`.
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    /// Bytes per pixel, or `None` for compressed formats.
    pub fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Rgba => Some(4),
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Yuyv => Some(2),
            Self::Mjpeg => None,
        }
    }

    /// V4L2 fourcc code.
    pub fn fourcc(self) -> [u8; 4] {
        match self {
            Self::Rgba => *b"AB24",
            Self::Rgb24 => *b"RGB3",
            Self::Bgr24 => *b"BGR3",
            Self::Yuyv => *b"YUYV",
            Self::Mjpeg => *b"MJPG",
        }
    }

    pub fn from_fourcc(code: &[u8; 4]) -> Option<Self> {
        match code {
            b"AB24" | b"RGBA" => Some(Self::Rgba),
            b"RGB3" => Some(Self::Rgb24),
            b"BGR3" => Some(Self::Bgr24),
            b"YUYV" => Some(Self::Yuyv),
            b"MJPG" | b"JPEG" => Some(Self::Mjpeg),
            _ => None,
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rgba" => Ok(Self::Rgba),
            "rgb24" | "rgb" => Ok(Self::Rgb24),
            "bgr24" | "bgr" => Ok(Self::Bgr24),
            "yuyv" | "yuyv422" => Ok(Self::Yuyv),
            "mjpeg" | "mjpg" => Ok(Self::Mjpeg),
            _ => Err(ConfigError::UnknownPixelFormat(s.to_string())),
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rgba => "rgba",
            Self::Rgb24 => "rgb24",
            Self::Bgr24 => "bgr24",
            Self::Yuyv => "yuyv422",
            Self::Mjpeg => "mjpeg",
        };
        f.write_str(name)
    }
}

/// One frame as delivered by a capture source.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Bytes per row; unused for compressed formats.
    pub stride: usize,
    pub data: Vec<u8>,
}

/// A device or synthetic generator of frames.
pub trait CaptureSource: Send {
    /// Blocks until the next frame is available.
    fn get_frame(&mut self) -> Result<RawFrame, CaptureError>;

    /// Stops capturing and releases the device. Later `get_frame` calls
    /// fail with [`CaptureError::Closed`].
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_input_formats() {
        assert_eq!("yuyv422".parse::<PixelFormat>().unwrap(), PixelFormat::Yuyv);
        assert_eq!("MJPEG".parse::<PixelFormat>().unwrap(), PixelFormat::Mjpeg);
        assert_eq!("rgb24".parse::<PixelFormat>().unwrap(), PixelFormat::Rgb24);
        assert!(matches!(
            "nv12".parse::<PixelFormat>(),
            Err(ConfigError::UnknownPixelFormat(_))
        ));
    }

    #[test]
    fn fourcc_roundtrip() {
        for format in [
            PixelFormat::Rgba,
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Yuyv,
            PixelFormat::Mjpeg,
        ] {
            assert_eq!(PixelFormat::from_fourcc(&format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), None);
    }
}
