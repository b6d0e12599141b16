//! Pixel conversion into the RGBA layout the graph consumes.

use tracing::{debug, info};

use crate::error::CaptureError;
use crate::source::{PixelFormat, RawFrame};

/// A converted frame borrowing the converter's output buffer.
///
/// Valid until the next `convert` call on the same converter.
#[derive(Debug, Clone, Copy)]
pub struct ConvertedFrame<'a> {
    pub width: u32,
    pub height: u32,
    /// Bytes per row.
    pub stride: usize,
    pub data: &'a [u8],
}

/// Turns raw frames into packed RGBA.
pub trait FrameConverter: Send {
    fn convert(&mut self, raw: &RawFrame) -> Result<ConvertedFrame<'_>, CaptureError>;

    /// Frees conversion state. Later `convert` calls fail with
    /// [`CaptureError::Closed`].
    fn close(&mut self) -> Result<(), CaptureError>;
}

/// Converts one fixed input geometry to packed RGBA, reusing one buffer.
///
/// The geometry and pixel format are taken from the first frame; frames
/// that differ are rejected.
#[derive(Debug)]
pub struct RgbaConverter {
    width: u32,
    height: u32,
    source: PixelFormat,
    buffer: Vec<u8>,
    closed: bool,
}

impl RgbaConverter {
    pub fn for_frame(raw: &RawFrame) -> Self {
        info!(
            width = raw.width,
            height = raw.height,
            format = %raw.format,
            "capture: converter created"
        );
        Self {
            width: raw.width,
            height: raw.height,
            source: raw.format,
            buffer: vec![0; raw.width as usize * raw.height as usize * 4],
            closed: false,
        }
    }

    pub fn source_format(&self) -> PixelFormat {
        self.source
    }

    fn stride(&self) -> usize {
        self.width as usize * 4
    }
}

impl FrameConverter for RgbaConverter {
    fn convert(&mut self, raw: &RawFrame) -> Result<ConvertedFrame<'_>, CaptureError> {
        if self.closed {
            return Err(CaptureError::Closed);
        }
        if raw.width == 0 || raw.height == 0 {
            return Err(CaptureError::Convert(format!(
                "empty frame {}x{}",
                raw.width, raw.height
            )));
        }
        if (raw.width, raw.height, raw.format) != (self.width, self.height, self.source) {
            return Err(CaptureError::Convert(format!(
                "frame changed from {}x{} {} to {}x{} {}",
                self.width, self.height, self.source, raw.width, raw.height, raw.format
            )));
        }

        let out_stride = self.stride();
        match raw.format {
            PixelFormat::Rgba => {
                for (src, dst) in rows(raw, 4)?.zip(self.buffer.chunks_exact_mut(out_stride)) {
                    dst.copy_from_slice(src);
                }
            }
            PixelFormat::Rgb24 => {
                for (src, dst) in rows(raw, 3)?.zip(self.buffer.chunks_exact_mut(out_stride)) {
                    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
                        d.copy_from_slice(&[s[0], s[1], s[2], 255]);
                    }
                }
            }
            PixelFormat::Bgr24 => {
                for (src, dst) in rows(raw, 3)?.zip(self.buffer.chunks_exact_mut(out_stride)) {
                    for (s, d) in src.chunks_exact(3).zip(dst.chunks_exact_mut(4)) {
                        d.copy_from_slice(&[s[2], s[1], s[0], 255]);
                    }
                }
            }
            PixelFormat::Yuyv => {
                if raw.width % 2 != 0 {
                    return Err(CaptureError::Convert(format!(
                        "yuyv width {} is odd",
                        raw.width
                    )));
                }
                for (src, dst) in rows(raw, 2)?.zip(self.buffer.chunks_exact_mut(out_stride)) {
                    yuyv_to_rgba(src, dst);
                }
            }
            PixelFormat::Mjpeg => {
                let decoded = image::load_from_memory_with_format(&raw.data, image::ImageFormat::Jpeg)
                    .map_err(|e| CaptureError::Convert(format!("mjpeg: {e}")))?
                    .to_rgba8();
                if decoded.dimensions() != (self.width, self.height) {
                    return Err(CaptureError::Convert(format!(
                        "mjpeg decoded to {}x{}, expected {}x{}",
                        decoded.width(),
                        decoded.height(),
                        self.width,
                        self.height
                    )));
                }
                self.buffer.copy_from_slice(decoded.as_raw());
            }
        }

        debug!(width = self.width, height = self.height, "capture: frame converted");
        Ok(ConvertedFrame {
            width: self.width,
            height: self.height,
            stride: out_stride,
            data: &self.buffer,
        })
    }

    fn close(&mut self) -> Result<(), CaptureError> {
        if !self.closed {
            self.closed = true;
            self.buffer = Vec::new();
            debug!("capture: converter closed");
        }
        Ok(())
    }
}

/// Yields the pixel bytes of each row, skipping row padding.
fn rows(raw: &RawFrame, bytes_per_pixel: usize) -> Result<impl Iterator<Item = &[u8]>, CaptureError> {
    let row = raw.width as usize * bytes_per_pixel;
    let height = raw.height as usize;
    let stride = if raw.stride == 0 { row } else { raw.stride };
    if stride == 0 || stride < row {
        return Err(CaptureError::Convert(format!(
            "stride {stride} shorter than row of {row} bytes"
        )));
    }
    let needed = stride
        .checked_mul(height.saturating_sub(1))
        .and_then(|n| n.checked_add(row))
        .ok_or_else(|| CaptureError::Convert(format!("stride {stride} overflows frame size")))?;
    if raw.data.len() < needed {
        return Err(CaptureError::Convert(format!(
            "frame data too short: got {}, need {needed}",
            raw.data.len()
        )));
    }
    Ok(raw.data.chunks(stride).take(height).map(move |r| &r[..row]))
}

/// Converts packed YUYV (`[Y0, U, Y1, V]`, BT.601) to RGBA.
///
/// `dst` receives 4 bytes per pixel; conversion stops at the shorter of the
/// two buffers.
pub fn yuyv_to_rgba(src: &[u8], dst: &mut [u8]) {
    for (s, d) in src.chunks_exact(4).zip(dst.chunks_exact_mut(8)) {
        let u = s[1] as f32 - 128.0;
        let v = s[3] as f32 - 128.0;
        let r_off = 1.402 * v;
        let g_off = -0.344 * u - 0.714 * v;
        let b_off = 1.772 * u;
        for (i, y) in [s[0], s[2]].into_iter().enumerate() {
            let y = y as f32;
            d[i * 4] = (y + r_off).clamp(0.0, 255.0) as u8;
            d[i * 4 + 1] = (y + g_off).clamp(0.0, 255.0) as u8;
            d[i * 4 + 2] = (y + b_off).clamp(0.0, 255.0) as u8;
            d[i * 4 + 3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, format: PixelFormat, stride: usize, data: Vec<u8>) -> RawFrame {
        RawFrame {
            width,
            height,
            format,
            stride,
            data,
        }
    }

    #[test]
    fn rgb24_gains_opaque_alpha() {
        let raw = frame(2, 1, PixelFormat::Rgb24, 6, vec![1, 2, 3, 4, 5, 6]);
        let mut conv = RgbaConverter::for_frame(&raw);
        let out = conv.convert(&raw).unwrap();
        assert_eq!(out.data, &[1, 2, 3, 255, 4, 5, 6, 255]);
        assert_eq!(out.stride, 8);
    }

    #[test]
    fn bgr24_swaps_channels() {
        let raw = frame(1, 1, PixelFormat::Bgr24, 3, vec![10, 20, 30]);
        let mut conv = RgbaConverter::for_frame(&raw);
        assert_eq!(conv.convert(&raw).unwrap().data, &[30, 20, 10, 255]);
    }

    #[test]
    fn padded_rows_are_packed() {
        // 1x2 RGBA with 2 bytes of padding per row.
        let raw = frame(
            1,
            2,
            PixelFormat::Rgba,
            6,
            vec![1, 2, 3, 4, 0, 0, 5, 6, 7, 8, 0, 0],
        );
        let mut conv = RgbaConverter::for_frame(&raw);
        let out = conv.convert(&raw).unwrap();
        assert_eq!(out.data, &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!((out.width, out.height, out.stride), (1, 2, 4));
    }

    #[test]
    fn yuyv_neutral_chroma_is_gray() {
        let raw = frame(2, 1, PixelFormat::Yuyv, 4, vec![100, 128, 200, 128]);
        let mut conv = RgbaConverter::for_frame(&raw);
        assert_eq!(
            conv.convert(&raw).unwrap().data,
            &[100, 100, 100, 255, 200, 200, 200, 255]
        );
    }

    #[test]
    fn yuyv_red_chroma() {
        let mut out = [0u8; 8];
        yuyv_to_rgba(&[81, 90, 81, 240], &mut out);
        assert!(out[0] > 200, "{out:?}");
        assert!(out[1] < 60 && out[2] < 60, "{out:?}");
    }

    #[test]
    fn mjpeg_is_decoded() {
        let img = image::RgbImage::from_pixel(8, 8, image::Rgb([200, 10, 10]));
        let mut jpeg = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        let raw = frame(8, 8, PixelFormat::Mjpeg, 0, jpeg);
        let mut conv = RgbaConverter::for_frame(&raw);
        let out = conv.convert(&raw).unwrap();
        assert_eq!(out.data.len(), 8 * 8 * 4);
        assert!(out.data[0] > 150 && out.data[1] < 80 && out.data[3] == 255);
    }

    #[test]
    fn bad_mjpeg_is_convert_error() {
        let raw = frame(8, 8, PixelFormat::Mjpeg, 0, vec![0xff, 0xd8, 0x00]);
        let mut conv = RgbaConverter::for_frame(&raw);
        assert!(matches!(conv.convert(&raw), Err(CaptureError::Convert(_))));
    }

    #[test]
    fn geometry_change_is_rejected() {
        let first = frame(2, 2, PixelFormat::Rgba, 8, vec![0; 16]);
        let mut conv = RgbaConverter::for_frame(&first);
        let other = frame(4, 2, PixelFormat::Rgba, 16, vec![0; 32]);
        assert!(matches!(conv.convert(&other), Err(CaptureError::Convert(_))));
        assert!(conv.convert(&first).is_ok());
    }

    #[test]
    fn zero_sized_frame_is_convert_error() {
        for (w, h) in [(0, 2), (2, 0), (0, 0)] {
            let raw = frame(w, h, PixelFormat::Rgba, 0, Vec::new());
            let mut conv = RgbaConverter::for_frame(&raw);
            let err = conv.convert(&raw).unwrap_err();
            assert!(matches!(err, CaptureError::Convert(ref msg) if msg.contains("empty frame")), "{w}x{h}: {err}");
        }
    }

    #[test]
    fn short_data_is_rejected() {
        let raw = frame(4, 4, PixelFormat::Rgb24, 12, vec![0; 20]);
        let mut conv = RgbaConverter::for_frame(&raw);
        assert!(matches!(conv.convert(&raw), Err(CaptureError::Convert(_))));
    }

    #[test]
    fn buffer_is_reused() {
        let raw = frame(2, 2, PixelFormat::Rgb24, 6, vec![9; 12]);
        let mut conv = RgbaConverter::for_frame(&raw);
        let first = conv.convert(&raw).unwrap().data.as_ptr() as usize;
        let second = conv.convert(&raw).unwrap().data.as_ptr() as usize;
        assert_eq!(first, second);
    }

    #[test]
    fn closed_converter_rejects_frames() {
        let raw = frame(1, 1, PixelFormat::Rgba, 4, vec![1, 2, 3, 4]);
        let mut conv = RgbaConverter::for_frame(&raw);
        conv.close().unwrap();
        conv.close().unwrap();
        assert!(matches!(conv.convert(&raw), Err(CaptureError::Closed)));
    }
}
