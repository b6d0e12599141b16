//! A camera stand-in producing a moving gradient.

use std::thread;
use std::time::{Duration, Instant};

use tracing::info;

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::source::{CaptureSource, PixelFormat, RawFrame};

const DEFAULT_SIZE: (u32, u32) = (640, 480);

/// Synthetic capture source for demos and tests.
///
/// Frames drift one step to the right per frame. With a frame limit, the
/// source reports [`CaptureError::EndOfStream`] once the limit is reached.
#[derive(Debug)]
pub struct TestPatternSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    interval: Option<Duration>,
    limit: Option<u64>,
    produced: u64,
    last: Option<Instant>,
    stopped: bool,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Result<Self, CaptureError> {
        let open_err = |reason: String| CaptureError::Open {
            device_index: 0,
            reason,
        };
        if width == 0 || height == 0 {
            return Err(open_err(format!("empty test pattern {width}x{height}")));
        }
        match format {
            PixelFormat::Mjpeg => {
                return Err(open_err("test pattern cannot produce mjpeg".into()));
            }
            PixelFormat::Yuyv if width % 2 != 0 => {
                return Err(open_err(format!("yuyv needs an even width, got {width}")));
            }
            _ => {}
        }
        Ok(Self {
            width,
            height,
            format,
            interval: None,
            limit: None,
            produced: 0,
            last: None,
            stopped: false,
        })
    }

    /// Opens a pattern matching the size, format and rate in `config`.
    pub fn from_config(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let (width, height) = config
            .video_size()
            .map_or(DEFAULT_SIZE, |s| (s.width, s.height));
        let format = config.input_format().unwrap_or(PixelFormat::Rgb24);
        let source = Self::new(width, height, format)
            .map_err(|e| match e {
                CaptureError::Open { reason, .. } => CaptureError::Open {
                    device_index: config.device_index(),
                    reason,
                },
                other => other,
            })?
            .with_framerate(config.framerate());
        info!(source = %source.describe(), "capture: test pattern opened");
        Ok(source)
    }

    /// Delivers frames no faster than `fps`, like a real device.
    pub fn with_framerate(mut self, fps: Option<u32>) -> Self {
        self.interval = fps.filter(|&f| f > 0).map(|f| Duration::from_secs(1) / f);
        self
    }

    /// Stops after `frames` frames.
    pub fn with_limit(mut self, frames: Option<u64>) -> Self {
        self.limit = frames;
        self
    }

    pub fn produced(&self) -> u64 {
        self.produced
    }

    fn render(&self) -> RawFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let shift = (self.produced * 4) as usize;
        let bpp = self.format.bytes_per_pixel().unwrap_or(3);
        let stride = w * bpp;
        let mut data = vec![0u8; stride * h];
        for (y, row) in data.chunks_exact_mut(stride).enumerate() {
            match self.format {
                PixelFormat::Yuyv => {
                    for (i, px) in row.chunks_exact_mut(4).enumerate() {
                        let x = i * 2;
                        px[0] = ((x + shift) % 256) as u8;
                        px[1] = 128;
                        px[2] = ((x + 1 + shift) % 256) as u8;
                        px[3] = 128;
                    }
                }
                _ => {
                    for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
                        let r = ((x + shift) % 256) as u8;
                        let g = (y % 256) as u8;
                        let b = (((x + y) / 2) % 256) as u8;
                        match self.format {
                            PixelFormat::Bgr24 => px.copy_from_slice(&[b, g, r]),
                            PixelFormat::Rgba => px.copy_from_slice(&[r, g, b, 255]),
                            _ => px.copy_from_slice(&[r, g, b]),
                        }
                    }
                }
            }
        }
        RawFrame {
            width: self.width,
            height: self.height,
            format: self.format,
            stride,
            data,
        }
    }
}

impl CaptureSource for TestPatternSource {
    fn get_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::Closed);
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(CaptureError::EndOfStream);
        }
        if let (Some(interval), Some(last)) = (self.interval, self.last) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last = Some(Instant::now());
        let frame = self.render();
        self.produced += 1;
        Ok(frame)
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if !self.stopped {
            self.stopped = true;
            info!(frames = self.produced, "capture: test pattern stopped");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("test pattern {}x{} {}", self.width, self.height, self.format)
    }
}
