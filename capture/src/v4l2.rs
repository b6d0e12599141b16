use std::sync::mpsc::SyncSender;
use std::time::Duration;

use tracing::{info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream as MmapStream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::video::capture::Parameters;
use v4l::{Device, FourCC};

use crate::config::CaptureConfig;
use crate::error::CaptureError;
use crate::pipeline::CancelFlag;
use crate::source::{CaptureSource, PixelFormat, RawFrame};
use crate::worker::ProducerThread;

const BUFFER_COUNT: u32 = 4;

/// Longest `stop` waits for a dequeue blocked in the driver.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

type FrameResult = Result<RawFrame, CaptureError>;

/// Negotiated stream geometry.
#[derive(Debug, Clone, Copy)]
struct StreamFormat {
    width: u32,
    height: u32,
    stride: usize,
    format: PixelFormat,
}

/// Video4Linux2 camera.
///
/// Frames are dequeued on a background thread and handed over through a
/// bounded channel, so `get_frame` blocks until the next frame arrives.
pub struct V4l2Source {
    device_index: u32,
    card: String,
    stream: StreamFormat,
    device: Option<Device>,
    worker: Option<ProducerThread<FrameResult>>,
    stopped: bool,
}

impl std::fmt::Debug for V4l2Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V4l2Source")
            .field("device_index", &self.device_index)
            .field("card", &self.card)
            .field("stream", &self.stream)
            .field("worker", &self.worker)
            .finish()
    }
}

impl V4l2Source {
    /// Opens `/dev/video<index>` and negotiates size, format and rate.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::Open` naming the device index if the device
    /// cannot be opened, rejects the settings, or only offers a pixel format
    /// the converter cannot handle.
    pub fn open(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let device_index = config.device_index();
        let open_err = |reason: String| CaptureError::Open {
            device_index,
            reason,
        };

        let device = Device::new(device_index as usize)
            .map_err(|e| open_err(format!("{}: {e}", config.device_path())))?;
        let card = device
            .query_caps()
            .map(|caps| caps.card)
            .unwrap_or_else(|_| config.device_path());

        let mut format = device
            .format()
            .map_err(|e| open_err(format!("query format: {e}")))?;
        if let Some(size) = config.video_size() {
            format.width = size.width;
            format.height = size.height;
        }
        if let Some(pixel) = config.input_format() {
            format.fourcc = FourCC::new(&pixel.fourcc());
        }
        let format = device
            .set_format(&format)
            .map_err(|e| open_err(format!("set format: {e}")))?;
        let pixel = PixelFormat::from_fourcc(&format.fourcc.repr)
            .ok_or_else(|| open_err(format!("unsupported pixel format {}", format.fourcc)))?;

        if let Some(fps) = config.framerate() {
            device
                .set_params(&Parameters::with_fps(fps))
                .map_err(|e| open_err(format!("set framerate {fps}: {e}")))?;
        }

        let stream = StreamFormat {
            width: format.width,
            height: format.height,
            stride: format.stride as usize,
            format: pixel,
        };
        info!(
            device_index,
            card = %card,
            width = stream.width,
            height = stream.height,
            format = %stream.format,
            "capture: v4l2 device opened"
        );

        Ok(Self {
            device_index,
            card,
            stream,
            device: Some(device),
            worker: None,
            stopped: false,
        })
    }

    fn ensure_started(&mut self) -> Result<&ProducerThread<FrameResult>, CaptureError> {
        if self.worker.is_none() {
            let device = self
                .device
                .take()
                .ok_or_else(|| CaptureError::Device("device already consumed".into()))?;
            let stream = self.stream;
            let worker = ProducerThread::spawn(
                format!("v4l2-capture-{}", self.device_index),
                BUFFER_COUNT as usize,
                move |stop, tx| capture_loop(device, stream, stop, tx),
            )?;
            self.worker = Some(worker);
        }
        self.worker
            .as_ref()
            .ok_or_else(|| CaptureError::Device("capture thread not started".into()))
    }
}

fn capture_loop(device: Device, format: StreamFormat, stop: CancelFlag, tx: SyncSender<FrameResult>) {
    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = tx.send(Err(CaptureError::Device(format!("start stream: {e}"))));
            return;
        }
    };

    while !stop.is_cancelled() {
        let frame = match CaptureStream::next(&mut stream) {
            Ok((data, meta)) => {
                // The mmap buffer is only valid until the next dequeue.
                let used = (meta.bytesused as usize).min(data.len());
                let len = if used == 0 { data.len() } else { used };
                Ok(RawFrame {
                    width: format.width,
                    height: format.height,
                    format: format.format,
                    stride: format.stride,
                    data: data[..len].to_vec(),
                })
            }
            Err(e) => Err(CaptureError::Device(format!("dequeue: {e}"))),
        };
        let failed = frame.is_err();
        // Receiver gone means the source was stopped.
        if tx.send(frame).is_err() || failed {
            break;
        }
    }
}

impl CaptureSource for V4l2Source {
    fn get_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.stopped {
            return Err(CaptureError::Closed);
        }
        self.ensure_started()?.recv()?
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        drop(self.device.take());
        let stopped = match self.worker.as_mut() {
            Some(worker) => worker.stop(STOP_TIMEOUT),
            None => Ok(()),
        };
        info!(device_index = self.device_index, "capture: v4l2 device stopped");
        stopped
    }

    fn describe(&self) -> String {
        format!(
            "{} (index {}) {}x{} {}",
            self.card, self.device_index, self.stream.width, self.stream.height, self.stream.format
        )
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "capture: v4l2 stop failed");
        }
    }
}
