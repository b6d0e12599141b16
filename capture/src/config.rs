use std::time::Duration;

use crate::error::ConfigError;
use crate::source::PixelFormat;

/// Requested capture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl VideoSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Builds a size from optional command-line parts.
    ///
    /// Both or neither must be given. Neither means "let the device pick".
    pub fn from_parts(width: Option<u32>, height: Option<u32>) -> Result<Option<Self>, ConfigError> {
        match (width, height) {
            (None, None) => Ok(None),
            (Some(_), None) => Err(ConfigError::MissingHeight),
            (None, Some(_)) => Err(ConfigError::MissingWidth),
            (Some(width), Some(height)) if width == 0 || height == 0 => {
                Err(ConfigError::EmptyVideoSize { width, height })
            }
            (Some(width), Some(height)) => Ok(Some(Self { width, height })),
        }
    }
}

/// Settings used to open a capture source.
#[derive(Clone, Debug, Default)]
pub struct CaptureConfig {
    device_index: u32,
    video_size: Option<VideoSize>,
    input_format: Option<PixelFormat>,
    framerate: Option<u32>,
}

impl CaptureConfig {
    pub fn new(device_index: u32) -> Self {
        Self {
            device_index,
            ..Default::default()
        }
    }

    pub fn with_video_size(mut self, size: Option<VideoSize>) -> Self {
        self.video_size = size;
        self
    }

    pub fn with_input_format(mut self, format: Option<PixelFormat>) -> Self {
        self.input_format = format;
        self
    }

    pub fn with_framerate(mut self, fps: Option<u32>) -> Self {
        self.framerate = fps.filter(|&f| f > 0);
        self
    }

    pub fn device_index(&self) -> u32 {
        self.device_index
    }

    pub fn video_size(&self) -> Option<VideoSize> {
        self.video_size
    }

    pub fn input_format(&self) -> Option<PixelFormat> {
        self.input_format
    }

    pub fn framerate(&self) -> Option<u32> {
        self.framerate
    }

    /// Device node for the index, e.g. `/dev/video0`.
    pub fn device_path(&self) -> String {
        format!("/dev/video{}", self.device_index)
    }
}

/// Pacing of pipeline iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Throttle {
    /// Run as fast as capture and the graph allow.
    #[default]
    Unlimited,
    /// At most `n` iterations per second. `MaxFps(0)` is unlimited.
    MaxFps(u32),
}

impl Throttle {
    /// Minimum time between iteration starts.
    pub fn min_interval(self) -> Option<Duration> {
        match self {
            Self::Unlimited | Self::MaxFps(0) => None,
            Self::MaxFps(fps) => Some(Duration::from_secs(1) / fps),
        }
    }
}

/// Settings of the capture loop itself.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    throttle: Throttle,
}

impl PipelineConfig {
    pub fn with_throttle(mut self, throttle: Throttle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn throttle(&self) -> Throttle {
        self.throttle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_size_needs_both_parts() {
        assert_eq!(VideoSize::from_parts(None, None), Ok(None));
        assert_eq!(
            VideoSize::from_parts(Some(640), Some(480)),
            Ok(Some(VideoSize::new(640, 480)))
        );
        assert_eq!(VideoSize::from_parts(Some(640), None), Err(ConfigError::MissingHeight));
        assert_eq!(VideoSize::from_parts(None, Some(480)), Err(ConfigError::MissingWidth));
        assert!(matches!(
            VideoSize::from_parts(Some(0), Some(480)),
            Err(ConfigError::EmptyVideoSize { .. })
        ));
    }

    #[test]
    fn missing_height_message() {
        let err = VideoSize::from_parts(Some(640), None).unwrap_err();
        assert_eq!(err.to_string(), "capture: specifying width requires specifying height");
    }

    #[test]
    fn capture_config_builder() {
        let config = CaptureConfig::new(2)
            .with_video_size(Some(VideoSize::new(320, 240)))
            .with_input_format(Some(PixelFormat::Yuyv))
            .with_framerate(Some(15));
        assert_eq!(config.device_index(), 2);
        assert_eq!(config.device_path(), "/dev/video2");
        assert_eq!(config.video_size(), Some(VideoSize::new(320, 240)));
        assert_eq!(config.input_format(), Some(PixelFormat::Yuyv));
        assert_eq!(config.framerate(), Some(15));
        assert_eq!(CaptureConfig::new(0).with_framerate(Some(0)).framerate(), None);
    }

    #[test]
    fn throttle_interval() {
        assert_eq!(Throttle::Unlimited.min_interval(), None);
        assert_eq!(Throttle::MaxFps(0).min_interval(), None);
        assert_eq!(Throttle::MaxFps(4).min_interval(), Some(Duration::from_millis(250)));
        assert_eq!(PipelineConfig::default().throttle(), Throttle::Unlimited);
    }
}
