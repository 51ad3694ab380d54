use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Undecoded camera buffer as delivered by a frame source
#[derive(Clone)]
pub struct RawFrame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: PixelFormat,
    /// Clockwise rotation to apply after decoding, in degrees
    pub rotation: u32,
    pub device_timestamp: Option<Duration>, // Hardware timestamp if available
}

/// Pixel formats we support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv4,
    Mjpeg,
    Nv12,
}

/// Decoded RGB24 camera image, the unit of work of the depth pipeline
#[derive(Clone)]
pub struct Frame {
    /// Tightly packed RGB24 pixels, `width * height * 3` bytes
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    /// When the raw buffer was captured
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(data: impl Into<Bytes>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            data: data.into(),
            width,
            height,
            sequence,
            timestamp: Instant::now(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("sequence", &self.sequence)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
