//! V4L2 camera capture

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, instrument};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{FrameMetadata, PixelFormat, RawFrame};
use crate::error::CaptureError;
use crate::CaptureConfig;

pub struct V4l2Capture {
    device: Box<Device>,
    stream: Option<MmapStream<'static>>,
    config: CaptureConfig,
    sequence: u64,
}

impl V4l2Capture {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        info!("Initializing V4L2 capture: {}", config.device);

        let device = Device::with_path(&config.device)?;

        let caps = device.query_caps()?;
        info!("Device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CaptureError::Device(format!(
                "{} does not support video capture",
                config.device
            )));
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = fourcc(config.format);
        let applied = device.set_format(&fmt)?;
        if applied.width != config.width || applied.height != config.height {
            info!(
                "Driver adjusted resolution to {}x{}",
                applied.width, applied.height
            );
        }

        let mut config = config;
        config.width = applied.width;
        config.height = applied.height;

        Ok(Self {
            device: Box::new(device),
            stream: None,
            config,
            sequence: 0,
        })
    }

    /// Start streaming with memory-mapped buffers
    pub fn start_stream(&mut self) -> Result<(), CaptureError> {
        let stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.config.buffer_count)?;

        self.stream = Some(stream);
        info!(
            "Capture stream started with {} buffers",
            self.config.buffer_count
        );
        Ok(())
    }

    /// Dequeue the next buffer and copy it out, requeueing the mmap buffer
    #[instrument(skip(self))]
    pub async fn capture_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let timestamp = Instant::now();

        let stream = self.stream.as_mut().ok_or(CaptureError::NotStreaming)?;
        let (buf, meta) = stream.next()?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = Bytes::copy_from_slice(&buf[..used]);

        self.sequence += 1;

        let frame_meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: self.config.width,
            height: self.config.height,
            stride: self.config.width,
            format: self.config.format,
            rotation: self.config.rotation,
            device_timestamp: Some(
                Duration::from_secs(meta.timestamp.sec as u64)
                    + Duration::from_micros(meta.timestamp.usec as u64),
            ),
        });

        Ok(RawFrame {
            data,
            meta: frame_meta,
            timestamp,
        })
    }
}

fn fourcc(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
        PixelFormat::Nv12 => FourCC::new(b"NV12"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
        PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
    }
}

/// Find the first capture device offering MJPEG or YUYV
pub fn auto_detect_device() -> Result<(String, PixelFormat), CaptureError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            continue;
        }

        for fmt in dev.enum_formats().unwrap_or_default() {
            if fmt.fourcc == FourCC::new(b"MJPG") {
                info!("Found MJPEG device: {} - {}", path, caps.card);
                return Ok((path, PixelFormat::Mjpeg));
            } else if fmt.fourcc == FourCC::new(b"YUYV") {
                info!("Found YUYV device: {} - {}", path, caps.card);
                return Ok((path, PixelFormat::Yuyv4));
            }
        }
    }

    Err(CaptureError::Device("no suitable capture device found".into()))
}
