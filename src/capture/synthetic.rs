//! Camera stand-in producing a moving test pattern at a fixed rate

use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{info, instrument};

use crate::capture::frame::{FrameMetadata, PixelFormat, RawFrame};
use crate::error::CaptureError;
use crate::CaptureConfig;

pub struct SyntheticCapture {
    config: CaptureConfig,
    ticker: Option<Interval>,
    sequence: u64,
}

impl SyntheticCapture {
    pub fn new(config: CaptureConfig) -> Result<Self, CaptureError> {
        match config.format {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 | PixelFormat::Mjpeg => {}
            other => {
                return Err(CaptureError::Device(format!(
                    "synthetic source cannot produce {other:?}"
                )))
            }
        }
        Ok(Self {
            config,
            ticker: None,
            sequence: 0,
        })
    }

    /// Start pacing frames at the configured rate. Needs a tokio runtime.
    pub fn start_stream(&mut self) -> Result<(), CaptureError> {
        let period = Duration::from_secs_f64(1.0 / f64::from(self.config.fps.max(1)));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
        info!(
            "Synthetic capture started: {}x{} {:?} @ {} fps",
            self.config.width, self.config.height, self.config.format, self.config.fps
        );
        Ok(())
    }

    /// Wait for the next frame slot and render the pattern into it
    #[instrument(skip(self))]
    pub async fn capture_frame(&mut self) -> Result<RawFrame, CaptureError> {
        let ticker = self.ticker.as_mut().ok_or(CaptureError::NotStreaming)?;
        ticker.tick().await;
        let timestamp = Instant::now();

        self.sequence += 1;
        let pattern = render_pattern(self.config.width, self.config.height, self.sequence);
        let data = match self.config.format {
            PixelFormat::Mjpeg => {
                let mut jpeg = Cursor::new(Vec::new());
                pattern
                    .write_to(&mut jpeg, ImageFormat::Jpeg)
                    .map_err(|e| CaptureError::Device(e.to_string()))?;
                jpeg.into_inner()
            }
            PixelFormat::Bgr24 => {
                let mut bgr = pattern.into_raw();
                bgr.chunks_exact_mut(3).for_each(|px| px.swap(0, 2));
                bgr
            }
            _ => pattern.into_raw(),
        };

        let meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: self.config.width,
            height: self.config.height,
            stride: self.config.width,
            format: self.config.format,
            rotation: self.config.rotation,
            device_timestamp: None,
        });

        Ok(RawFrame {
            data: Bytes::from(data),
            meta,
            timestamp,
        })
    }
}

/// Horizontal and vertical ramps with a bright band sweeping downwards
fn render_pattern(width: u32, height: u32, sequence: u64) -> RgbImage {
    let band = (sequence % u64::from(height.max(1))) as u32;
    let half_band = (height / 16).max(1);
    RgbImage::from_fn(width, height, |x, y| {
        let r = (x * 255 / width.max(1)) as u8;
        let g = (y * 255 / height.max(1)) as u8;
        let b = if y.abs_diff(band) <= half_band { 255 } else { 40 };
        Rgb([r, g, b])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::decoder::decode_frame;

    fn config(format: PixelFormat) -> CaptureConfig {
        CaptureConfig {
            width: 32,
            height: 16,
            fps: 200,
            format,
            ..CaptureConfig::default()
        }
    }

    #[tokio::test]
    async fn capture_requires_started_stream() {
        let mut capture = SyntheticCapture::new(config(PixelFormat::Rgb24)).unwrap();
        assert!(matches!(
            capture.capture_frame().await,
            Err(CaptureError::NotStreaming)
        ));
    }

    #[tokio::test]
    async fn produces_decodable_frames_in_sequence() {
        for format in [PixelFormat::Rgb24, PixelFormat::Bgr24, PixelFormat::Mjpeg] {
            let mut capture = SyntheticCapture::new(config(format)).unwrap();
            capture.start_stream().unwrap();

            let first = capture.capture_frame().await.unwrap();
            let second = capture.capture_frame().await.unwrap();
            assert_eq!(first.meta.sequence, 1);
            assert_eq!(second.meta.sequence, 2);

            let image = decode_frame(&second.data, &second.meta).unwrap();
            assert_eq!(image.dimensions(), (32, 16));
        }
    }

    #[test]
    fn rejects_formats_it_cannot_render() {
        assert!(SyntheticCapture::new(config(PixelFormat::Nv12)).is_err());
    }
}
