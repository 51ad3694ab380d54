//! Capture-side half of the pipeline
//!
//! Runs on whatever context the camera delivers buffers on. Every buffer is
//! decoded synchronously, stored in the latest-frame slot and handed back to
//! the camera before `analyze` returns, so capture never waits on inference.

use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, warn};

use super::decoder;
use super::frame::{Frame, FrameMetadata, RawFrame};
use crate::error::DecodeError;
use crate::perf::{PerformanceTracker, Stream};
use crate::pipeline::LatestFrameSlot;

/// A camera buffer on loan from the capture device.
///
/// `release` must be called exactly once, after which the device may reuse
/// the memory. Consuming `self` enforces that.
pub trait CameraBuffer {
    fn data(&self) -> &[u8];

    fn meta(&self) -> &FrameMetadata;

    fn timestamp(&self) -> std::time::Instant;

    fn release(self);
}

impl CameraBuffer for RawFrame {
    fn data(&self) -> &[u8] {
        &self.data
    }

    fn meta(&self) -> &FrameMetadata {
        &self.meta
    }

    fn timestamp(&self) -> std::time::Instant {
        self.timestamp
    }

    /// Owned copies hold no device memory
    fn release(self) {}
}

/// Turns delivered camera buffers into frames for the depth worker
#[derive(Clone)]
pub struct FrameAnalyzer {
    slot: Arc<LatestFrameSlot>,
    tracker: Arc<PerformanceTracker>,
}

impl FrameAnalyzer {
    pub fn new(slot: Arc<LatestFrameSlot>, tracker: Arc<PerformanceTracker>) -> Self {
        Self { slot, tracker }
    }

    /// Decode `buffer`, publish it as the newest frame and release it.
    ///
    /// Returns whether a frame was stored. A buffer that fails to decode is
    /// dropped, but still released.
    pub fn analyze<B: CameraBuffer>(&self, buffer: B) -> bool {
        let decoded = self
            .tracker
            .measure(Stream::Camera, "acquire", || self.decode(&buffer));

        let stored = match decoded {
            Ok(frame) => {
                if self.slot.put(frame) {
                    metrics::counter!("frames_dropped").increment(1);
                }
                self.tracker.new_frame(Stream::Camera);
                true
            }
            Err(e) => {
                warn!(sequence = buffer.meta().sequence, "Dropping undecodable frame: {}", e);
                metrics::counter!("decode_failures").increment(1);
                self.tracker.abandon_frame(Stream::Camera);
                false
            }
        };

        buffer.release();
        stored
    }

    fn decode<B: CameraBuffer>(&self, buffer: &B) -> Result<Frame, DecodeError> {
        let meta = buffer.meta();
        let started = std::time::Instant::now();

        let image = self.tracker.measure(Stream::Camera, "decode", || {
            decoder::decode_frame(buffer.data(), meta)
        })?;
        let image = self.tracker.measure(Stream::Camera, "rotate", || {
            decoder::rotate(image, meta.rotation)
        })?;

        metrics::histogram!("decode_time_us").record(started.elapsed().as_micros() as f64);

        let (width, height) = image.dimensions();
        debug!(sequence = meta.sequence, width, height, "Decoded camera frame");

        Ok(Frame {
            data: Bytes::from(image.into_raw()),
            width,
            height,
            sequence: meta.sequence,
            timestamp: buffer.timestamp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Instant;

    use super::*;
    use crate::capture::PixelFormat;

    /// Buffer that logs what the slot held at release time
    struct LoanedBuffer {
        frame: RawFrame,
        slot: Arc<LatestFrameSlot>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl CameraBuffer for LoanedBuffer {
        fn data(&self) -> &[u8] {
            &self.frame.data
        }

        fn meta(&self) -> &FrameMetadata {
            &self.frame.meta
        }

        fn timestamp(&self) -> Instant {
            self.frame.timestamp
        }

        fn release(self) {
            let state = if self.slot.is_empty() { "empty" } else { "stored" };
            self.log
                .lock()
                .unwrap()
                .push(format!("release #{} with slot {}", self.frame.meta.sequence, state));
        }
    }

    fn raw(sequence: u64, data: Vec<u8>, rotation: u32) -> RawFrame {
        RawFrame {
            data: Bytes::from(data),
            meta: Arc::new(FrameMetadata {
                sequence,
                width: 2,
                height: 1,
                stride: 2,
                format: PixelFormat::Rgb24,
                rotation,
                device_timestamp: None,
            }),
            timestamp: Instant::now(),
        }
    }

    fn analyzer() -> (FrameAnalyzer, Arc<LatestFrameSlot>, Arc<PerformanceTracker>) {
        let slot = Arc::new(LatestFrameSlot::new());
        let tracker = Arc::new(PerformanceTracker::new());
        (FrameAnalyzer::new(slot.clone(), tracker.clone()), slot, tracker)
    }

    #[test]
    fn stores_frame_before_releasing_buffer() {
        let (analyzer, slot, _) = analyzer();
        let log = Arc::new(Mutex::new(Vec::new()));

        let stored = analyzer.analyze(LoanedBuffer {
            frame: raw(1, vec![1, 2, 3, 4, 5, 6], 0),
            slot: slot.clone(),
            log: log.clone(),
        });

        assert!(stored);
        assert_eq!(*log.lock().unwrap(), vec!["release #1 with slot stored"]);
        let frame = slot.take().unwrap();
        assert_eq!(frame.sequence, 1);
        assert_eq!(&frame.data[..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn decode_failure_still_releases_buffer() {
        let (analyzer, slot, tracker) = analyzer();
        let log = Arc::new(Mutex::new(Vec::new()));

        let stored = analyzer.analyze(LoanedBuffer {
            frame: raw(7, vec![1, 2], 0),
            slot: slot.clone(),
            log: log.clone(),
        });

        assert!(!stored);
        assert!(slot.is_empty());
        assert_eq!(*log.lock().unwrap(), vec!["release #7 with slot empty"]);
        assert!(tracker.last_frame(Stream::Camera).is_none());
        assert_eq!(tracker.recorder(Stream::Camera).current_depth(), 0);
    }

    #[test]
    fn records_nested_capture_scopes() {
        let (analyzer, slot, tracker) = analyzer();
        analyzer.analyze(raw(3, vec![0; 6], 90));

        let frame = slot.take().unwrap();
        assert_eq!(frame.dimensions(), (1, 2));

        let camera = tracker.last_frame(Stream::Camera).unwrap();
        let scopes: Vec<_> = camera
            .scopes_by_start()
            .into_iter()
            .map(|scope| (scope.name.as_str(), scope.depth))
            .collect();
        assert_eq!(scopes, vec![("acquire", 0), ("decode", 1), ("rotate", 1)]);
    }
}
