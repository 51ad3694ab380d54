//! Single-slot mailbox holding only the newest frame

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use tracing::trace;

use crate::Frame;

/// Lock-free keep-latest slot between capture and the depth worker.
///
/// Holds at most one frame. Storing while occupied drops the previous frame
/// instead of queueing it, so the worker always sees the freshest capture and
/// no backlog can build up behind a slow model.
pub struct LatestFrameSlot {
    /// The pending frame, moved in and out as a whole
    slot: ArcSwapOption<Frame>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    frames_put: AtomicUsize,
    frames_taken: AtomicUsize,
    frames_dropped: AtomicUsize,
}

/// Point-in-time copy of the slot counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotStats {
    pub put: usize,
    pub taken: usize,
    pub dropped: usize,
}

impl LatestFrameSlot {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: store `frame`, discarding any frame not yet taken.
    ///
    /// Returns `true` when an older frame was displaced. Never blocks.
    pub fn put(&self, frame: Frame) -> bool {
        let sequence = frame.sequence;
        let previous = self.slot.swap(Some(Arc::new(frame)));
        self.stats.frames_put.fetch_add(1, Ordering::Relaxed);

        match previous {
            Some(dropped) => {
                self.stats.frames_dropped.fetch_add(1, Ordering::Relaxed);
                trace!(dropped = dropped.sequence, sequence, "Replaced unconsumed frame");
                true
            }
            None => false,
        }
    }

    /// Consumer: remove and return the pending frame, if any
    pub fn take(&self) -> Option<Arc<Frame>> {
        let frame = self.slot.swap(None)?;
        self.stats.frames_taken.fetch_add(1, Ordering::Relaxed);
        Some(frame)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }

    pub fn stats(&self) -> SlotStats {
        SlotStats {
            put: self.stats.frames_put.load(Ordering::Relaxed),
            taken: self.stats.frames_taken.load(Ordering::Relaxed),
            dropped: self.stats.frames_dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for LatestFrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    fn frame(sequence: u64) -> Frame {
        Frame::new(vec![sequence as u8; 3], 1, 1, sequence)
    }

    #[test]
    fn take_on_empty_slot_returns_nothing() {
        let slot = LatestFrameSlot::new();
        assert!(slot.is_empty());
        assert!(slot.take().is_none());
        assert_eq!(slot.stats(), SlotStats::default());
    }

    #[test]
    fn put_then_take_returns_same_frame_unmodified() {
        let slot = LatestFrameSlot::new();
        assert!(!slot.put(frame(4)));

        let taken = slot.take().unwrap();
        assert_eq!(taken.sequence, 4);
        assert_eq!(&taken.data[..], &[4, 4, 4]);
        assert!(slot.is_empty());
        assert!(slot.take().is_none());
    }

    #[test]
    fn only_last_put_survives() {
        let slot = LatestFrameSlot::new();
        for sequence in 1..=5 {
            slot.put(frame(sequence));
        }

        assert_eq!(slot.take().unwrap().sequence, 5);
        assert!(slot.take().is_none());
        assert_eq!(
            slot.stats(),
            SlotStats {
                put: 5,
                taken: 1,
                dropped: 4
            }
        );
    }

    #[test]
    fn concurrent_put_and_take_never_duplicate_frames() {
        let slot = Arc::new(LatestFrameSlot::new());

        let producer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for sequence in 0..5_000 {
                    slot.put(frame(sequence));
                }
            })
        };

        let mut seen = HashSet::new();
        let mut last = None;
        while !producer.is_finished() || !slot.is_empty() {
            if let Some(frame) = slot.take() {
                assert!(seen.insert(frame.sequence), "frame taken twice");
                if let Some(last) = last {
                    assert!(frame.sequence > last, "frames went backwards");
                }
                last = Some(frame.sequence);
            }
        }
        producer.join().unwrap();

        let stats = slot.stats();
        assert_eq!(stats.put, 5_000);
        assert_eq!(stats.taken + stats.dropped, 5_000);
        assert_eq!(stats.taken, seen.len());
    }
}
