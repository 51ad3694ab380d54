//! Two-stream performance tracker shared by the capture and inference sides

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::trace;

use super::frame::{FrameSnapshot, PerformanceFrame};
use crate::clock::{Clock, SystemClock};

/// Independently clocked activity streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stream {
    /// Depth inference, one frame per prediction
    Depth,
    /// Camera capture, one frame per delivered camera buffer
    Camera,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::Depth, Stream::Camera];

    pub fn name(self) -> &'static str {
        match self {
            Stream::Depth => "Depth",
            Stream::Camera => "Camera",
        }
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct StreamState {
    recorder: PerformanceFrame,
    last: ArcSwapOption<FrameSnapshot>,
}

impl StreamState {
    fn new(stream: Stream, clock: Arc<dyn Clock>) -> Self {
        Self {
            recorder: PerformanceFrame::new(stream.name(), clock),
            last: ArcSwapOption::empty(),
        }
    }
}

/// Per-stage latency for the capture and inference streams.
///
/// Shared by `Arc` between the capture context, the worker thread and
/// whoever renders the report. Readers of the last completed frame never
/// wait on the recorders.
pub struct PerformanceTracker {
    depth: StreamState,
    camera: StreamState,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            depth: StreamState::new(Stream::Depth, clock.clone()),
            camera: StreamState::new(Stream::Camera, clock),
        }
    }

    fn state(&self, stream: Stream) -> &StreamState {
        match stream {
            Stream::Depth => &self.depth,
            Stream::Camera => &self.camera,
        }
    }

    /// The live recorder of a stream
    pub fn recorder(&self, stream: Stream) -> &PerformanceFrame {
        &self.state(stream).recorder
    }

    /// Open a scope that is recorded when the returned guard drops
    pub fn scope(&self, stream: Stream, name: impl Into<String>) -> ScopeGuard<'_> {
        let recorder = self.recorder(stream);
        let start = recorder.now();
        let depth = recorder.start_scope();
        ScopeGuard {
            recorder,
            name: Some(name.into()),
            depth,
            start,
        }
    }

    /// Run `f` inside a named scope of `stream`.
    ///
    /// The scope is closed on every exit path, including a panic in `f`.
    pub fn measure<T>(&self, stream: Stream, name: &str, f: impl FnOnce() -> T) -> T {
        let _scope = self.scope(stream, name);
        f()
    }

    /// Finish the open frame of `stream` and publish it for reporting
    pub fn new_frame(&self, stream: Stream) -> Arc<FrameSnapshot> {
        let state = self.state(stream);
        let snapshot = Arc::new(state.recorder.finish());
        trace!(
            stream = %stream,
            scopes = snapshot.scopes.len(),
            duration_us = snapshot.duration().as_micros() as u64,
            "frame finished"
        );
        state.last.store(Some(snapshot.clone()));
        snapshot
    }

    /// Finish the open frame of `stream` without publishing it.
    ///
    /// Used when a frame of work failed half way, so its scopes and time do
    /// not leak into the next frame.
    pub fn abandon_frame(&self, stream: Stream) {
        let dropped = self.state(stream).recorder.finish();
        trace!(stream = %stream, scopes = dropped.scopes.len(), "frame abandoned");
    }

    /// Last completed frame of `stream`, if any
    pub fn last_frame(&self, stream: Stream) -> Option<Arc<FrameSnapshot>> {
        self.state(stream).last.load_full()
    }

    /// Both streams' last completed frames, separated by a blank line
    pub fn report(&self) -> String {
        Stream::ALL
            .iter()
            .map(|&stream| match self.last_frame(stream) {
                Some(frame) => frame.format(),
                None => format!("{} Frame: n/a", stream.name()),
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Open scope on one stream, closed on drop
#[must_use = "the scope ends as soon as the guard is dropped"]
pub struct ScopeGuard<'a> {
    recorder: &'a PerformanceFrame,
    name: Option<String>,
    depth: usize,
    start: std::time::Duration,
}

impl ScopeGuard<'_> {
    pub fn depth(&self) -> usize {
        self.depth
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Some(name) = self.name.take() {
            self.recorder.end_scope(name, self.depth, self.start);
        }
    }
}
