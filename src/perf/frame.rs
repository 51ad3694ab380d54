//! Per-frame scope recording
//!
//! A [`PerformanceFrame`] collects every timed scope of one stream until
//! [`PerformanceFrame::finish`] marks the start of the next frame. Finishing
//! hands back an immutable [`FrameSnapshot`] that can be formatted for the
//! performance overlay.

use std::fmt::Write as _;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::Clock;

/// Indentation per nesting level in formatted output
const INDENT: &str = "    ";

/// One named, timed section of work. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub name: String,
    pub start: Duration,
    pub duration: Duration,
    /// Number of scopes that were open when this one started
    pub depth: usize,
}

impl Scope {
    pub fn format(&self) -> String {
        format!(
            "{}{}: {}",
            INDENT.repeat(self.depth),
            self.name,
            format_millis(self.duration)
        )
    }
}

/// Generation of the accumulator that is currently accepting scopes
#[derive(Debug)]
struct OpenFrame {
    scopes: Vec<Scope>,
    depth: usize,
    start: Duration,
}

impl OpenFrame {
    fn starting_at(start: Duration) -> Self {
        Self {
            scopes: Vec::new(),
            depth: 0,
            start,
        }
    }
}

/// Accumulates scopes of one activity stream between two `finish` calls.
///
/// Safe to share between threads: each call takes the internal lock once, so
/// a scope always lands wholly in exactly one frame generation.
pub struct PerformanceFrame {
    name: String,
    clock: Arc<dyn Clock>,
    open: Mutex<OpenFrame>,
}

impl PerformanceFrame {
    pub fn new(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        let start = clock.now();
        Self {
            name: name.into(),
            clock,
            open: Mutex::new(OpenFrame::starting_at(start)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// Enter a scope. Returns the nesting depth at entry.
    pub fn start_scope(&self) -> usize {
        let mut open = self.lock();
        let depth = open.depth;
        open.depth += 1;
        depth
    }

    /// Leave a scope that was entered at `depth` and `start`, recording it.
    ///
    /// The nesting counter saturates at zero: a scope that was entered before
    /// a `finish` and ends after it cannot drive the fresh frame negative.
    pub fn end_scope(&self, name: impl Into<String>, depth: usize, start: Duration) -> Duration {
        let duration = self.clock.now().saturating_sub(start);
        let mut open = self.lock();
        open.depth = open.depth.saturating_sub(1);
        open.scopes.push(Scope {
            name: name.into(),
            start,
            duration,
            depth,
        });
        duration
    }

    /// Number of scopes currently open
    pub fn current_depth(&self) -> usize {
        self.lock().depth
    }

    /// Close the current frame and start a new one.
    pub fn finish(&self) -> FrameSnapshot {
        let mut open = self.lock();
        let end = self.clock.now();
        let finished = mem::replace(&mut *open, OpenFrame::starting_at(end));
        drop(open);

        FrameSnapshot {
            name: self.name.clone(),
            scopes: finished.scopes,
            start: finished.start,
            end,
        }
    }

    fn lock(&self) -> MutexGuard<'_, OpenFrame> {
        self.open.lock().expect("performance frame lock poisoned")
    }
}

/// A finished frame: every scope recorded between two `finish` calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSnapshot {
    pub name: String,
    /// In recording order, which is not necessarily start order
    pub scopes: Vec<Scope>,
    pub start: Duration,
    pub end: Duration,
}

impl FrameSnapshot {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    /// Frames per second implied by this frame's duration, `0.0` for an
    /// empty duration.
    pub fn fps(&self) -> f64 {
        let secs = self.duration().as_secs_f64();
        if secs > 0.0 {
            1.0 / secs
        } else {
            0.0
        }
    }

    /// Scopes sorted by start time. On equal starts the outer scope comes
    /// first, then recording order.
    pub fn scopes_by_start(&self) -> Vec<&Scope> {
        let mut scopes: Vec<&Scope> = self.scopes.iter().collect();
        scopes.sort_by_key(|scope| (scope.start, scope.depth));
        scopes
    }

    pub fn format(&self) -> String {
        let mut out = format!(
            "{} Frame: {:.2} fps ({})",
            self.name,
            self.fps(),
            format_millis(self.duration())
        );
        for scope in self.scopes_by_start() {
            let _ = write!(out, "\n{}{}", INDENT, scope.format());
        }
        out
    }
}

fn format_millis(duration: Duration) -> String {
    format!("{:.2}ms", duration.as_secs_f64() * 1000.0)
}
