//! Nested-scope timing for the capture and inference streams

pub mod frame;
pub mod tracker;

pub use frame::{FrameSnapshot, PerformanceFrame, Scope};
pub use tracker::{PerformanceTracker, ScopeGuard, Stream};
