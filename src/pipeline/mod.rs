//! Keep-latest frame handoff and the depth worker

pub mod slot;
pub mod worker;

pub use slot::{LatestFrameSlot, SlotStats};
pub use worker::{FramePipeline, FramePipelineBuilder, PipelineState, WorkerStats};
