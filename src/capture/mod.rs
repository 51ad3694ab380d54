pub mod analyzer;
pub mod decoder;
pub mod frame;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use analyzer::{CameraBuffer, FrameAnalyzer};
pub use frame::{Frame, FrameMetadata, PixelFormat, RawFrame};
pub use synthetic::SyntheticCapture;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Capture;
