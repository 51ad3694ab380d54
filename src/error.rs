//! Error types shared across the pipeline

use thiserror::Error;

use crate::capture::PixelFormat;

/// Failure of a single depth prediction. Recoverable: the worker drops the
/// frame and moves on.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("input frame is {width}x{height}, expected a non-empty image")]
    EmptyInput { width: u32, height: u32 },

    #[error("input buffer holds {actual} bytes, expected {expected}")]
    InputSize { expected: usize, actual: usize },

    #[error("depth output holds {actual} values, expected {expected}")]
    OutputSize { expected: usize, actual: usize },

    #[error("inference runtime error: {0}")]
    Runtime(String),
}

/// Failure to turn a raw camera buffer into an RGB frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("jpeg decode failed: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),

    #[error("jpeg stream decoded to unsupported pixel format {0:?}")]
    JpegPixelFormat(jpeg_decoder::PixelFormat),

    #[error("{format:?} buffer holds {actual} bytes, expected {expected}")]
    BufferSize {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    #[error("unsupported rotation of {0} degrees")]
    Rotation(u32),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pipeline worker is already running")]
    AlreadyRunning,

    #[error("failed to spawn pipeline worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("pipeline worker panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("capture source is not streaming")]
    NotStreaming,

    #[error("capture device error: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
