//! Depth estimation models as seen by the pipeline
//!
//! The pipeline only needs a synchronous `predict` and the model's input
//! size. Runtimes (TFLite, ONNX, ...) plug in by implementing [`DepthModel`].

pub mod luminance;
pub mod preprocess;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::Frame;

pub use luminance::LuminanceDepthModel;

/// A depth estimation backend.
///
/// `predict` runs on the pipeline worker thread, one call at a time, and may
/// take tens to hundreds of milliseconds.
pub trait DepthModel: Send + Sync {
    fn name(&self) -> &str;

    /// `(width, height)` the model consumes
    fn input_dimensions(&self) -> (u32, u32);

    fn predict(&self, frame: &Frame) -> Result<DepthField, ModelError>;
}

/// Dense per-pixel model output. Units are model defined.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthField {
    width: u32,
    height: u32,
    values: Vec<f32>,
}

impl DepthField {
    pub fn new(width: u32, height: u32, values: Vec<f32>) -> Result<Self, ModelError> {
        let expected = width as usize * height as usize;
        if values.len() != expected {
            return Err(ModelError::OutputSize {
                expected,
                actual: values.len(),
            });
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.values
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Smallest and largest finite value
    pub fn range(&self) -> Option<(f32, f32)> {
        self.values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

/// Memory layout of the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TensorLayout {
    /// Interleaved RGB, channel values in `0..=255` before normalization
    Hwc255,
    /// Planar RGB, channel values in `0..=1` before normalization
    Chw,
}

/// Input contract of a depth model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    /// Square input edge length
    pub input_dim: u32,
    pub norm_mean: [f32; 3],
    pub norm_std: [f32; 3],
    pub layout: TensorLayout,
}

/// Known model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelPreset {
    Midas,
    DepthAnything,
}

impl ModelPreset {
    pub fn spec(self) -> ModelSpec {
        match self {
            ModelPreset::Midas => ModelSpec {
                name: "midas_v2_1_256x256".into(),
                input_dim: 256,
                norm_mean: [123.675, 116.28, 103.53],
                norm_std: [58.395, 57.12, 57.375],
                layout: TensorLayout::Hwc255,
            },
            ModelPreset::DepthAnything => ModelSpec {
                name: "depth_anything_v2_vits_210x210".into(),
                input_dim: 210,
                norm_mean: [0.485, 0.456, 0.406],
                norm_std: [0.229, 0.224, 0.225],
                layout: TensorLayout::Chw,
            },
        }
    }
}
