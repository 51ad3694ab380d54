//! CPU reference backend
//!
//! Estimates relative inverse depth from brightness and image position: bright
//! and low regions are treated as near. Crude, but it honours the full model
//! contract (input size, normalization, output shape) without a native
//! runtime, which makes it the default for the demo binary and for tests.

use std::thread;
use std::time::Duration;

use tracing::trace;

use super::preprocess::prepare_input;
use super::{DepthField, DepthModel, ModelSpec, TensorLayout};
use crate::error::ModelError;
use crate::Frame;

/// Rec. 601 luma weights
const LUMA: [f32; 3] = [0.299, 0.587, 0.114];

/// Share of the estimate taken from the vertical position prior
const GROUND_PRIOR: f32 = 0.35;

pub struct LuminanceDepthModel {
    spec: ModelSpec,
    latency: Duration,
}

impl LuminanceDepthModel {
    pub fn new(spec: ModelSpec) -> Self {
        Self {
            spec,
            latency: Duration::ZERO,
        }
    }

    /// Emulate a slower runtime by sleeping inside every prediction
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    /// Undo the normalization of one channel back to `0..=1`
    fn unit_channel(&self, value: f32, channel: usize) -> f32 {
        let raw = value * self.spec.norm_std[channel] + self.spec.norm_mean[channel];
        match self.spec.layout {
            TensorLayout::Hwc255 => raw / 255.0,
            TensorLayout::Chw => raw,
        }
    }
}

impl DepthModel for LuminanceDepthModel {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn input_dimensions(&self) -> (u32, u32) {
        (self.spec.input_dim, self.spec.input_dim)
    }

    fn predict(&self, frame: &Frame) -> Result<DepthField, ModelError> {
        let input = prepare_input(frame, &self.spec)?;
        let dim = self.spec.input_dim as usize;
        let plane = dim * dim;

        let channel = |i: usize, c: usize| match self.spec.layout {
            TensorLayout::Hwc255 => input[i * 3 + c],
            TensorLayout::Chw => input[c * plane + i],
        };

        let values = (0..plane)
            .map(|i| {
                let luma: f32 = (0..3)
                    .map(|c| LUMA[c] * self.unit_channel(channel(i, c), c))
                    .sum();
                let row = (i / dim) as f32 / dim.saturating_sub(1).max(1) as f32;
                (1.0 - GROUND_PRIOR) * luma.clamp(0.0, 1.0) + GROUND_PRIOR * row
            })
            .collect();

        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        trace!(model = %self.spec.name, sequence = frame.sequence, "Predicted depth");

        DepthField::new(self.spec.input_dim, self.spec.input_dim, values)
    }
}
