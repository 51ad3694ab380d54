//! Frame to input-tensor conversion shared by model backends

use image::imageops::{self, FilterType};
use image::RgbImage;

use super::{ModelSpec, TensorLayout};
use crate::error::ModelError;
use crate::Frame;

/// View a frame's RGB24 buffer as an image
pub fn frame_image(frame: &Frame) -> Result<RgbImage, ModelError> {
    if frame.width == 0 || frame.height == 0 {
        return Err(ModelError::EmptyInput {
            width: frame.width,
            height: frame.height,
        });
    }
    let expected = frame.width as usize * frame.height as usize * 3;
    if frame.data.len() != expected {
        return Err(ModelError::InputSize {
            expected,
            actual: frame.data.len(),
        });
    }
    RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec()).ok_or(
        ModelError::InputSize {
            expected,
            actual: frame.data.len(),
        },
    )
}

/// Scale a frame to the square model input
pub fn resize_frame(frame: &Frame, dim: u32) -> Result<RgbImage, ModelError> {
    let image = frame_image(frame)?;
    if image.dimensions() == (dim, dim) {
        return Ok(image);
    }
    Ok(imageops::resize(&image, dim, dim, FilterType::Triangle))
}

/// Interleaved `[r, g, b, r, g, b, ...]`, channels in `0..=255` normalized by
/// `(value - mean) / std`
pub fn to_hwc_f32(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Vec<f32> {
    image
        .pixels()
        .flat_map(|px| {
            [0, 1, 2].map(|c| (f32::from(px[c]) - mean[c]) / std[c])
        })
        .collect()
}

/// Planar `[r..., g..., b...]`, channels scaled to `0..=1` then normalized by
/// `(value - mean) / std`
pub fn to_chw_f32(image: &RgbImage, mean: [f32; 3], std: [f32; 3]) -> Vec<f32> {
    let plane = image.width() as usize * image.height() as usize;
    let mut out = vec![0.0; plane * 3];
    for (i, px) in image.pixels().enumerate() {
        for c in 0..3 {
            out[c * plane + i] = (f32::from(px[c]) / 255.0 - mean[c]) / std[c];
        }
    }
    out
}

/// Resize and normalize a frame the way `spec` expects
pub fn prepare_input(frame: &Frame, spec: &ModelSpec) -> Result<Vec<f32>, ModelError> {
    let image = resize_frame(frame, spec.input_dim)?;
    Ok(match spec.layout {
        TensorLayout::Hwc255 => to_hwc_f32(&image, spec.norm_mean, spec.norm_std),
        TensorLayout::Chw => to_chw_f32(&image, spec.norm_mean, spec.norm_std),
    })
}
