//! Depth field to displayable image

use image::{Rgb, RgbImage};

use crate::depth::DepthField;

/// Pure mapping from a depth field to an RGB image
pub type Colormap = fn(&DepthField) -> RgbImage;

/// Inferno-like gradient, dark (far) to bright (near)
const STOPS: [(f32, [u8; 3]); 5] = [
    (0.0, [0, 0, 4]),
    (0.25, [87, 16, 110]),
    (0.5, [188, 55, 84]),
    (0.75, [249, 142, 9]),
    (1.0, [252, 255, 164]),
];

/// Min-max normalize `field` and map it through the gradient.
///
/// Non-finite values and constant fields map to the darkest color.
pub fn depth_colormap(field: &DepthField) -> RgbImage {
    let (lo, hi) = field.range().unwrap_or((0.0, 0.0));
    let span = hi - lo;

    let mut image = RgbImage::new(field.width(), field.height());
    for (px, &value) in image.pixels_mut().zip(field.values()) {
        let t = if value.is_finite() && span > 0.0 {
            (value - lo) / span
        } else {
            0.0
        };
        *px = gradient(t);
    }
    image
}

fn gradient(t: f32) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let upper = STOPS
        .iter()
        .position(|&(at, _)| at >= t)
        .unwrap_or(STOPS.len() - 1)
        .max(1);
    let (t0, c0) = STOPS[upper - 1];
    let (t1, c1) = STOPS[upper];
    let f = (t - t0) / (t1 - t0);
    Rgb([0, 1, 2].map(|c| {
        (f32::from(c0[c]) + f * (f32::from(c1[c]) - f32::from(c0[c]))).round() as u8
    }))
}
