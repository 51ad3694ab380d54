use image::{imageops, RgbImage};
use jpeg_decoder::Decoder;

use super::frame::{FrameMetadata, PixelFormat};
use crate::error::DecodeError;

/// Decode a raw camera buffer into a tightly packed RGB24 image
pub fn decode_frame(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    if meta.format != PixelFormat::Mjpeg && (meta.width == 0 || meta.height == 0) {
        return Ok(RgbImage::new(meta.width, meta.height));
    }

    match meta.format {
        PixelFormat::Mjpeg => decode_jpeg(data),
        PixelFormat::Rgb24 => packed(data, meta, |px| [px[0], px[1], px[2]]),
        PixelFormat::Bgr24 => packed(data, meta, |px| [px[2], px[1], px[0]]),
        PixelFormat::Yuyv4 => yuyv_to_rgb(data, meta),
        PixelFormat::Nv12 => nv12_to_rgb(data, meta),
    }
}

/// Rotate clockwise by a multiple of 90 degrees
pub fn rotate(image: RgbImage, degrees: u32) -> Result<RgbImage, DecodeError> {
    match degrees % 360 {
        0 => Ok(image),
        90 => Ok(imageops::rotate90(&image)),
        180 => Ok(imageops::rotate180(&image)),
        270 => Ok(imageops::rotate270(&image)),
        _ => Err(DecodeError::Rotation(degrees)),
    }
}

fn decode_jpeg(data: &[u8]) -> Result<RgbImage, DecodeError> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder.info().ok_or_else(|| {
        DecodeError::Jpeg(jpeg_decoder::Error::Format("missing image info".into()))
    })?;
    let (width, height) = (u32::from(info.width), u32::from(info.height));

    let rgb = match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => pixels,
        jpeg_decoder::PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => return Err(DecodeError::JpegPixelFormat(other)),
    };

    into_image(PixelFormat::Mjpeg, width, height, rgb)
}

fn into_image(
    format: PixelFormat,
    width: u32,
    height: u32,
    rgb: Vec<u8>,
) -> Result<RgbImage, DecodeError> {
    let expected = width as usize * height as usize * 3;
    let actual = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(DecodeError::BufferSize {
        format,
        expected,
        actual,
    })
}

fn check_len(data: &[u8], format: PixelFormat, expected: usize) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::BufferSize {
            format,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

/// Row stride in pixels, never narrower than the image
fn stride(meta: &FrameMetadata) -> usize {
    meta.stride.max(meta.width) as usize
}

/// Three bytes per pixel formats
fn packed(
    data: &[u8],
    meta: &FrameMetadata,
    to_rgb: impl Fn(&[u8]) -> [u8; 3],
) -> Result<RgbImage, DecodeError> {
    let (width, height) = (meta.width as usize, meta.height as usize);
    let row_bytes = stride(meta) * 3;
    check_len(data, meta.format, row_bytes * height.saturating_sub(1) + width * 3)?;

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in data.chunks(row_bytes).take(height) {
        for px in row[..width * 3].chunks_exact(3) {
            rgb.extend_from_slice(&to_rgb(px));
        }
    }
    into_image(meta.format, meta.width, meta.height, rgb)
}

fn yuyv_to_rgb(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    let (width, height) = (meta.width as usize, meta.height as usize);
    let row_bytes = stride(meta) * 2;
    check_len(data, meta.format, row_bytes * height.saturating_sub(1) + width * 2)?;

    let mut rgb = Vec::with_capacity(width * height * 3);
    for row in data.chunks(row_bytes).take(height) {
        // Each macropixel carries two luma samples sharing one chroma pair
        for (x, pair) in row[..width * 2].chunks(4).enumerate() {
            let (y0, u) = (pair[0], pair.get(1).copied().unwrap_or(128));
            let (y1, v) = (pair.get(2).copied(), pair.get(3).copied().unwrap_or(128));
            rgb.extend_from_slice(&yuv_to_rgb(y0, u, v));
            if let Some(y1) = y1 {
                if x * 2 + 1 < width {
                    rgb.extend_from_slice(&yuv_to_rgb(y1, u, v));
                }
            }
        }
    }
    into_image(meta.format, meta.width, meta.height, rgb)
}

fn nv12_to_rgb(data: &[u8], meta: &FrameMetadata) -> Result<RgbImage, DecodeError> {
    let (width, height) = (meta.width as usize, meta.height as usize);
    let stride = stride(meta);
    // Interleaved UV rows always hold whole pairs
    let chroma_stride = stride + stride % 2;
    let luma_len = stride * height;
    let chroma_rows = height.div_ceil(2);
    check_len(data, meta.format, luma_len + chroma_stride * chroma_rows)?;

    let (luma, chroma) = data.split_at(luma_len);
    let mut rgb = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let chroma_row = &chroma[(y / 2) * chroma_stride..];
        for x in 0..width {
            let uv = (x / 2) * 2;
            rgb.extend_from_slice(&yuv_to_rgb(
                luma[y * stride + x],
                chroma_row[uv],
                chroma_row[uv + 1],
            ));
        }
    }
    into_image(meta.format, meta.width, meta.height, rgb)
}

/// BT.601 full range
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = f32::from(y);
    let u = f32::from(u) - 128.0;
    let v = f32::from(v) - 128.0;
    let clamp = |c: f32| c.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * v),
        clamp(y - 0.344_136 * u - 0.714_136 * v),
        clamp(y + 1.772 * u),
    ]
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn meta(format: PixelFormat, width: u32, height: u32) -> FrameMetadata {
        FrameMetadata {
            sequence: 1,
            width,
            height,
            stride: width,
            format,
            rotation: 0,
            device_timestamp: None,
        }
    }

    #[test]
    fn rgb24_passes_through() {
        let data: Vec<u8> = (0..12).collect();
        let image = decode_frame(&data, &meta(PixelFormat::Rgb24, 2, 2)).unwrap();
        assert_eq!(image.dimensions(), (2, 2));
        assert_eq!(image.into_raw(), data);
    }

    #[test]
    fn rgb24_honours_row_stride() {
        let mut m = meta(PixelFormat::Rgb24, 1, 2);
        m.stride = 2;
        let data = [1, 2, 3, 9, 9, 9, 4, 5, 6];
        let image = decode_frame(&data, &m).unwrap();
        assert_eq!(image.into_raw(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn bgr24_swaps_channels() {
        let image = decode_frame(&[10, 20, 30], &meta(PixelFormat::Bgr24, 1, 1)).unwrap();
        assert_eq!(image.into_raw(), vec![30, 20, 10]);
    }

    #[test]
    fn neutral_chroma_yields_grey() {
        let yuyv = [128, 128, 128, 128];
        let image = decode_frame(&yuyv, &meta(PixelFormat::Yuyv4, 2, 1)).unwrap();
        assert_eq!(image.into_raw(), vec![128; 6]);

        let nv12 = [200, 200, 200, 200, 128, 128];
        let image = decode_frame(&nv12, &meta(PixelFormat::Nv12, 2, 2)).unwrap();
        assert_eq!(image.into_raw(), vec![200; 12]);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let err = decode_frame(&[0; 5], &meta(PixelFormat::Rgb24, 2, 1)).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::BufferSize {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn mjpeg_round_trips_dimensions() {
        let source = RgbImage::from_pixel(8, 4, image::Rgb([90, 160, 40]));
        let mut jpeg = Cursor::new(Vec::new());
        source.write_to(&mut jpeg, image::ImageFormat::Jpeg).unwrap();

        let image = decode_frame(jpeg.get_ref(), &meta(PixelFormat::Mjpeg, 8, 4)).unwrap();
        assert_eq!(image.dimensions(), (8, 4));
        let px = image.get_pixel(3, 2);
        assert!(px[1].abs_diff(160) < 8, "green channel drifted: {px:?}");
    }

    #[test]
    fn garbage_mjpeg_is_an_error() {
        let err = decode_frame(b"not a jpeg", &meta(PixelFormat::Mjpeg, 8, 4)).unwrap_err();
        assert!(matches!(err, DecodeError::Jpeg(_)));
    }

    #[test]
    fn rotation_swaps_dimensions() {
        let image = RgbImage::new(4, 2);
        assert_eq!(rotate(image.clone(), 90).unwrap().dimensions(), (2, 4));
        assert_eq!(rotate(image.clone(), 180).unwrap().dimensions(), (4, 2));
        assert!(matches!(rotate(image, 45), Err(DecodeError::Rotation(45))));
    }
}
