//! Image decoding and model-input preparation.
//!
//! Raw bytes are decoded into an RGBA raster (the first pipeline step).
//! After foliage segmentation, the masked raster is resized to the model's
//! fixed square input with nearest-neighbor sampling and converted into a
//! `(1, 224, 224, 3)` float tensor. Pixel values stay in `[0, 255]`; the
//! model was trained on exactly this preprocessing.

use image::{DynamicImage, RgbaImage};
use ndarray::Array4;

use crate::types::PipelineError;

/// Side length of the square model input.
pub const MODEL_INPUT_SIZE: u32 = 224;

/// Number of color channels fed to the model (RGB; alpha is dropped).
pub const MODEL_INPUT_CHANNELS: usize = 3;

/// Decode raw image bytes.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// can decode with the enabled features).
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(image::load_from_memory(bytes)?)
}

/// Convert a decoded image to RGBA.
///
/// Images without an alpha channel become fully opaque.
#[must_use]
pub fn to_rgba(image: &DynamicImage) -> RgbaImage {
    image.to_rgba8()
}

/// Build a raster from caller-owned interleaved RGBA bytes.
///
/// For hosts that already hold decoded pixels (e.g. canvas image data).
///
/// # Errors
///
/// Returns [`PipelineError::Context`] if `pixels.len()` is not
/// `width * height * 4`.
pub fn raster_from_rgba(
    width: u32,
    height: u32,
    pixels: Vec<u8>,
) -> Result<RgbaImage, PipelineError> {
    let len = pixels.len();
    RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
        PipelineError::Context(format!(
            "{len} bytes cannot back a {width}x{height} RGBA raster"
        ))
    })
}

/// Source index sampled for destination index `dst` when resizing an axis
/// of length `src_len` to `dst_len`.
///
/// `floor((src_len / dst_len) * dst)` evaluated in `f64`, clamped to the
/// last source index: no half-pixel centers and no corner alignment. The
/// scale is computed first, so for some sizes the result is one below the
/// exact rational `floor(dst * src_len / dst_len)`; the model was trained
/// on inputs resized this way.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
fn nearest_source_index(dst: u32, src_len: u32, dst_len: u32) -> u32 {
    let scale = f64::from(src_len) / f64::from(dst_len);
    let idx = (scale * f64::from(dst)).floor() as u32;
    idx.min(src_len.saturating_sub(1))
}

/// Resize with nearest-neighbor sampling.
///
/// Each destination pixel copies exactly one source pixel; no
/// interpolation. An empty source produces a black, transparent output.
#[must_use]
pub fn resize_nearest(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
        return RgbaImage::new(width, height);
    }

    RgbaImage::from_fn(width, height, |x, y| {
        let sx = nearest_source_index(x, src_w, width);
        let sy = nearest_source_index(y, src_h, height);
        *image.get_pixel(sx, sy)
    })
}

/// Model input tensor, shape `(1, 224, 224, 3)`, NHWC layout.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor(Array4<f32>);

impl InputTensor {
    /// Shape of every model input tensor.
    pub const SHAPE: [usize; 4] = [
        1,
        MODEL_INPUT_SIZE as usize,
        MODEL_INPUT_SIZE as usize,
        MODEL_INPUT_CHANNELS,
    ];

    /// Build the model input from a raster of any size.
    ///
    /// Resizes to [`MODEL_INPUT_SIZE`] with [`resize_nearest`], keeps the
    /// RGB channels as `f32` in `[0, 255]` and adds the batch dimension.
    #[must_use]
    pub fn from_rgba(image: &RgbaImage) -> Self {
        let resized = resize_nearest(image, MODEL_INPUT_SIZE, MODEL_INPUT_SIZE);
        let tensor = Array4::from_shape_fn(Self::SHAPE, |(_, y, x, c)| {
            // Indices are bounded by MODEL_INPUT_SIZE.
            #[allow(clippy::cast_possible_truncation)]
            let pixel = resized.get_pixel(x as u32, y as u32);
            f32::from(pixel.0[c])
        });
        Self(tensor)
    }

    /// Tensor shape as `[batch, height, width, channels]`.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    /// Borrow the underlying array.
    #[must_use]
    pub const fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    /// Consume and return the underlying array.
    #[must_use]
    pub fn into_array(self) -> Array4<f32> {
        self.0
    }

    /// Flattened values in row-major (NHWC) order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.0.iter().copied().collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// Helper: encode an RGBA raster as a PNG byte buffer.
    fn encode_png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode(&[]);
        assert!(matches!(result, Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn truncated_png_returns_image_decode_error() {
        let png = encode_png(&RgbaImage::from_pixel(8, 8, image::Rgba([0, 200, 0, 255])));
        let result = decode(&png[..png.len() / 2]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes_with_original_dimensions() {
        let png = encode_png(&RgbaImage::from_pixel(17, 31, image::Rgba([1, 2, 3, 255])));
        let rgba = to_rgba(&decode(&png).unwrap());
        assert_eq!(rgba.dimensions(), (17, 31));
        assert_eq!(rgba.get_pixel(0, 0).0, [1, 2, 3, 255]);
    }

    #[test]
    fn raster_from_rgba_accepts_exact_length() {
        let raster = raster_from_rgba(2, 1, vec![1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        assert_eq!(raster.get_pixel(1, 0).0, [5, 6, 7, 8]);
    }

    #[test]
    fn raster_from_rgba_rejects_short_buffer() {
        let result = raster_from_rgba(2, 2, vec![0; 15]);
        assert!(matches!(result, Err(PipelineError::Context(_))));
    }

    #[test]
    fn nearest_index_floors_without_half_pixel_offset() {
        // Downscale 10 -> 4: floor(d * 10 / 4) = 0, 2, 5, 7.
        let picked: Vec<u32> = (0..4).map(|d| nearest_source_index(d, 10, 4)).collect();
        assert_eq!(picked, vec![0, 2, 5, 7]);
        // Upscale 2 -> 5: floor(d * 2 / 5) = 0, 0, 0, 1, 1.
        let picked: Vec<u32> = (0..5).map(|d| nearest_source_index(d, 2, 5)).collect();
        assert_eq!(picked, vec![0, 0, 0, 1, 1]);
    }

    #[test]
    fn nearest_index_scales_before_multiplying() {
        // 244 / 224 * 56 rounds to just under 61 in f64.
        assert_eq!(nearest_source_index(56, 244, 224), 60);
        // Exact multiples still land on the exact index.
        assert_eq!(nearest_source_index(112, 448, 224), 224);
        assert_eq!(nearest_source_index(223, 224, 224), 223);
    }

    #[test]
    fn resize_nearest_copies_source_pixels_exactly() {
        // Left half green, right half red: no blended colors may appear.
        let img = RgbaImage::from_fn(10, 6, |x, _| {
            if x < 5 {
                image::Rgba([0, 200, 0, 255])
            } else {
                image::Rgba([200, 0, 0, 255])
            }
        });
        let resized = resize_nearest(&img, 224, 224);
        assert_eq!(resized.dimensions(), (224, 224));
        for p in resized.pixels() {
            assert!(p.0 == [0, 200, 0, 255] || p.0 == [200, 0, 0, 255]);
        }
        // (10 / 224) * 111 floors to 4 (green), (10 / 224) * 112 to 5 (red).
        assert_eq!(resized.get_pixel(111, 0).0, [0, 200, 0, 255]);
        assert_eq!(resized.get_pixel(112, 0).0, [200, 0, 0, 255]);
    }

    #[test]
    fn resize_nearest_of_empty_image_is_blank() {
        let resized = resize_nearest(&RgbaImage::new(0, 0), 3, 3);
        assert!(resized.pixels().all(|p| p.0 == [0, 0, 0, 0]));
    }

    #[test]
    fn tensor_has_fixed_shape() {
        let tensor = InputTensor::from_rgba(&RgbaImage::from_pixel(
            5,
            9,
            image::Rgba([10, 20, 30, 40]),
        ));
        assert_eq!(tensor.shape(), &[1, 224, 224, 3]);
        assert_eq!(tensor.to_vec().len(), 224 * 224 * 3);
    }

    #[test]
    fn tensor_keeps_byte_range_and_drops_alpha() {
        let tensor = InputTensor::from_rgba(&RgbaImage::from_pixel(
            4,
            4,
            image::Rgba([10, 20, 255, 7]),
        ));
        let values = tensor.to_vec();
        assert_eq!(&values[..3], &[10.0, 20.0, 255.0]);
        assert_eq!(&values[3..6], &[10.0, 20.0, 255.0]);
        assert!(values.iter().all(|v| (*v - 7.0).abs() > f32::EPSILON));
    }

    #[test]
    fn tensor_layout_is_row_major_nhwc() {
        // Pixel (x=1, y=0) of a 224x224 image lands at flat offset 3.
        let img = RgbaImage::from_fn(224, 224, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 0, 255])
        });
        let tensor = InputTensor::from_rgba(&img);
        let arr = tensor.as_array();
        assert!((arr[[0, 0, 1, 0]] - 1.0).abs() < f32::EPSILON);
        assert!((arr[[0, 5, 0, 1]] - 5.0).abs() < f32::EPSILON);
        let flat = tensor.to_vec();
        assert!((flat[3] - 1.0).abs() < f32::EPSILON);
    }
}
