//! Foliage segmentation: keep leaf-colored pixels, blacken the rest.
//!
//! This module defines the [`FoliageMasker`] trait for pluggable interval
//! tests and the [`FoliageMaskKind`] enum for selecting one at runtime.
//!
//! # Strategy pattern
//!
//! Two tuned interval tests exist for the same job. Both classify each
//! pixel independently from its own color (no neighborhood, no
//! morphology), set discarded pixels' RGB channels to zero and leave alpha
//! alone. The kind enum lets configuration pick one without changing the
//! pipeline.

use image::{GrayImage, Luma, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::hsv::{Hsv, rgb_to_hsv};

/// Mask value for kept (foliage) pixels.
pub const FOLIAGE: u8 = 255;

/// Mask value for discarded pixels.
pub const BACKGROUND: u8 = 0;

/// Selects which foliage interval test to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FoliageMaskKind {
    /// Hue in degrees within `[60, 180]`, saturation and value (both on
    /// the `[0, 255]` scale) at least 25.
    #[default]
    DegreeHue,

    /// Hue in half-degrees (8-bit convention, `round(h / 2)`) within
    /// `[30, 80]`, rounded saturation and value within `[40, 255]`.
    ///
    /// Stricter on dark and washed-out pixels and slightly narrower on the
    /// blue side than [`DegreeHue`](Self::DegreeHue).
    HalfDegreeHue,
}

impl std::fmt::Display for FoliageMaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DegreeHue => f.write_str("DegreeHue"),
            Self::HalfDegreeHue => f.write_str("HalfDegreeHue"),
        }
    }
}

/// Trait for foliage interval tests.
pub trait FoliageMasker {
    /// Whether a pixel with this color counts as foliage.
    fn is_foliage(&self, r: u8, g: u8, b: u8) -> bool;

    /// Segment a whole image.
    ///
    /// Returns a new raster; `image` is left untouched.
    fn segment(&self, image: &RgbaImage) -> Segmentation {
        let mut masked = image.clone();
        let mut mask = GrayImage::new(image.width(), image.height());
        let mut foliage_pixels = 0u64;

        for (pixel, mask_pixel) in masked.pixels_mut().zip(mask.pixels_mut()) {
            let [r, g, b, _] = pixel.0;
            if self.is_foliage(r, g, b) {
                *mask_pixel = Luma([FOLIAGE]);
                foliage_pixels += 1;
            } else {
                pixel.0[0] = 0;
                pixel.0[1] = 0;
                pixel.0[2] = 0;
            }
        }

        Segmentation {
            image: masked,
            mask,
            foliage_pixels,
        }
    }
}

impl FoliageMasker for FoliageMaskKind {
    fn is_foliage(&self, r: u8, g: u8, b: u8) -> bool {
        let hsv = rgb_to_hsv(r, g, b);
        match *self {
            Self::DegreeHue => degree_hue_test(hsv),
            Self::HalfDegreeHue => half_degree_hue_test(hsv),
        }
    }
}

/// Inclusive interval test on degree hue.
fn degree_hue_test(hsv: Hsv) -> bool {
    (60.0..=180.0).contains(&hsv.h) && hsv.s >= 25.0 && hsv.v >= 25.0
}

/// Inclusive interval test on the 8-bit half-degree encoding.
fn half_degree_hue_test(hsv: Hsv) -> bool {
    // Hue 359.x rounds to 180, which wraps to 0 in the 8-bit encoding.
    let h = (hsv.h / 2.0).round() % 180.0;
    let s = hsv.s.round();
    (30.0..=80.0).contains(&h) && (40.0..=255.0).contains(&s) && (40.0..=255.0).contains(&hsv.v)
}

/// Result of segmenting one image.
///
/// `image` and `mask` always have the source image's dimensions.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Source image with non-foliage RGB channels zeroed, alpha preserved.
    pub image: RgbaImage,
    /// Binary mask: [`FOLIAGE`] for kept pixels, [`BACKGROUND`] otherwise.
    pub mask: GrayImage,
    /// Number of kept pixels.
    pub foliage_pixels: u64,
}

impl Segmentation {
    /// Fraction of pixels kept, `0.0` for an empty image.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coverage(&self) -> f64 {
        let total = u64::from(self.mask.width()) * u64::from(self.mask.height());
        if total == 0 {
            0.0
        } else {
            self.foliage_pixels as f64 / total as f64
        }
    }
}
