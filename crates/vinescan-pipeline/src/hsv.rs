//! RGB to HSV conversion.
//!
//! Hue is expressed in degrees `[0, 360)`. Saturation and value are
//! scaled to `[0, 255]` rather than `[0, 1]` so they share the byte range
//! of the RGB channels; the foliage thresholds are tuned against this
//! scaling and must not be rescaled.

use serde::{Deserialize, Serialize};

/// A color in hue / saturation / value form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hsv {
    /// Hue in degrees, `[0, 360)`.
    pub h: f64,
    /// Saturation, `[0, 255]`.
    pub s: f64,
    /// Value (brightness), `[0, 255]`.
    pub v: f64,
}

impl Hsv {
    /// Create a new HSV triple.
    #[must_use]
    pub const fn new(h: f64, s: f64, v: f64) -> Self {
        Self { h, s, v }
    }
}

/// Convert one RGB triple to HSV.
///
/// Achromatic input (`r == g == b`) has hue 0. When several channels share
/// the maximum, the red branch wins over green, and green over blue.
#[must_use]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> Hsv {
    let (rf, gf, bf) = (f64::from(r), f64::from(g), f64::from(b));
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f64::from(max - min);
    let v = f64::from(max);

    let s = if max == 0 { 0.0 } else { delta / v * 255.0 };

    if max == min {
        return Hsv::new(0.0, s, v);
    }

    let sector = if max == r {
        ((gf - bf) / delta) % 6.0
    } else if max == g {
        (bf - rf) / delta + 2.0
    } else {
        (rf - gf) / delta + 4.0
    };

    let mut h = sector * 60.0;
    if h < 0.0 {
        h += 360.0;
    }

    Hsv::new(h, s, v)
}
