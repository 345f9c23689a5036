use image::RgbaImage;
use rayon::prelude::*;

use crate::state::AdjustmentState;

// Rec. 709-style luma weights used for desaturation.
const LUMA_R: f32 = 0.213;
const LUMA_G: f32 = 0.715;
const LUMA_B: f32 = 0.072;

/// 4x5 row-major color matrix over 0..=255 channel values.
///
/// Each row produces one output channel (R, G, B, A) as
/// `m0*R + m1*G + m2*B + m3*A + m4`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix(pub [f32; 20]);

impl ColorMatrix {
    pub const IDENTITY: Self = Self([
        1.0, 0.0, 0.0, 0.0, 0.0, //
        0.0, 1.0, 0.0, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, 0.0, //
        0.0, 0.0, 0.0, 1.0, 0.0,
    ]);

    /// 1.0 leaves colors untouched, 0.0 is fully gray, 2.0 doubles saturation.
    pub fn saturation(s: f32) -> Self {
        let inv = 1.0 - s;
        let r = LUMA_R * inv;
        let g = LUMA_G * inv;
        let b = LUMA_B * inv;
        Self([
            r + s, g, b, 0.0, 0.0, //
            r, g + s, b, 0.0, 0.0, //
            r, g, b + s, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// Scales the color channels, leaving alpha alone.
    pub fn scale(k: f32) -> Self {
        Self([
            k, 0.0, 0.0, 0.0, 0.0, //
            0.0, k, 0.0, 0.0, 0.0, //
            0.0, 0.0, k, 0.0, 0.0, //
            0.0, 0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// Adds a constant to the color channels.
    pub fn offset(v: f32) -> Self {
        Self([
            1.0, 0.0, 0.0, 0.0, v, //
            0.0, 1.0, 0.0, 0.0, v, //
            0.0, 0.0, 1.0, 0.0, v, //
            0.0, 0.0, 0.0, 1.0, 0.0,
        ])
    }

    /// Returns `post * self`: the result applies `self` first, then `post`.
    pub fn then(&self, post: &ColorMatrix) -> ColorMatrix {
        let a = &post.0;
        let b = &self.0;
        let mut out = [0.0_f32; 20];
        for row in 0..4 {
            for col in 0..5 {
                let mut v = 0.0;
                for k in 0..4 {
                    v += a[row * 5 + k] * b[k * 5 + col];
                }
                if col == 4 {
                    v += a[row * 5 + 4];
                }
                out[row * 5 + col] = v;
            }
        }
        ColorMatrix(out)
    }

    /// Saturation, then contrast, then brightness, composed into one matrix.
    pub fn for_adjustment(adj: &AdjustmentState) -> ColorMatrix {
        ColorMatrix::saturation(adj.saturation)
            .then(&ColorMatrix::scale(adj.contrast))
            .then(&ColorMatrix::offset(adj.brightness * 255.0))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    fn map_pixel(&self, px: &mut [u8]) {
        let m = &self.0;
        let src = [px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32];
        for (c, out) in px.iter_mut().enumerate().take(4) {
            let row = &m[c * 5..c * 5 + 5];
            let v = row[0] * src[0] + row[1] * src[1] + row[2] * src[2] + row[3] * src[3] + row[4];
            *out = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Applies `matrix` to every pixel of `img` in place, one row per rayon task.
pub fn apply_matrix(img: &mut RgbaImage, matrix: &ColorMatrix) {
    if matrix.is_identity() {
        return;
    }
    let stride = img.width() as usize * 4;
    if stride == 0 {
        return;
    }
    img.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            matrix.map_pixel(px);
        }
    });
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use crate::state::AdjustmentState;

    use super::{ColorMatrix, apply_matrix};

    fn one_pixel(px: [u8; 4]) -> RgbaImage {
        ImageBuffer::from_pixel(1, 1, Rgba(px))
    }

    #[test]
    fn neutral_adjustment_composes_to_identity() {
        let m = ColorMatrix::for_adjustment(&AdjustmentState::NEUTRAL);
        assert!(m.is_identity());
    }

    #[test]
    fn zero_saturation_produces_gray() {
        let mut img = one_pixel([200, 40, 10, 255]);
        apply_matrix(&mut img, &ColorMatrix::saturation(0.0));
        let p = img.get_pixel(0, 0).0;
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[3], 255);
    }

    #[test]
    fn contrast_scales_before_brightness_offset() {
        // scale(2) then offset(10): 50 * 2 + 10 = 110
        let m = ColorMatrix::scale(2.0).then(&ColorMatrix::offset(10.0));
        let mut img = one_pixel([50, 50, 50, 128]);
        apply_matrix(&mut img, &m);
        assert_eq!(img.get_pixel(0, 0).0, [110, 110, 110, 128]);
    }

    #[test]
    fn results_clamp_to_channel_range() {
        let mut img = one_pixel([250, 5, 128, 255]);
        apply_matrix(&mut img, &ColorMatrix::offset(20.0));
        assert_eq!(img.get_pixel(0, 0).0, [255, 25, 148, 255]);

        let mut img = one_pixel([10, 5, 128, 255]);
        apply_matrix(&mut img, &ColorMatrix::offset(-20.0));
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 108, 255]);
    }
}
