use image::RgbaImage;
use image::imageops::{rotate90, rotate180, rotate270};

use crate::error::{EditError, Result};
use crate::state::{AdjustmentState, Rotation};

use super::color::{ColorMatrix, apply_matrix};

/// Renders the working image from `base` and `adj`.
/// Order: saturation → contrast → brightness (one matrix pass) → rotate.
///
/// `base` is never modified; the result is always a fresh buffer and is
/// bit-for-bit reproducible for identical inputs.
pub fn render(base: &RgbaImage, adj: &AdjustmentState) -> Result<RgbaImage> {
    adj.validate()?;
    if base.width() == 0 || base.height() == 0 {
        return Err(EditError::InvalidImage(format!(
            "cannot render a {}x{} image",
            base.width(),
            base.height()
        )));
    }

    let mut out = base.clone();
    apply_matrix(&mut out, &ColorMatrix::for_adjustment(adj));

    Ok(match adj.rotation {
        Rotation::Deg0 => out,
        Rotation::Deg90 => rotate90(&out),
        Rotation::Deg180 => rotate180(&out),
        Rotation::Deg270 => rotate270(&out),
    })
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use crate::error::EditError;
    use crate::state::{AdjustmentState, Rotation};

    use super::render;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        ImageBuffer::from_fn(w, h, |x, y| {
            Rgba([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8, 200])
        })
    }

    #[test]
    fn neutral_render_reproduces_base() {
        let base = gradient(37, 21);
        let out = render(&base, &AdjustmentState::NEUTRAL).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn render_is_deterministic() {
        let base = gradient(64, 48);
        let adj = AdjustmentState {
            brightness: -0.35,
            contrast: 1.4,
            saturation: 0.6,
            rotation: Rotation::Deg180,
        };
        let a = render(&base, &adj).unwrap();
        let b = render(&base, &adj).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn brightness_adds_scaled_offset_and_keeps_alpha() {
        let base: RgbaImage = ImageBuffer::from_pixel(100, 100, Rgba([128, 128, 128, 77]));
        let mut adj = AdjustmentState::NEUTRAL;
        adj.brightness = 0.2;
        let out = render(&base, &adj).unwrap();
        assert!(out.pixels().all(|p| p.0 == [179, 179, 179, 77]));

        let bright: RgbaImage = ImageBuffer::from_pixel(4, 4, Rgba([230, 230, 230, 255]));
        let out = render(&bright, &adj).unwrap();
        assert!(out.pixels().all(|p| p.0 == [255, 255, 255, 255]));
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let base = gradient(200, 100);
        let mut adj = AdjustmentState::NEUTRAL;
        adj.rotation = Rotation::Deg90;
        let out = render(&base, &adj).unwrap();
        assert_eq!(out.dimensions(), (100, 200));
        // Clockwise: the bottom-left source pixel lands top-left.
        assert_eq!(out.get_pixel(0, 0), base.get_pixel(0, 99));

        adj.rotation = Rotation::Deg180;
        assert_eq!(render(&base, &adj).unwrap().dimensions(), (200, 100));
    }

    #[test]
    fn render_leaves_base_untouched() {
        let base = gradient(16, 16);
        let copy = base.clone();
        let adj = AdjustmentState {
            brightness: 0.5,
            contrast: 0.5,
            saturation: 2.0,
            rotation: Rotation::Deg90,
        };
        let _ = render(&base, &adj).unwrap();
        assert_eq!(base, copy);
    }

    #[test]
    fn out_of_range_adjustment_is_rejected() {
        let base = gradient(4, 4);
        let mut adj = AdjustmentState::NEUTRAL;
        adj.saturation = 2.5;
        assert!(matches!(
            render(&base, &adj),
            Err(EditError::InvalidAdjustment(_))
        ));
    }

    #[test]
    fn empty_base_is_rejected() {
        let base = RgbaImage::new(0, 10);
        assert!(matches!(
            render(&base, &AdjustmentState::NEUTRAL),
            Err(EditError::InvalidImage(_))
        ));
    }
}
