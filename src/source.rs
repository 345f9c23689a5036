use std::path::Path;

use image::{DynamicImage, RgbaImage};
use tracing::debug;

use crate::error::{EditError, Result};

static RAW_EXTS: &[&str] = &["raf", "dng", "nef", "cr2", "arw"];
static SUPPORTED_IMAGE_EXTS: &[&str] = &[
    "jpg", "jpeg", "png", "tiff", "tif", "webp", "bmp", "gif", "raf", "dng", "nef", "cr2", "arw",
];

fn has_extension(path: &Path, exts: &[&str]) -> bool {
    let Some(ext) = path.extension().map(|e| e.to_string_lossy()) else {
        return false;
    };
    exts.iter().any(|known| ext.eq_ignore_ascii_case(known))
}

pub fn is_raw_image(path: &Path) -> bool {
    has_extension(path, RAW_EXTS)
}

/// Returns `true` if the path has a supported image extension.
pub fn is_supported_image(path: &Path) -> bool {
    has_extension(path, SUPPORTED_IMAGE_EXTS)
}

/// Supplies decoded RGBA rasters for the editor.
pub trait ImageSource: Send + Sync {
    fn open(&self, path: &Path) -> Result<RgbaImage>;
}

/// Decodes files from disk, developing RAW files when the standard decoders
/// cannot read them.
pub struct FileImageSource {
    /// Longest edge kept in memory; larger images are downscaled on load.
    pub max_edge: Option<u32>,
}

impl ImageSource for FileImageSource {
    fn open(&self, path: &Path) -> Result<RgbaImage> {
        let img = open_with_hooks(path, |p| Ok(image::open(p)?), open_raw)
            .map_err(|e| EditError::InvalidImage(format!("{}: {:#}", path.display(), e)))?;
        let img = match self.max_edge {
            Some(edge) if edge > 0 && (img.width() > edge || img.height() > edge) => {
                debug!(
                    width = img.width(),
                    height = img.height(),
                    edge,
                    "downscaling on load"
                );
                img.thumbnail(edge, edge)
            }
            _ => img,
        };
        let rgba = img.into_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(EditError::InvalidImage(format!(
                "{} has no pixels",
                path.display()
            )));
        }
        Ok(rgba)
    }
}

fn open_with_hooks<FStd, FRaw>(
    path: &Path,
    open_std: FStd,
    open_raw: FRaw,
) -> anyhow::Result<DynamicImage>
where
    FStd: Fn(&Path) -> anyhow::Result<DynamicImage>,
    FRaw: Fn(&Path) -> anyhow::Result<DynamicImage>,
{
    match open_std(path) {
        Ok(img) => Ok(img),
        Err(err) if !is_raw_image(path) => Err(err),
        Err(err) => {
            debug!("standard decode failed for {}: {:#}", path.display(), err);
            open_raw(path)
        }
    }
}

fn open_raw(path: &Path) -> anyhow::Result<DynamicImage> {
    let raw = rawler::decode_file(path)?;
    let develop = rawler::imgop::develop::RawDevelop::default();
    let intermediate = develop.develop_intermediate(&raw)?;
    intermediate
        .to_dynamic_image()
        .ok_or_else(|| anyhow::anyhow!("raw develop produced invalid image"))
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::path::Path;

    use image::{DynamicImage, ImageBuffer, Rgba};

    use crate::error::EditError;

    use super::{FileImageSource, ImageSource, is_raw_image, is_supported_image, open_with_hooks};

    fn img(px: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(ImageBuffer::from_pixel(1, 1, Rgba(px)))
    }

    #[test]
    fn raw_fallback_runs_only_after_standard_decode_fails() {
        let raw_calls = Cell::new(0);
        let out = open_with_hooks(
            Path::new("/tmp/test.raf"),
            |_: &Path| anyhow::bail!("unsupported"),
            |_: &Path| {
                raw_calls.set(raw_calls.get() + 1);
                Ok(img([4, 5, 6, 255]))
            },
        )
        .expect("raw develop should be used");
        assert_eq!(raw_calls.get(), 1);
        assert_eq!(out.to_rgba8().get_pixel(0, 0).0, [4, 5, 6, 255]);
    }

    #[test]
    fn non_raw_failure_skips_raw_develop() {
        let raw_calls = Cell::new(0);
        let out = open_with_hooks(
            Path::new("/tmp/test.jpg"),
            |_: &Path| anyhow::bail!("corrupt"),
            |_: &Path| {
                raw_calls.set(raw_calls.get() + 1);
                Ok(img([0, 0, 0, 255]))
            },
        );
        assert!(out.is_err());
        assert_eq!(raw_calls.get(), 0);
    }

    #[test]
    fn extension_checks_are_case_insensitive() {
        assert!(is_raw_image(Path::new("/tmp/a.DNG")));
        assert!(!is_raw_image(Path::new("/tmp/a.png")));
        assert!(is_supported_image(Path::new("/tmp/a.JPeg")));
        assert!(!is_supported_image(Path::new("/tmp/a.txt")));
    }

    #[test]
    fn large_images_are_downscaled_to_max_edge() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        ImageBuffer::from_pixel(400, 100, Rgba([1u8, 2, 3, 255]))
            .save(&path)
            .unwrap();

        let source = FileImageSource { max_edge: Some(200) };
        assert_eq!(source.open(&path).unwrap().dimensions(), (200, 50));

        let source = FileImageSource { max_edge: None };
        assert_eq!(source.open(&path).unwrap().dimensions(), (400, 100));
    }

    #[test]
    fn undecodable_file_is_an_invalid_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();
        let source = FileImageSource { max_edge: None };
        assert!(matches!(source.open(&path), Err(EditError::InvalidImage(_))));
    }
}
