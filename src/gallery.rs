use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use tracing::{info, warn};

use crate::error::{EditError, Result};

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// Persists finished images somewhere the user can find them.
pub trait GalleryWriter: Send + Sync {
    /// Encodes `image` and stores it under a name derived from `name_hint`.
    fn save(&self, image: &RgbaImage, name_hint: &str) -> Result<PathBuf>;
}

/// Writes JPEG files into a pictures directory.
pub struct DirectoryGallery {
    pub dir: PathBuf,
    pub quality: u8,
}

impl DirectoryGallery {
    pub fn new(dir: PathBuf, quality: u8) -> Self {
        Self {
            dir,
            quality: quality.clamp(1, 100),
        }
    }
}

impl GalleryWriter for DirectoryGallery {
    fn save(&self, image: &RgbaImage, name_hint: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| EditError::Save(format!("{}: {}", self.dir.display(), e)))?;

        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let stem = format!("{}_{}", sanitize_hint(name_hint), millis);
        let output_path = build_output_path(&self.dir, &stem);

        if let Err(err) = write_jpeg(image, &output_path, self.quality) {
            warn!("save to {} failed: {:#}", output_path.display(), err);
            if output_path.exists() {
                let _ = std::fs::remove_file(&output_path);
            }
            return Err(EditError::Save(format!("{:#}", err)));
        }

        info!(path = %output_path.display(), "image saved");
        Ok(output_path)
    }
}

fn sanitize_hint(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn build_output_path(output_dir: &Path, stem: &str) -> PathBuf {
    let base = output_dir.join(format!("{}.jpg", stem));
    if !base.exists() {
        return base;
    }
    for n in 2..10000 {
        let candidate = output_dir.join(format!("{}-{}.jpg", stem, n));
        if !candidate.exists() {
            return candidate;
        }
    }
    output_dir.join(format!("{}-final.jpg", stem))
}

fn write_jpeg(image: &RgbaImage, output_path: &Path, quality: u8) -> anyhow::Result<()> {
    if image.width() == 0 || image.height() == 0 {
        anyhow::bail!("image has no pixels");
    }
    let file = std::fs::File::create(output_path)?;
    let writer = std::io::BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, quality.clamp(1, 100));
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    DynamicImage::ImageRgb8(rgb).write_with_encoder(encoder)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgba, RgbaImage};

    use crate::error::EditError;

    use super::{DirectoryGallery, GalleryWriter, build_output_path, sanitize_hint};

    #[test]
    fn saved_jpeg_decodes_with_same_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = DirectoryGallery::new(dir.path().join("Pictures"), 95);
        let img: RgbaImage = ImageBuffer::from_pixel(32, 24, Rgba([200, 100, 50, 255]));

        let path = gallery.save(&img, "Retouch").unwrap();
        assert_eq!(path.extension().unwrap(), "jpg");
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("Retouch_")
        );

        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (32, 24));
        let p = decoded.get_pixel(16, 12).0;
        assert!((p[0] as i32 - 200).abs() <= 3);
    }

    #[test]
    fn existing_names_get_numbered_suffix() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("shot.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("shot-2.jpg"), b"x").unwrap();
        assert_eq!(build_output_path(dir.path(), "shot"), dir.path().join("shot-3.jpg"));
    }

    #[test]
    fn hints_are_made_filename_safe() {
        assert_eq!(sanitize_hint("my photo/../x"), "my_photo____x");
        assert_eq!(sanitize_hint(""), "image");
    }

    #[test]
    fn empty_image_fails_without_leaving_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let gallery = DirectoryGallery::new(dir.path().to_path_buf(), 90);
        let err = gallery.save(&RgbaImage::new(0, 0), "empty").unwrap_err();
        assert!(matches!(err, EditError::Save(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn unwritable_directory_is_a_save_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        let gallery = DirectoryGallery::new(blocker, 90);
        let img: RgbaImage = ImageBuffer::from_pixel(2, 2, Rgba([0, 0, 0, 255]));
        assert!(matches!(gallery.save(&img, "x"), Err(EditError::Save(_))));
    }
}
