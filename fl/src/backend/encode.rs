use anyhow::{Context, Result};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::Path;

use super::ImageSink;

/// Writes images in the format implied by the destination extension.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageFileWriter;

impl ImageSink for ImageFileWriter {
    fn write(&self, image: &RgbaImage, dest: &Path) -> Result<()> {
        let format = ImageFormat::from_path(dest)
            .with_context(|| format!("No image encoder for {}", dest.display()))?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        image
            .save_with_format(dest, format)
            .with_context(|| format!("Failed to write image {}", dest.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_png_and_bmp() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbaImage::from_pixel(4, 3, image::Rgba([10, 20, 30, 255]));

        for name in ["a.png", "nested/b.bmp"] {
            let dest = dir.path().join(name);
            ImageFileWriter.write(&image, &dest).unwrap();
            let back = image::open(&dest).unwrap();
            assert_eq!((back.width(), back.height()), (4, 3));
        }
    }

    #[test]
    fn unknown_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        let image = RgbaImage::new(1, 1);
        assert!(ImageFileWriter.write(&image, &dir.path().join("a.xyz")).is_err());
    }
}
