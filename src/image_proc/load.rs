//! Image loading.
//!
//! Decodes PNG, JPEG and BMP files from disk.

use super::ImageError;
use image::DynamicImage;
use std::path::Path;

/// Decode an image file, guessing the format from its contents
pub fn load_image(path: &Path) -> Result<DynamicImage, ImageError> {
    tracing::info!("Loading image from {}", path.display());

    let img = image::ImageReader::open(path)
        .map_err(image::ImageError::IoError)?
        .with_guessed_format()
        .map_err(image::ImageError::IoError)?
        .decode()?;

    tracing::debug!(
        "Decoded {}x{} image ({:?})",
        img.width(),
        img.height(),
        img.color()
    );

    Ok(img)
}
