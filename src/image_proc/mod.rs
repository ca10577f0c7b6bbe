//! Image processing module.
//!
//! Provides image loading, fitting, three-colour dithering and bit-plane
//! encoding for the e-paper display.

pub mod bitplane;
pub mod dither;
pub mod load;
pub mod transform;

pub use bitplane::{BitPlane, Frame, encode};
pub use load::load_image;
pub use transform::fit_image;

use crate::display::PanelGeometry;
use image::DynamicImage;
use thiserror::Error;

/// Image processing errors
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Invalid image: {width}x{height}")]
    InvalidImage { width: u32, height: u32 },

    #[error("Image is {actual_width}x{actual_height}, panel needs {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("Failed to save preview: {0}")]
    Save(#[source] image::ImageError),
}

/// Full pipeline from a decoded image to panel planes
///
/// 1. Fit to panel geometry (rotate portrait, shrink, letterbox)
/// 2. Dither to the black/white/red palette
/// 3. Extract the black and red planes
pub fn prepare(img: DynamicImage, geometry: PanelGeometry) -> Result<Frame, ImageError> {
    tracing::info!("Starting image processing pipeline");

    let fitted = fit_image(img, geometry)?;
    let frame = encode(&fitted, geometry)?;

    tracing::info!("Image processing complete");
    Ok(frame)
}
