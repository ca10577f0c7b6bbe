//! Image fitting for display preparation.
//!
//! Portrait images are turned to landscape, shrunk (never enlarged) to fit
//! the panel, then centred on a white canvas of exactly panel size.

use super::ImageError;
use crate::display::PanelGeometry;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgb, RgbImage};

/// Letterbox background
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Fit an image to the panel
///
/// Applies, in order:
/// - A clockwise quarter turn when the image is taller than wide
/// - Aspect-preserving shrink to fit within the panel (no upscaling)
/// - Centring on a white canvas
pub fn fit_image(img: DynamicImage, target: PanelGeometry) -> Result<RgbImage, ImageError> {
    let (src_width, src_height) = img.dimensions();
    if src_width == 0 || src_height == 0 {
        return Err(ImageError::InvalidImage {
            width: src_width,
            height: src_height,
        });
    }

    let img = normalize_orientation(img);
    let (width, height) = img.dimensions();

    if (width, height) == (target.width, target.height) {
        tracing::debug!("Image already {}x{}, no scaling needed", width, height);
        return Ok(img.into_rgb8());
    }

    let (new_width, new_height) = fit_within(width, height, target.width, target.height);

    tracing::debug!(
        "Scaling {}x{} -> {}x{} (fit into {}x{})",
        width,
        height,
        new_width,
        new_height,
        target.width,
        target.height
    );

    let resized = if (new_width, new_height) == (width, height) {
        img.into_rgb8()
    } else {
        img.resize_exact(new_width, new_height, FilterType::CatmullRom)
            .into_rgb8()
    };

    Ok(letterbox(&resized, target))
}

/// Rotate portrait images to landscape
fn normalize_orientation(img: DynamicImage) -> DynamicImage {
    if img.height() > img.width() {
        tracing::debug!("Rotating portrait image {}x{}", img.width(), img.height());
        img.rotate90()
    } else {
        img
    }
}

/// Largest size within `max_width` x `max_height` with the source aspect ratio
///
/// Never grows the image. Computed in integers so exact ratios land exactly
/// on the bounds.
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_width as u64, max_height as u64);

    // Width is the limiting side when mw/w <= mh/h
    if mw * h <= mh * w {
        let scaled_h = (h * mw + w / 2) / w;
        (max_width, scaled_h.clamp(1, mh) as u32)
    } else {
        let scaled_w = (w * mh + h / 2) / h;
        (scaled_w.clamp(1, mw) as u32, max_height)
    }
}

/// Centre `img` on a white canvas of the target size
fn letterbox(img: &RgbImage, target: PanelGeometry) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(target.width, target.height, BACKGROUND);

    let (x1, y1) = centre_offset(img.dimensions(), target);
    image::imageops::overlay(&mut canvas, img, x1 as i64, y1 as i64);

    canvas
}

fn centre_offset((width, height): (u32, u32), target: PanelGeometry) -> (u32, u32) {
    (
        target.width.saturating_sub(width) / 2,
        target.height.saturating_sub(height) / 2,
    )
}
