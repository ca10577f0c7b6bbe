//! Black and red bit planes for the panel RAM banks.
//!
//! One bit per pixel, MSB is the leftmost pixel of each 8-pixel run,
//! rows of `stride` bytes top to bottom.
//!
//! Black plane: 0 = black, 1 = white or red.
//! Red plane: 0 = red, 1 = white or black. The controller inverts red RAM
//! (display update control 1), so red is sent pre-inverted.

use super::ImageError;
use super::dither::{TriColor, TriColorImage, dither_image};
use crate::display::PanelGeometry;
use image::RgbImage;

/// Packed 1-bit plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitPlane {
    geometry: PanelGeometry,
    data: Vec<u8>,
}

impl BitPlane {
    /// Plane with every byte set to `byte`
    pub fn filled(geometry: PanelGeometry, byte: u8) -> Self {
        Self {
            geometry,
            data: vec![byte; geometry.plane_len()],
        }
    }

    pub fn geometry(&self) -> PanelGeometry {
        self.geometry
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Packed bytes of row `y`
    pub fn row(&self, y: u32) -> &[u8] {
        let stride = self.geometry.stride();
        let start = y as usize * stride;
        &self.data[start..start + stride]
    }

    #[allow(dead_code)]
    pub fn get(&self, x: u32, y: u32) -> bool {
        let (index, mask) = self.locate(x, y);
        self.data[index] & mask != 0
    }

    pub fn set(&mut self, x: u32, y: u32, bit: bool) {
        let (index, mask) = self.locate(x, y);
        if bit {
            self.data[index] |= mask;
        } else {
            self.data[index] &= !mask;
        }
    }

    fn locate(&self, x: u32, y: u32) -> (usize, u8) {
        let index = y as usize * self.geometry.stride() + (x / 8) as usize;
        (index, 0x80 >> (x % 8))
    }
}

/// Everything the panel needs for one image
#[derive(Debug, Clone)]
pub struct Frame {
    pub tricolor: TriColorImage,
    pub black: BitPlane,
    pub red: BitPlane,
}

/// Quantize a fitted image and split it into the two planes
pub fn encode(image: &RgbImage, geometry: PanelGeometry) -> Result<Frame, ImageError> {
    let (width, height) = image.dimensions();
    if (width, height) != (geometry.width, geometry.height) {
        return Err(ImageError::DimensionMismatch {
            expected_width: geometry.width,
            expected_height: geometry.height,
            actual_width: width,
            actual_height: height,
        });
    }

    let tricolor = dither_image(image);
    let (black, red) = extract_planes(&tricolor, geometry);

    tracing::debug!("Encoded planes, {} bytes each", black.as_bytes().len());

    Ok(Frame {
        tricolor,
        black,
        red,
    })
}

/// Split a three-colour image into (black, red) planes
///
/// Padding bits past the right edge stay 1 (blank) in both planes.
fn extract_planes(image: &TriColorImage, geometry: PanelGeometry) -> (BitPlane, BitPlane) {
    let mut black = BitPlane::filled(geometry, 0xFF);
    let mut red = BitPlane::filled(geometry, 0xFF);

    for (y, row) in image.rows().enumerate() {
        for (x, color) in row.iter().enumerate() {
            match color {
                TriColor::Black => black.set(x as u32, y as u32, false),
                TriColor::Red => red.set(x as u32, y as u32, false),
                TriColor::White => {}
            }
        }
    }

    (black, red)
}
