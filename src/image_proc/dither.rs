//! Floyd-Steinberg dithering for the black/white/red e-paper palette.
//!
//! Converts RGB images to a [`TriColorImage`] using error diffusion.
//!
//! Only two rows of error accumulation are kept in memory at a time.

use image::{Rgb, RgbImage};

/// Panel colours, in palette order (ties resolve to the earlier entry)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriColor {
    White,
    Black,
    Red,
}

impl TriColor {
    pub fn rgb(self) -> Rgb<u8> {
        match self {
            TriColor::White => Rgb([255, 255, 255]),
            TriColor::Black => Rgb([0, 0, 0]),
            TriColor::Red => Rgb([255, 0, 0]),
        }
    }
}

/// RGB values for each display colour (using i16 for error diffusion arithmetic)
const PALETTE: [(TriColor, (i16, i16, i16)); 3] = [
    (TriColor::White, (255, 255, 255)),
    (TriColor::Black, (0, 0, 0)),
    (TriColor::Red, (255, 0, 0)),
];

/// Image where every pixel is one of the three panel colours
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriColorImage {
    width: u32,
    height: u32,
    pixels: Vec<TriColor>,
}

impl TriColorImage {
    pub fn get(&self, x: u32, y: u32) -> TriColor {
        self.pixels[(y * self.width + x) as usize]
    }

    /// Rows of pixels, top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[TriColor]> {
        self.pixels.chunks(self.width.max(1) as usize)
    }

    /// Render back to RGB, e.g. for a preview file
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_fn(self.width, self.height, |x, y| self.get(x, y).rgb())
    }
}

/// Find the nearest palette colour using Euclidean distance in RGB space
/// Uses i32 internally for distance calculation to avoid overflow
#[inline]
fn find_nearest_color(r: i16, g: i16, b: i16) -> usize {
    PALETTE
        .iter()
        .enumerate()
        .min_by_key(|(_, (_, (pr, pg, pb)))| {
            let dr = (r - pr) as i32;
            let dg = (g - pg) as i32;
            let db = (b - pb) as i32;
            dr * dr + dg * dg + db * db
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Apply Floyd-Steinberg dithering to an RGB image
pub fn dither_image(img: &RgbImage) -> TriColorImage {
    let (width, height) = img.dimensions();
    let width_usize = width as usize;
    let height_usize = height as usize;

    tracing::info!("Applying Floyd-Steinberg dithering ({}x{})", width, height);

    // Current and next row error accumulators
    let mut curr_row: Vec<(i16, i16, i16)> = vec![(0, 0, 0); width_usize];
    let mut next_row: Vec<(i16, i16, i16)> = vec![(0, 0, 0); width_usize];

    let mut pixels = Vec::with_capacity(width_usize * height_usize);

    for y in 0..height_usize {
        // Load current row pixels and add accumulated error from previous row
        for x in 0..width_usize {
            let p = img.get_pixel(x as u32, y as u32);
            curr_row[x].0 += p[0] as i16;
            curr_row[x].1 += p[1] as i16;
            curr_row[x].2 += p[2] as i16;
        }

        for x in 0..width_usize {
            let (r, g, b) = curr_row[x];

            let r = r.clamp(0, 255);
            let g = g.clamp(0, 255);
            let b = b.clamp(0, 255);

            let color_idx = find_nearest_color(r, g, b);
            let (color, (pr, pg, pb)) = PALETTE[color_idx];

            let err_r = r - pr;
            let err_g = g - pg;
            let err_b = b - pb;

            // Right: 7/16
            if x + 1 < width_usize {
                curr_row[x + 1].0 += err_r * 7 / 16;
                curr_row[x + 1].1 += err_g * 7 / 16;
                curr_row[x + 1].2 += err_b * 7 / 16;
            }

            if y + 1 < height_usize {
                // Bottom-left: 3/16
                if x > 0 {
                    next_row[x - 1].0 += err_r * 3 / 16;
                    next_row[x - 1].1 += err_g * 3 / 16;
                    next_row[x - 1].2 += err_b * 3 / 16;
                }

                // Bottom: 5/16
                next_row[x].0 += err_r * 5 / 16;
                next_row[x].1 += err_g * 5 / 16;
                next_row[x].2 += err_b * 5 / 16;

                // Bottom-right: 1/16
                if x + 1 < width_usize {
                    next_row[x + 1].0 += err_r / 16;
                    next_row[x + 1].1 += err_g / 16;
                    next_row[x + 1].2 += err_b / 16;
                }
            }

            pixels.push(color);
        }

        std::mem::swap(&mut curr_row, &mut next_row);
        next_row.iter_mut().for_each(|p| *p = (0, 0, 0));
    }

    TriColorImage {
        width,
        height,
        pixels,
    }
}
