//! Bayer color-filter-array demosaicing.
//!
//! Bilinear interpolation only: each missing channel is the average of the
//! available neighbors in a 3×3 window. Good enough for PSF and measurement
//! conditioning, where the result is downsampled and renormalized anyway.

use ndarray::{Array3, ArrayView2};

/// Color channel at a CFA position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Red   = 0,
    Green = 1,
    Blue  = 2,
}

/// 2×2 Bayer pattern descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CfaPattern {
    pattern: [Channel; 4], // row-major 2×2
}

use Channel::*;

impl CfaPattern {
    pub fn rggb() -> Self { Self { pattern: [Red,   Green, Green, Blue ] } }
    pub fn bggr() -> Self { Self { pattern: [Blue,  Green, Green, Red  ] } }
    pub fn grbg() -> Self { Self { pattern: [Green, Red,   Blue,  Green] } }
    pub fn gbrg() -> Self { Self { pattern: [Green, Blue,  Red,   Green] } }

    /// Channel sensed by the pixel at (row, col).
    pub fn color_at(&self, row: usize, col: usize) -> Channel {
        self.pattern[(row % 2) * 2 + col % 2]
    }
}

/// Interpolate a single-channel mosaic into an (h, w, 3) image by averaging,
/// per channel, the contributing pixels of each 3×3 neighborhood.
pub fn bilinear(input: ArrayView2<f32>, cfa: &CfaPattern) -> Array3<f32> {
    let (height, width) = input.dim();
    let mut output = Array3::zeros((height, width, 3));

    for y in 0..height {
        for x in 0..width {
            let mut rgb   = [0.0_f32; 3];
            let mut count = [0_u32; 3];

            let y_lo = y.saturating_sub(1);
            let y_hi = (y + 1).min(height - 1);
            let x_lo = x.saturating_sub(1);
            let x_hi = (x + 1).min(width - 1);

            for ny in y_lo..=y_hi {
                for nx in x_lo..=x_hi {
                    let ch = cfa.color_at(ny, nx) as usize;
                    rgb[ch] += input[[ny, nx]];
                    count[ch] += 1;
                }
            }

            for c in 0..3 {
                if count[c] > 0 {
                    output[[y, x, c]] = rgb[c] / count[c] as f32;
                }
            }
        }
    }
    output
}

/// Apply a 3×3 color-correction matrix in place: out_c = Σ_k ccm[c][k] · in_k.
pub fn apply_ccm(image: &mut Array3<f32>, ccm: &[[f32; 3]; 3]) {
    for mut pixel in image.rows_mut() {
        let rgb = [pixel[0], pixel[1], pixel[2]];
        for c in 0..3 {
            pixel[c] = ccm[c][0] * rgb[0] + ccm[c][1] * rgb[1] + ccm[c][2] * rgb[2];
        }
    }
}
