//! Mask rendering: control pattern + device geometry → per-channel mask
//! image at sensor resolution.

use itertools::iproduct;
use ndarray::{Array2, Array3, ArrayD, Axis};
use units::{ratio_, Angle};

use crate::error::Error;
use crate::resample;
use crate::sensor::Sensor;
use crate::slm::SlmGeometry;
use crate::Shape2;

/// A rendered mask: per-channel, sensor resolution, non-negative, quantized
/// to 256 levels and normalized to [0, 1] by its own maximum.
///
/// Deliberately a distinct type from [`crate::psf::Psf`]: a mask carries the
/// display/quantization convention (divide by max), a conditioned PSF the
/// energy convention (unit Euclidean norm). Neither converts silently into
/// the other.
#[derive(Clone, Debug)]
pub struct MaskImage {
    data: Array3<f32>, // (channel, rows, cols)
}

impl MaskImage {
    pub fn data(&self) -> &Array3<f32> { &self.data }

    pub fn channels(&self) -> usize { self.data.dim().0 }

    pub fn spatial_shape(&self) -> Shape2 {
        let (_, h, w) = self.data.dim();
        [h, w]
    }
}

/// Rendering options: one fully specified value per invocation.
#[derive(Clone, Debug, Default)]
pub struct RenderOptions {
    /// Rigid rotation about the image centre, applied after placement.
    pub rotation: Option<Angle>,
    /// Flip the color-filter layout vertically before rendering.
    pub flip_filter_vertical: bool,
    /// Circular shift (rows, cols) of the rendered mask, for registering a
    /// simulated mask against a measured PSF.
    pub shift: [isize; 2],
}

/// Render a control pattern to a mask image.
///
/// Each cell's physical centre maps to a pixel coordinate (grid centred on
/// the optical axis); its footprint is the cell size in sensor pixels,
/// rounded to an integer box. Footprints extending past the border are
/// clipped; overlapping footprints overwrite (geometry misconfiguration is
/// the caller's problem, not detected here).
pub fn render(
    pattern: &ArrayD<f32>,
    slm: &SlmGeometry,
    sensor: &Sensor,
    options: &RenderOptions,
) -> Result<MaskImage, Error> {
    slm.validate_pattern(pattern)?;
    let cells = interleave(pattern, slm);

    let filter = slm.color_filter().map(|cf| {
        if options.flip_filter_vertical { cf.flipped_vertical() } else { cf.clone() }
    });

    let d = sensor.pitch();
    let [cell_h, cell_w] = slm.cell_size();
    let fh = ratio_(cell_h / d).round() as usize;
    let fw = ratio_(cell_w / d).round() as usize;
    if fh == 0 || fw == 0 {
        return Err(Error::Geometry(format!(
            "cell footprint collapses to {fh}×{fw} pixels at this sensor pitch")));
    }

    let channels = slm.channels();
    let [n_rows, n_cols] = slm.grid_shape();
    let [pitch_y, pitch_x] = slm.pitch();
    let [res_r, res_c] = sensor.resolution();
    let mut mask = Array3::zeros((channels, res_r, res_c));

    for (i, j) in iproduct!(0..n_rows, 0..n_cols) {
        let value = cells[[i, j]];
        let weight = match &filter {
            Some(cf) => cf.weight(i, j),
            None     => [1.0; 3],
        };

        // physical centre of the cell, y increasing with row index
        let cy = pitch_y * (i as f32 - (n_rows as f32 - 1.0) / 2.0);
        let cx = pitch_x * (j as f32 - (n_cols as f32 - 1.0) / 2.0);
        let py = (ratio_(cy / d) + res_r as f32 / 2.0).floor() as isize;
        let px = (ratio_(cx / d) + res_c as f32 / 2.0).floor() as isize;
        let top  = py - (fh / 2) as isize;
        let left = px - (fw / 2) as isize;

        for c in 0..channels {
            let v = value * weight[c];
            for (y, x) in iproduct!(top..top + fh as isize, left..left + fw as isize) {
                if y >= 0 && x >= 0 && (y as usize) < res_r && (x as usize) < res_c {
                    mask[[c, y as usize, x as usize]] = v;
                }
            }
        }
    }

    quantize(&mut mask);

    if let Some(angle) = options.rotation {
        for mut channel in mask.axis_iter_mut(Axis(0)) {
            let rotated = resample::rotate_about_center(channel.view(), angle);
            channel.assign(&rotated);
        }
        // interpolation leaves the 256-level grid; snap back
        quantize(&mut mask);
    }

    if options.shift != [0, 0] {
        for mut channel in mask.axis_iter_mut(Axis(0)) {
            let rolled = resample::roll(channel.view(), options.shift);
            channel.assign(&rolled);
        }
    }

    Ok(MaskImage { data: mask })
}

/// Flatten a color pattern (3, rows, cols) onto the rendered cell grid
/// (3·rows, cols): channel c of cell row r lands on grid row 3r + c.
/// Monochrome patterns pass through.
fn interleave(pattern: &ArrayD<f32>, slm: &SlmGeometry) -> Array2<f32> {
    let [rows, cols] = slm.shape();
    if slm.is_monochrome() {
        Array2::from_shape_fn((rows, cols), |(i, j)| pattern[[i, j]])
    } else {
        Array2::from_shape_fn((3 * rows, cols), |(g, j)| pattern[[g % 3, g / 3, j]])
    }
}

/// Normalize by the image's own maximum and quantize to 256 levels. An
/// all-zero image stays zero.
fn quantize(mask: &mut Array3<f32>) {
    let max = mask.fold(0.0_f32, |m, v| m.max(*v));
    if max > 0.0 {
        mask.mapv_inplace(|v| (v / max * 255.0).round() / 255.0);
    }
}
