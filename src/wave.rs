//! Coherent free-space propagation between the mask and sensor planes.
//!
//! Each wavelength channel is propagated independently with a band-limited
//! angular-spectrum transfer function; intensity is |u|² per channel. A
//! bypass mode treats the mask image itself as the field (thin-mask,
//! far-field approximation).

use ndarray::{Array2, Array3, ArrayView2};
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use units::{mm_, Length};

use crate::error::Error;
use crate::mask::MaskImage;
use crate::psf::RawPsf;
use crate::sensor::Sensor;
use crate::Complexf32;

const TAU: f32 = std::f32::consts::TAU;

/// Complex field per wavelength channel on the sensor pixel grid.
/// Ephemeral: recomputed whenever the pattern or a distance changes.
#[derive(Clone, Debug)]
pub struct Wavefront {
    data: Array3<Complexf32>, // (channel, rows, cols)
}

impl Wavefront {
    pub fn data(&self) -> &Array3<Complexf32> { &self.data }

    pub fn channels(&self) -> usize { self.data.dim().0 }

    /// |u|² per channel. Non-negative by construction.
    pub fn intensity(&self) -> Array3<f32> {
        self.data.mapv(|u| u.norm_sqr())
    }
}

/// Propagation settings: one fully specified value per simulation.
#[derive(Clone, Debug)]
pub struct Propagation {
    /// Distance from the point source to the mask plane.
    pub scene_to_mask: Length,
    /// Distance from the mask plane to the sensor plane.
    pub mask_to_sensor: Length,
    /// One wavelength per mask channel.
    pub wavelengths: Vec<Length>,
    /// With `enabled = false` the mask is taken as the field directly.
    pub enabled: bool,
}

/// Field of a point source at `source_distance` illuminating the sensor-size
/// grid: u(x, y) = exp(i·2π·r/λ)/r with r the distance from the source to
/// the grid point, one channel per wavelength.
pub fn spherical_wavefront(
    sensor: &Sensor,
    wavelengths: &[Length],
    source_distance: Length,
) -> Wavefront {
    let [h, w] = sensor.resolution();
    let d = mm_(sensor.pitch());
    let dz = mm_(source_distance);
    let data = Array3::from_shape_fn((wavelengths.len(), h, w), |(c, y, x)| {
        let yy = (y as f32 - (h as f32 - 1.0) / 2.0) * d;
        let xx = (x as f32 - (w as f32 - 1.0) / 2.0) * d;
        let r = (xx * xx + yy * yy + dz * dz).sqrt();
        Complex::from_polar(1.0 / r, TAU * r / mm_(wavelengths[c]))
    });
    Wavefront { data }
}

/// Band-limited angular-spectrum propagation over `distance`.
///
/// The field's spatial-frequency representation is multiplied by
/// H(fx, fy) = exp(i·2π·d·√(1/λ² − fx² − fy²)) where the wave propagates,
/// zero where it is evanescent or beyond the sampling band limit
/// (Matsushima & Shimobaba).
///
/// Validity of the sampling (pitch vs wavelength vs distance) is the
/// caller's responsibility; an incompatible distance aliases silently.
pub fn propagate(
    field: ArrayView2<Complexf32>,
    wavelength: Length,
    pixel_pitch: Length,
    distance: Length,
) -> Array2<Complexf32> {
    let (h, w) = field.dim();
    let mut spectrum = field.to_owned();
    let mut planner = FftPlanner::new();
    fft2(&mut spectrum, &mut planner, false);

    let lambda = mm_(wavelength);
    let d = mm_(pixel_pitch);
    let dz = mm_(distance);
    let dfy = 1.0 / (h as f32 * d);
    let dfx = 1.0 / (w as f32 * d);
    let inv_l2 = 1.0 / (lambda * lambda);
    let fy_limit = 1.0 / (lambda * ((2.0 * dz * dfy).powi(2) + 1.0).sqrt());
    let fx_limit = 1.0 / (lambda * ((2.0 * dz * dfx).powi(2) + 1.0).sqrt());

    for ((ky, kx), s) in spectrum.indexed_iter_mut() {
        let fy = fft_freq(ky, h) * dfy;
        let fx = fft_freq(kx, w) * dfx;
        let f2 = fy * fy + fx * fx;
        *s = if f2 <= inv_l2 && fy.abs() <= fy_limit && fx.abs() <= fx_limit {
            *s * Complex::from_polar(1.0, TAU * dz * (inv_l2 - f2).sqrt())
        } else {
            Complex::default()
        };
    }

    fft2(&mut spectrum, &mut planner, true);
    let scale = 1.0 / (h * w) as f32;
    spectrum.mapv_inplace(|u| u * scale);
    spectrum
}

/// Simulate the intensity PSF of a mask: spherical illumination × mask,
/// propagated to the sensor per channel, then |u|². With propagation
/// disabled this degenerates to the squared mask.
pub fn intensity_psf(
    mask: &MaskImage,
    sensor: &Sensor,
    propagation: &Propagation,
) -> Result<RawPsf, Error> {
    if !propagation.enabled {
        return Ok(RawPsf::from_channel_major(&mask.data().mapv(|v| v * v)));
    }

    let channels = mask.channels();
    if propagation.wavelengths.len() != channels {
        return Err(Error::DimensionMismatch {
            expected: channels,
            found: propagation.wavelengths.len(),
        });
    }

    let illumination =
        spherical_wavefront(sensor, &propagation.wavelengths, propagation.scene_to_mask);
    let [h, w] = mask.spatial_shape();

    // channels own disjoint outputs: embarrassingly parallel
    let per_channel: Vec<Array2<f32>> = (0..channels)
        .into_par_iter()
        .map(|c| {
            let u_in = Array2::from_shape_fn((h, w), |(y, x)| {
                illumination.data[[c, y, x]] * mask.data()[[c, y, x]]
            });
            let u_out = propagate(
                u_in.view(),
                propagation.wavelengths[c],
                sensor.pitch(),
                propagation.mask_to_sensor,
            );
            u_out.mapv(|u| u.norm_sqr())
        })
        .collect();

    let mut stacked = Array3::zeros((channels, h, w));
    for (c, channel) in per_channel.into_iter().enumerate() {
        stacked.index_axis_mut(ndarray::Axis(0), c).assign(&channel);
    }
    Ok(RawPsf::from_channel_major(&stacked))
}

/// DFT sample frequency (in cycles per sample count) for bin `k` of `n`,
/// in FFT output order.
fn fft_freq(k: usize, n: usize) -> f32 {
    if k < (n + 1) / 2 { k as f32 } else { k as f32 - n as f32 }
}

/// In-place 2-D FFT: rows then columns, through a scratch buffer so the
/// column passes see contiguous data.
fn fft2(buf: &mut Array2<Complexf32>, planner: &mut FftPlanner<f32>, inverse: bool) {
    let (h, w) = buf.dim();
    let row_fft = if inverse { planner.plan_fft_inverse(w) } else { planner.plan_fft_forward(w) };
    let col_fft = if inverse { planner.plan_fft_inverse(h) } else { planner.plan_fft_forward(h) };

    let mut scratch = vec![Complexf32::default(); w.max(h)];

    for mut row in buf.rows_mut() {
        for (s, v) in scratch.iter_mut().zip(row.iter()) { *s = *v; }
        row_fft.process(&mut scratch[..w]);
        for (v, s) in row.iter_mut().zip(scratch.iter()) { *v = *s; }
    }
    for mut col in buf.columns_mut() {
        for (s, v) in scratch.iter_mut().zip(col.iter()) { *s = *v; }
        col_fft.process(&mut scratch[..h]);
        for (v, s) in col.iter_mut().zip(scratch.iter()) { *v = *s; }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::ArrayD;
    use units::{mm, nm, um, cm};

    use crate::mask::{render, RenderOptions};
    use crate::slm::SlmGeometry;

    fn test_mask_and_sensor() -> (MaskImage, Sensor) {
        let slm = SlmGeometry::new([mm(0.8), mm(0.8)], [mm(0.8), mm(0.8)], [8, 8], None).unwrap();
        let sensor = Sensor::new([64, 64], mm(0.1), 8, None, None, None).unwrap();
        let pattern = ArrayD::from_shape_fn(vec![8, 8], |ix| {
            ((ix[0] * 8 + ix[1]) % 5) as f32 / 4.0
        });
        let mask = render(&pattern, &slm, &sensor, &RenderOptions::default()).unwrap();
        (mask, sensor)
    }

    #[test]
    fn bypass_equals_mask_intensity() {
        let (mask, sensor) = test_mask_and_sensor();
        let propagation = Propagation {
            scene_to_mask: cm(30.0),
            mask_to_sensor: mm(2.0),
            wavelengths: vec![nm(550.0)],
            enabled: false,
        };
        let psf = intensity_psf(&mask, &sensor, &propagation).unwrap();
        for ((_, y, x, c), &v) in psf.data().indexed_iter() {
            let m = mask.data()[[c, y, x]];
            assert_float_eq!(v, m * m, abs <= 1e-7);
        }
    }

    #[test]
    fn propagated_psf_is_non_negative_and_finite() {
        let (mask, sensor) = test_mask_and_sensor();
        let propagation = Propagation {
            scene_to_mask: cm(30.0),
            mask_to_sensor: mm(2.0),
            wavelengths: vec![nm(550.0)],
            enabled: true,
        };
        let psf = intensity_psf(&mask, &sensor, &propagation).unwrap();
        assert!(psf.data().iter().all(|v| *v >= 0.0 && v.is_finite()));
        assert!(psf.data().sum() > 0.0);
    }

    #[test]
    fn wavelength_count_must_match_channels() {
        let (mask, sensor) = test_mask_and_sensor();
        let propagation = Propagation {
            scene_to_mask: cm(30.0),
            mask_to_sensor: mm(2.0),
            wavelengths: vec![nm(460.0), nm(550.0), nm(640.0)],
            enabled: true,
        };
        let err = intensity_psf(&mask, &sensor, &propagation).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { expected: 1, found: 3 }));
    }

    #[test]
    fn zero_distance_propagation_is_identity() {
        // λ well below the Nyquist frequency of the grid, so the band limit
        // does not clip: propagating by zero is an FFT round-trip.
        let field = Array2::from_shape_fn((32, 32), |(y, x)| {
            let dy = y as f32 - 15.5;
            let dx = x as f32 - 15.5;
            Complex::from_polar((-(dy * dy + dx * dx) / 50.0).exp(), 0.0)
        });
        let out = propagate(field.view(), nm(500.0), um(1.0), mm(0.0));
        for (a, b) in field.iter().zip(out.iter()) {
            assert_float_eq!(a.re, b.re, abs <= 1e-4);
            assert_float_eq!(a.im, b.im, abs <= 1e-4);
        }
    }

    #[test]
    fn spherical_wavefront_amplitude_falls_off_as_one_over_r() {
        let sensor = Sensor::new([33, 33], mm(0.1), 8, None, None, None).unwrap();
        let wavefront = spherical_wavefront(&sensor, &[nm(550.0)], mm(10.0));
        let centre = wavefront.data()[[0, 16, 16]];
        assert_float_eq!(centre.norm(), 1.0 / 10.0, rmax <= 1e-4);
        // off-axis samples are further from the source, hence dimmer
        let corner = wavefront.data()[[0, 0, 0]];
        assert!(corner.norm() < centre.norm());
    }
}
