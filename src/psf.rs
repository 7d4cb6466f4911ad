//! PSF artifacts and their conditioning into deconvolution-ready kernels.
//!
//! A [`RawPsf`] is whatever came off the simulation or the sensor, cast into
//! the canonical [depth, height, width, channel] layout. A [`Psf`] has been
//! through [`condition`]: background-subtracted, resized, energy-normalized,
//! and carrying the background level it was measured against.

use std::path::Path;

use ndarray::{s, Array2, Array3, Array4, ArrayD, Axis};

use crate::error::Error;
use crate::measurement::{self, LoadOptions};
use crate::resample;
use crate::Shape2;

/// Unconditioned intensity PSF, canonical [depth, height, width, channel]
/// layout (depth = 1 for the ordinary 2-D case).
#[derive(Clone, Debug)]
pub struct RawPsf {
    data: Array4<f32>,
}

impl RawPsf {

    pub fn new(data: Array4<f32>) -> Self { Self { data } }

    pub fn data(&self) -> &Array4<f32> { &self.data }

    /// A 2-D grayscale image as a single-depth, single-channel volume.
    pub fn from_gray(image: &Array2<f32>) -> Self {
        let (h, w) = image.dim();
        Self::new(Array4::from_shape_fn((1, h, w, 1), |(_, y, x, _)| image[[y, x]]))
    }

    /// An (h, w, c) image as a single-depth volume.
    pub fn from_image(image: &Array3<f32>) -> Self {
        let (h, w, c) = image.dim();
        Self::new(Array4::from_shape_fn((1, h, w, c), |(_, y, x, ch)| image[[y, x, ch]]))
    }

    /// A channel-major (c, h, w) stack, as produced by the propagation
    /// engine, as a single-depth volume.
    pub fn from_channel_major(stack: &Array3<f32>) -> Self {
        let (c, h, w) = stack.dim();
        Self::new(Array4::from_shape_fn((1, h, w, c), |(_, y, x, ch)| stack[[ch, y, x]]))
    }

    /// Stack (h, w, c) depth slices into a volume. All slices must share one
    /// shape.
    pub fn from_depth_slices(slices: &[Array3<f32>]) -> Result<Self, Error> {
        let first = slices.first()
            .ok_or_else(|| Error::config("cannot build a PSF from zero depth slices"))?;
        let (h, w, c) = first.dim();
        for slice in slices {
            if slice.dim() != first.dim() {
                return Err(Error::ShapeMismatch {
                    first: first.shape().to_vec(),
                    other: slice.shape().to_vec(),
                });
            }
        }
        let mut data = Array4::zeros((slices.len(), h, w, c));
        for (d, slice) in slices.iter().enumerate() {
            data.index_axis_mut(Axis(0), d).assign(slice);
        }
        Ok(Self::new(data))
    }

    pub fn spatial_shape(&self) -> Shape2 {
        let (_, h, w, _) = self.data.dim();
        [h, w]
    }

    pub fn channels(&self) -> usize { self.data.dim().3 }
}

/// Load a raw PSF from disk.
///
/// `.npy` files hold serialized volumes: 2-D (h, w), 3-D grayscale depth
/// stacks (d, h, w), or full 4-D (d, h, w, c). Anything else goes through
/// the measurement loader (raster or mosaiced captures, honoring
/// `options`).
pub fn load_raw(path: &Path, options: &LoadOptions) -> Result<RawPsf, Error> {
    if path.extension().map(|e| e == "npy").unwrap_or(false) {
        let array: ArrayD<f32> = crate::io::npy::read_f32_dyn(path)?;
        let shape = array.shape().to_vec();
        let mut data = match shape.as_slice() {
            [h, w] =>
                Array4::from_shape_fn((1, *h, *w, 1), |(_, y, x, _)| array[[y, x]]),
            [d, h, w] =>
                Array4::from_shape_fn((*d, *h, *w, 1), |(z, y, x, _)| array[[z, y, x]]),
            [d, h, w, c] =>
                Array4::from_shape_fn((*d, *h, *w, *c), |(z, y, x, ch)| array[[z, y, x, ch]]),
            other => return Err(Error::format(format!(
                "cannot interpret a rank-{} array as a PSF volume", other.len()))),
        };
        if options.flip {
            data.invert_axis(Axis(1));
            data.invert_axis(Axis(2));
        }
        Ok(RawPsf::new(data))
    } else {
        let image = measurement::load_image(path, options)?;
        Ok(RawPsf::from_image(&image))
    }
}

/// Square corner region `start..end` (both rows and columns, from the top
/// left) over which the background level is estimated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CornerRegion {
    pub start: usize,
    pub end: usize,
}

/// Spatial resize applied during conditioning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResizeTarget {
    /// Keep the native shape.
    Native,
    /// Shrink both axes by this factor (≥ 1).
    Downsample(f32),
    /// Resize to an explicit (rows, cols).
    Shape(Shape2),
}

/// Conditioning settings: one fully specified value per invocation.
#[derive(Clone, Debug)]
pub struct ConditionConfig {
    /// Corner region for background estimation; `None` skips subtraction
    /// and reports a zero background.
    pub background_region: Option<CornerRegion>,
    pub resize: ResizeTarget,
    /// Flip vertically and horizontally (mounting compensation).
    pub flip: bool,
    /// Collapse channels by summation, replicating the sum across all
    /// channels (for when per-channel cross-talk calibration is missing).
    pub single_channel: bool,
}

impl Default for ConditionConfig {
    fn default() -> Self {
        Self {
            background_region: None,
            resize: ResizeTarget::Native,
            flip: false,
            single_channel: false,
        }
    }
}

/// A conditioned PSF: non-negative, unit Euclidean norm over the flattened
/// volume, carrying the per-channel background it was measured against.
/// This is the only PSF type the reconstruction seam accepts.
#[derive(Clone, Debug)]
pub struct Psf {
    data: Array4<f32>,
    background: Vec<f32>,
}

impl Psf {
    pub fn data(&self) -> &Array4<f32> { &self.data }

    /// Per-channel background level subtracted during conditioning.
    pub fn background(&self) -> &[f32] { &self.background }

    pub fn spatial_shape(&self) -> Shape2 {
        let (_, h, w, _) = self.data.dim();
        [h, w]
    }

    pub fn channels(&self) -> usize { self.data.dim().3 }

    /// Load and condition in one step — the entry point shared with the
    /// external metrics collaborator, so that predictions and ground truth
    /// are rescaled under one normalization.
    pub fn load(path: &Path, options: &LoadOptions, config: &ConditionConfig) -> Result<Self, Error> {
        condition(&load_raw(path, options)?, config)
    }
}

/// Condition a raw PSF. Atomic: returns a fully valid [`Psf`] or an error,
/// never a partial artifact.
pub fn condition(raw: &RawPsf, config: &ConditionConfig) -> Result<Psf, Error> {
    let mut psf = raw.data.clone();
    let (depth, h, w, channels) = psf.dim();

    if config.flip {
        psf.invert_axis(Axis(1));
        psf.invert_axis(Axis(2));
    }

    // per-channel background from the corner region, then clip: PSFs are
    // non-negative by invariant
    let mut background = vec![0.0_f32; channels];
    if let Some(region) = config.background_region {
        if region.start >= region.end || region.end > h || region.end > w {
            return Err(Error::config(format!(
                "background region {}..{} does not fit a {h}×{w} PSF",
                region.start, region.end)));
        }
        for c in 0..channels {
            let corner = psf.slice(s![.., region.start..region.end, region.start..region.end, c]);
            let bg = corner.mean().unwrap_or(0.0);
            background[c] = bg;
            psf.slice_mut(s![.., .., .., c]).mapv_inplace(|v| v - bg);
        }
        psf.mapv_inplace(|v| v.max(0.0));
    }

    // area-preserving resize
    let target = match config.resize {
        ResizeTarget::Native => [h, w],
        ResizeTarget::Shape(shape) => shape,
        ResizeTarget::Downsample(factor) => {
            if !(factor >= 1.0) {
                return Err(Error::config(format!(
                    "downsample factor must be >= 1, got {factor}")));
            }
            [((h as f32 / factor).round() as usize).max(1),
             ((w as f32 / factor).round() as usize).max(1)]
        }
    };
    if target[0] == 0 || target[1] == 0 {
        return Err(Error::config("resize target must be non-empty"));
    }
    let mut psf = if target == [h, w] { psf } else {
        let mut resized = Array4::zeros((depth, target[0], target[1], channels));
        for d in 0..depth {
            for c in 0..channels {
                let plane = resample::resize_area(psf.slice(s![d, .., .., c]), target);
                resized.slice_mut(s![d, .., .., c]).assign(&plane);
            }
        }
        resized
    };

    if config.single_channel {
        if channels == 1 {
            log::warn!("single-channel collapse requested for a grayscale PSF; no effect");
        } else {
            let summed = psf.sum_axis(Axis(3));
            for c in 0..channels {
                psf.slice_mut(s![.., .., .., c]).assign(&summed);
            }
        }
    }

    // energy convention: unit Euclidean norm over the flattened volume (not
    // the max-normalization used for display)
    let norm = flat_norm(&psf);
    if !(norm > 0.0) {
        return Err(Error::config("PSF has no energy left after conditioning"));
    }
    psf.mapv_inplace(|v| v / norm);

    Ok(Psf { data: psf, background })
}

pub(crate) fn flat_norm(data: &Array4<f32>) -> f32 {
    data.iter().map(|v| *v as f64 * *v as f64).sum::<f64>().sqrt() as f32
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::Array3;
    use proptest::prelude::*;

    /// (1, 100, 100, 3) volume: zero in the 16×16 corner, a blob elsewhere,
    /// plus a flat per-channel background.
    fn blob_with_background(bg: [f32; 3]) -> RawPsf {
        let data = Array4::from_shape_fn((1, 100, 100, 3), |(_, y, x, c)| {
            let blob = if (50..60).contains(&y) && (50..60).contains(&x) { 100.0 } else { 0.0 };
            blob + bg[c]
        });
        RawPsf::new(data)
    }

    #[test]
    fn background_is_estimated_per_channel_and_subtracted() {
        let raw = blob_with_background([10.0, 20.0, 30.0]);
        let config = ConditionConfig {
            background_region: Some(CornerRegion { start: 0, end: 16 }),
            ..Default::default()
        };
        let psf = condition(&raw, &config).unwrap();

        assert_float_eq!(psf.background()[0], 10.0, abs <= 1e-3);
        assert_float_eq!(psf.background()[1], 20.0, abs <= 1e-3);
        assert_float_eq!(psf.background()[2], 30.0, abs <= 1e-3);

        // corner is clean after subtraction, nothing went negative
        assert!(psf.data().iter().all(|v| *v >= 0.0));
        for c in 0..3 {
            for y in 0..16 {
                for x in 0..16 {
                    assert_float_eq!(psf.data()[[0, y, x, c]], 0.0, abs <= 1e-6);
                }
            }
        }
        assert_float_eq!(flat_norm(psf.data()), 1.0, abs <= 1e-5);
    }

    #[test]
    fn conditioning_an_already_conditioned_psf_is_a_no_op() {
        let raw = blob_with_background([10.0, 10.0, 10.0]);
        let config = ConditionConfig {
            background_region: Some(CornerRegion { start: 0, end: 16 }),
            resize: ResizeTarget::Downsample(4.0),
            ..Default::default()
        };
        let once = condition(&raw, &config).unwrap();

        let again = condition(
            &RawPsf::new(once.data().clone()),
            &ConditionConfig {
                background_region: Some(CornerRegion { start: 0, end: 4 }),
                ..Default::default()
            },
        ).unwrap();

        assert_eq!(again.background(), &[0.0, 0.0, 0.0]);
        for (a, b) in once.data().iter().zip(again.data().iter()) {
            assert_float_eq!(*a, *b, abs <= 1e-6);
        }
    }

    proptest! {
        #[test]
        fn conditioned_psfs_have_unit_norm(seed in 0..500_u32, h in 4..40_usize, w in 4..40_usize) {
            let data = Array4::from_shape_fn((1, h, w, 3), |(_, y, x, c)| {
                ((y * 31 + x * 17 + c * 7 + seed as usize) % 251) as f32 + 1.0
            });
            let psf = condition(&RawPsf::new(data), &ConditionConfig::default()).unwrap();
            prop_assert!((flat_norm(psf.data()) - 1.0).abs() <= 1e-5);
            prop_assert!(psf.data().iter().all(|v| *v >= 0.0));
        }
    }

    #[test]
    fn depth_slices_must_agree_in_shape() {
        let a = Array3::zeros((10, 10, 3));
        let b = Array3::zeros((10, 12, 3));
        let err = RawPsf::from_depth_slices(&[a, b]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn channel_collapse_replicates_the_sum() {
        let raw = blob_with_background([0.0; 3]);
        let config = ConditionConfig { single_channel: true, ..Default::default() };
        let psf = condition(&raw, &config).unwrap();
        for ((_, y, x, _), &v) in psf.data().indexed_iter() {
            assert_float_eq!(v, psf.data()[[0, y, x, 0]], abs <= 1e-7);
        }
    }

    #[test]
    fn grayscale_collapse_is_a_warned_no_op() {
        let data = Array4::from_shape_fn((1, 8, 8, 1), |(_, y, x, _)| (y + x) as f32 + 1.0);
        let with    = condition(&RawPsf::new(data.clone()),
                                &ConditionConfig { single_channel: true,  ..Default::default() }).unwrap();
        let without = condition(&RawPsf::new(data),
                                &ConditionConfig { single_channel: false, ..Default::default() }).unwrap();
        assert_eq!(with.data(), without.data());
    }

    #[test]
    fn zero_energy_psf_is_rejected() {
        let raw = RawPsf::new(Array4::zeros((1, 8, 8, 1)));
        assert!(matches!(condition(&raw, &ConditionConfig::default()),
                         Err(Error::Configuration(_))));
    }

    #[test]
    fn oversized_background_region_is_rejected() {
        let raw = blob_with_background([0.0; 3]);
        let config = ConditionConfig {
            background_region: Some(CornerRegion { start: 0, end: 101 }),
            ..Default::default()
        };
        assert!(matches!(condition(&raw, &config), Err(Error::Configuration(_))));
    }

    #[test]
    fn flip_reverses_both_spatial_axes() {
        let data = Array4::from_shape_fn((1, 2, 3, 1), |(_, y, x, _)| (y * 3 + x) as f32 + 1.0);
        let flipped = condition(&RawPsf::new(data.clone()),
                                &ConditionConfig { flip: true, ..Default::default() }).unwrap();
        let plain   = condition(&RawPsf::new(data),
                                &ConditionConfig::default()).unwrap();
        assert_float_eq!(flipped.data()[[0, 0, 0, 0]], plain.data()[[0, 1, 2, 0]], abs <= 1e-7);
    }
}
