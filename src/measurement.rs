//! Loading raw sensor captures and conditioning them against a PSF.
//!
//! A conditioned [`Measurement`] shares the PSF's spatial shape and its
//! unit-norm convention, so that measurement ≈ convolution(scene, PSF) holds
//! in one consistent unit system.

use std::path::Path;

use ndarray::{s, Array2, Array3, Array4, Axis};

use crate::demosaic::{self, CfaPattern, Channel};
use crate::error::Error;
use crate::io::raster::{self, Raster};
use crate::psf::{self, ConditionConfig, Psf};
use crate::resample;
use crate::sensor::Sensor;
use crate::Shape2;

/// Everything needed to develop a single-channel mosaic into RGB.
#[derive(Clone, Debug)]
pub struct MosaicDecode {
    pub cfa: CfaPattern,
    /// Per-channel black level, in input-bit-depth counts.
    pub black_level: [f32; 3],
    /// 3×3 color-correction matrix applied after interpolation.
    pub ccm: [[f32; 3]; 3],
    pub red_gain: f32,
    pub blue_gain: f32,
    pub nbits_in: u8,
    pub nbits_out: u8,
}

impl MosaicDecode {

    /// Build decode parameters from a sensor descriptor's embedded metadata.
    /// A sensor without mosaic metadata cannot satisfy a mosaiced decode
    /// request: that is a format error, not a fallback.
    pub fn from_sensor(sensor: &Sensor, nbits_out: Option<u8>) -> Result<Self, Error> {
        let cfa = sensor.cfa().cloned()
            .ok_or_else(|| Error::format("mosaiced decode requested but the sensor has no CFA pattern"))?;
        let black_level = sensor.black_level()
            .ok_or_else(|| Error::format("mosaiced decode requested but the sensor has no black level"))?;
        let ccm = sensor.ccm()
            .ok_or_else(|| Error::format("mosaiced decode requested but the sensor has no color matrix"))?;
        Ok(Self {
            cfa,
            black_level,
            ccm,
            red_gain: 1.0,
            blue_gain: 1.0,
            nbits_in: sensor.bit_depth(),
            nbits_out: nbits_out.unwrap_or(sensor.bit_depth()),
        })
    }
}

/// Loading options: one fully specified value per invocation.
#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    /// `Some` decodes the input as a single-channel mosaic; `None` expects a
    /// developed raster.
    pub mosaic: Option<MosaicDecode>,
    /// Flip vertically and horizontally (mounting compensation).
    pub flip: bool,
}

/// Load a capture as an (h, w, c) image.
///
/// Mosaiced input (single-channel `.npy` dump or grayscale raster) is
/// demosaiced and scaled to the requested output bit depth; developed raster
/// input passes through in RGB channel order at its native scale.
pub fn load_image(path: &Path, options: &LoadOptions) -> Result<Array3<f32>, Error> {
    let mut image = match &options.mosaic {
        Some(decode) => {
            let mosaic = load_gray(path)?;
            develop(&mosaic, decode)
        }
        None => load_developed(path)?,
    };
    if options.flip {
        image.invert_axis(Axis(0));
        image.invert_axis(Axis(1));
    }
    Ok(image)
}

fn load_gray(path: &Path) -> Result<Array2<f32>, Error> {
    if path.extension().map(|e| e == "npy").unwrap_or(false) {
        let array = crate::io::npy::read_f32_dyn(path)?;
        let shape = array.shape().to_vec();
        match shape.as_slice() {
            [h, w] => Ok(Array2::from_shape_fn((*h, *w), |(y, x)| array[[y, x]])),
            other => Err(Error::format(format!(
                "expected a single-channel mosaic, got array shape {other:?}"))),
        }
    } else {
        match raster::load(path)? {
            Raster::Gray(img) => Ok(img),
            Raster::Rgb(_) => Err(Error::format(
                "expected a single-channel mosaic, got a color raster".to_string())),
        }
    }
}

fn load_developed(path: &Path) -> Result<Array3<f32>, Error> {
    Ok(match raster::load(path)? {
        Raster::Rgb(img) => img,
        Raster::Gray(img) => {
            let (h, w) = img.dim();
            Array3::from_shape_fn((h, w, 1), |(y, x, _)| img[[y, x]])
        }
    })
}

/// Demosaic: black-level subtraction and normalization per CFA site,
/// white-balance gains, bilinear interpolation, color correction, rescale to
/// the output bit depth.
fn develop(mosaic: &Array2<f32>, p: &MosaicDecode) -> Array3<f32> {
    let max_in  = ((1_u32 << p.nbits_in)  - 1) as f32;
    let max_out = ((1_u32 << p.nbits_out) - 1) as f32;

    let normalized = Array2::from_shape_fn(mosaic.dim(), |(y, x)| {
        let ch = p.cfa.color_at(y, x);
        let black = p.black_level[ch as usize];
        let gain = match ch {
            Channel::Red   => p.red_gain,
            Channel::Green => 1.0,
            Channel::Blue  => p.blue_gain,
        };
        ((mosaic[[y, x]] - black) / (max_in - black)).clamp(0.0, 1.0) * gain
    });

    let mut rgb = demosaic::bilinear(normalized.view(), &p.cfa);
    demosaic::apply_ccm(&mut rgb, &p.ccm);
    rgb.mapv_inplace(|v| v.clamp(0.0, 1.0) * max_out);
    rgb
}

/// A conditioned capture: unit flattened norm, spatial shape matched to its
/// paired PSF.
#[derive(Clone, Debug)]
pub struct Measurement {
    data: Array4<f32>, // [depth=1, h, w, c]
}

impl Measurement {
    pub fn data(&self) -> &Array4<f32> { &self.data }

    pub fn spatial_shape(&self) -> Shape2 {
        let (_, h, w, _) = self.data.dim();
        [h, w]
    }

    pub fn channels(&self) -> usize { self.data.dim().3 }
}

/// Condition a loaded capture against its PSF: subtract the PSF's
/// background, clip, resize to the PSF's spatial shape, normalize by the
/// flattened Euclidean norm (the same convention as PSF conditioning).
pub fn condition(
    image: &Array3<f32>,
    background: &[f32],
    target_shape: Shape2,
) -> Result<Measurement, Error> {
    let (h, w, channels) = image.dim();
    if background.len() != channels {
        return Err(Error::DimensionMismatch { expected: channels, found: background.len() });
    }
    if target_shape[0] == 0 || target_shape[1] == 0 {
        return Err(Error::config("measurement target shape must be non-empty"));
    }

    let mut data = Array4::from_shape_fn((1, h, w, channels), |(_, y, x, c)| {
        (image[[y, x, c]] - background[c]).max(0.0)
    });

    if [h, w] != target_shape {
        let mut resized = Array4::zeros((1, target_shape[0], target_shape[1], channels));
        for c in 0..channels {
            let plane = resample::resize_area(data.slice(s![0, .., .., c]), target_shape);
            resized.slice_mut(s![0, .., .., c]).assign(&plane);
        }
        data = resized;
    }

    let norm = psf::flat_norm(&data);
    if !(norm > 0.0) {
        return Err(Error::config("measurement has no energy after background subtraction"));
    }
    data.mapv_inplace(|v| v / norm);

    Ok(Measurement { data })
}

/// Load and condition a PSF/measurement pair in one step — the contract the
/// external reconstruction component consumes.
pub fn load_pair(
    psf_path: &Path,
    data_path: &Path,
    options: &LoadOptions,
    config: &ConditionConfig,
) -> Result<(Psf, Measurement), Error> {
    let psf = Psf::load(psf_path, options, config)?;
    let image = load_image(data_path, options)?;
    let measurement = condition(&image, psf.background(), psf.spatial_shape())?;
    Ok((psf, measurement))
}
