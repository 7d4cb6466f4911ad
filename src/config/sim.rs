//! Configuration file parser for PSF simulation

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer};
use units::deg;

use crate::error::Error;
use crate::mask::RenderOptions;
use crate::psf::{ConditionConfig, CornerRegion, ResizeTarget};
use crate::wave::Propagation;
use crate::Length;

fn deserialize_uom<'d, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    <&str>::deserialize(deserializer)?
        .parse::<T>()
        .map_err(de::Error::custom)
}

fn deserialize_uom_vec<'d, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'d>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    Vec::<&str>::deserialize(deserializer)?
        .into_iter()
        .map(str::parse::<T>)
        .collect::<Result<_, _>>()
        .map_err(de::Error::custom)
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Config {

    /// Device identifier, resolved through the SLM registry
    pub device: String,

    /// Sensor identifier, resolved through the sensor registry
    pub sensor: String,

    /// Virtual sensor downsampling factor
    pub downsample: Option<f32>,

    /// Pattern dump (.npy) to simulate
    pub pattern: Option<PathBuf>,

    pub sim: Sim,

    #[serde(default)]
    pub conditioning: Conditioning,
}

#[derive(Deserialize, Debug)]
#[serde(deny_unknown_fields)]
pub struct Sim {

    /// Distance from the scene's point source to the mask
    #[serde(deserialize_with = "deserialize_uom")]
    pub scene2mask: Length,

    /// Distance from the mask to the sensor
    #[serde(deserialize_with = "deserialize_uom")]
    pub mask2sensor: Length,

    /// One wavelength per mask channel
    #[serde(deserialize_with = "deserialize_uom_vec")]
    pub wavelengths: Vec<Length>,

    /// Propagate through free space; `false` takes the mask as the PSF
    /// (thin-mask, far-field approximation)
    pub waveprop: bool,

    /// Flip the color-filter layout vertically before rendering
    #[serde(default)]
    pub flip_filter: bool,

    /// Mask rotation about the image centre, in degrees
    #[serde(default)]
    pub rotate: Option<f32>,

    /// Mask registration shift in pixels (rows, cols)
    #[serde(default)]
    pub shift: Option<[isize; 2]>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct Conditioning {

    /// Corner region (start, end) for background estimation
    pub background: Option<(usize, usize)>,

    /// PSF downsampling factor
    pub downsample: Option<f32>,

    #[serde(default)]
    pub single_channel: bool,

    #[serde(default)]
    pub flip: bool,
}

impl Config {

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            rotation: self.sim.rotate.map(deg),
            flip_filter_vertical: self.sim.flip_filter,
            shift: self.sim.shift.unwrap_or([0, 0]),
        }
    }

    pub fn propagation(&self) -> Propagation {
        Propagation {
            scene_to_mask: self.sim.scene2mask,
            mask_to_sensor: self.sim.mask2sensor,
            wavelengths: self.sim.wavelengths.clone(),
            enabled: self.sim.waveprop,
        }
    }

    pub fn condition_config(&self) -> ConditionConfig {
        ConditionConfig {
            background_region: self.conditioning.background
                .map(|(start, end)| CornerRegion { start, end }),
            resize: match self.conditioning.downsample {
                Some(factor) => ResizeTarget::Downsample(factor),
                None => ResizeTarget::Native,
            },
            flip: self.conditioning.flip,
            single_channel: self.conditioning.single_channel,
        }
    }
}

/// Read and parse a configuration file, rejecting unknown fields eagerly.
pub fn read_config_file(path: &Path) -> Result<Config, Error> {
    let text = fs::read_to_string(path)?;
    toml::from_str(&text)
        .map_err(|e| Error::config(format!("{}: {e}", path.display())))
}
