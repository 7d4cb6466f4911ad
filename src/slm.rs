//! Programmable-mask (SLM) geometry: typed device descriptors, the device
//! registry, control-pattern validation and the hardware-upload seam.

use ndarray::{Array3, ArrayD, Axis};
use units::{mm, um, mm_, Length};

use crate::error::Error;
use crate::Shape2;

/// Per-cell color-filter table.
///
/// The table tiles the cell grid: cell (i, j) takes the weight stored at
/// (i mod rows, j mod cols). Each entry is an RGB weight triple.
#[derive(Clone, Debug)]
pub struct ColorFilter {
    weights: Array3<f32>, // (rows, cols, 3)
}

impl ColorFilter {

    pub fn new(weights: Array3<f32>) -> Result<Self, Error> {
        let (fh, fw, c) = weights.dim();
        if fh == 0 || fw == 0 || c != 3 {
            return Err(Error::config(format!(
                "color-filter table must have shape (rows, cols, 3), got ({fh}, {fw}, {c})")));
        }
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::config("color-filter weights must be finite and non-negative"));
        }
        Ok(Self { weights })
    }

    /// Horizontal RGB stripes: cell rows cycle through pure R, G, B.
    pub fn rgb_stripes() -> Self {
        let mut weights = Array3::zeros((3, 1, 3));
        for c in 0..3 { weights[[c, 0, c]] = 1.0; }
        Self { weights }
    }

    /// The same table with its row order reversed (mounting compensation).
    pub fn flipped_vertical(&self) -> Self {
        let mut weights = self.weights.clone();
        weights.invert_axis(Axis(0));
        Self { weights }
    }

    /// RGB weight of the cell at (row, col).
    pub fn weight(&self, row: usize, col: usize) -> [f32; 3] {
        let (fh, fw, _) = self.weights.dim();
        let (r, c) = (row % fh, col % fw);
        [self.weights[[r, c, 0]], self.weights[[r, c, 1]], self.weights[[r, c, 2]]]
    }
}

/// Physical geometry of a programmable mask.
///
/// `shape` counts logical cells per channel: a color device with shape
/// (r, c) exposes 3 × r × c independently controllable values, rendered on an
/// interleaved grid of 3r × c sub-cells (see [`SlmGeometry::grid_shape`]).
/// Immutable once constructed; all invariants are checked eagerly.
#[derive(Clone, Debug)]
pub struct SlmGeometry {
    cell_size: [Length; 2],
    pitch: [Length; 2],
    shape: Shape2,
    color_filter: Option<ColorFilter>,
}

impl SlmGeometry {

    pub fn new(
        cell_size: [Length; 2],
        pitch: [Length; 2],
        shape: Shape2,
        color_filter: Option<ColorFilter>,
    ) -> Result<Self, Error> {
        let [rows, cols] = shape;
        if rows == 0 || cols == 0 {
            return Err(Error::config("controllable region must have at least one cell"));
        }
        for axis in 0..2 {
            if !(mm_(cell_size[axis]) > 0.0) {
                return Err(Error::config("cell size must be positive"));
            }
            if mm_(pitch[axis]) < mm_(cell_size[axis]) {
                return Err(Error::config("cell pitch cannot be smaller than the cell size"));
            }
        }
        Ok(Self { cell_size, pitch, shape, color_filter })
    }

    /// Look a device up in the registry of known geometries.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            // 1.8" RGB LCD: each logical cell is a stack of three color
            // sub-cells, one per stripe of the filter.
            "adafruit" => Self::new(
                [mm(0.06), mm(0.18)],
                [mm(0.06), mm(0.18)],
                [128, 160],
                Some(ColorFilter::rgb_stripes()),
            ),
            // Monochrome graphic LCD.
            "nokia" => Self::new(
                [mm(0.339), mm(0.396)],
                [mm(0.339), mm(0.396)],
                [48, 84],
                None,
            ),
            // Monochrome transmissive SLM.
            "holoeye" => Self::new(
                [um(36.0), um(36.0)],
                [um(36.0), um(36.0)],
                [768, 1024],
                None,
            ),
            unknown => Err(Error::config(format!(
                "unknown device `{unknown}`; known devices: {:?}", KNOWN_DEVICES))),
        }
    }

    pub fn cell_size(&self) -> [Length; 2] { self.cell_size }
    pub fn pitch    (&self) -> [Length; 2] { self.pitch }
    pub fn shape    (&self) -> Shape2      { self.shape }

    pub fn color_filter(&self) -> Option<&ColorFilter> { self.color_filter.as_ref() }
    pub fn is_monochrome(&self) -> bool { self.color_filter.is_none() }

    /// Number of channels in the rendered mask image.
    pub fn channels(&self) -> usize { if self.is_monochrome() { 1 } else { 3 } }

    /// Shape of the rendered cell grid: color devices interleave the three
    /// channels of each cell row into consecutive sub-cell rows.
    pub fn grid_shape(&self) -> Shape2 {
        let [rows, cols] = self.shape;
        if self.is_monochrome() { [rows, cols] } else { [3 * rows, cols] }
    }

    /// Shape a control pattern for this device must have.
    pub fn pattern_shape(&self) -> Vec<usize> {
        let [rows, cols] = self.shape;
        if self.is_monochrome() { vec![rows, cols] } else { vec![3, rows, cols] }
    }

    /// Check a control pattern against this geometry: exact shape, and every
    /// value within [0, 1].
    pub fn validate_pattern(&self, pattern: &ArrayD<f32>) -> Result<(), Error> {
        let expected = self.pattern_shape();
        if pattern.shape() != expected.as_slice() {
            return Err(Error::config(format!(
                "pattern shape {:?} does not match expected shape {:?}",
                pattern.shape(), expected)));
        }
        if pattern.iter().any(|v| !v.is_finite() || *v < 0.0 || *v > 1.0) {
            return Err(Error::config("pattern values must lie in [0, 1]"));
        }
        Ok(())
    }
}

const KNOWN_DEVICES: [&str; 3] = ["adafruit", "nokia", "holoeye"];

/// Transport seam for pushing a pattern to physical hardware. The mechanics
/// (SSH, serial, …) live outside this crate; implementations only ever see
/// patterns that passed [`SlmGeometry::validate_pattern`].
pub trait PatternTransport {
    fn upload(&self, device: &str, pattern: &ArrayD<f32>) -> Result<(), Error>;
}

/// Validate `pattern` against the registry entry for `device`, then hand it
/// to the transport.
pub fn upload_pattern(
    transport: &impl PatternTransport,
    device: &str,
    pattern: &ArrayD<f32>,
) -> Result<(), Error> {
    let geometry = SlmGeometry::from_name(device)?;
    geometry.validate_pattern(pattern)?;
    transport.upload(device, pattern)
}
