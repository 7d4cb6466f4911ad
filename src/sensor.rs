//! Sensor descriptors and the sensor registry.

use units::{um, um_, Length};

use crate::demosaic::CfaPattern;
use crate::error::Error;
use crate::Shape2;

/// Color-correction matrix shipped with the Raspberry Pi HQ camera tuning.
pub const RPI_HQ_CCM: [[f32; 3]; 3] = [
    [ 2.0659,   -0.93119, -0.13421],
    [-0.11615,   1.5593,  -0.44314],
    [ 0.073694, -0.4368,   1.36309],
];

/// Sensor black level of the Raspberry Pi HQ camera (12-bit scale).
pub const RPI_HQ_BLACK_LEVEL: f32 = 256.3;

/// Immutable sensor descriptor.
///
/// `black_level`, `ccm` and `cfa` are present only for sensors whose raw
/// output is mosaiced; developed-raster workflows never consult them.
#[derive(Clone, Debug)]
pub struct Sensor {
    resolution: Shape2,
    pitch: Length,
    bit_depth: u8,
    black_level: Option<[f32; 3]>,
    ccm: Option<[[f32; 3]; 3]>,
    cfa: Option<CfaPattern>,
}

impl Sensor {

    pub fn new(
        resolution: Shape2,
        pitch: Length,
        bit_depth: u8,
        black_level: Option<[f32; 3]>,
        ccm: Option<[[f32; 3]; 3]>,
        cfa: Option<CfaPattern>,
    ) -> Result<Self, Error> {
        let [rows, cols] = resolution;
        if rows == 0 || cols == 0 {
            return Err(Error::config("sensor resolution must be non-zero"));
        }
        if !(um_(pitch) > 0.0) {
            return Err(Error::config("sensor pixel pitch must be positive"));
        }
        if bit_depth == 0 || bit_depth > 16 {
            return Err(Error::config(format!("unsupported sensor bit depth {bit_depth}")));
        }
        Ok(Self { resolution, pitch, bit_depth, black_level, ccm, cfa })
    }

    /// Look a sensor up in the registry of known descriptors.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        match name {
            "rpi_hq" => Self::new(
                [3040, 4056],
                um(1.55),
                12,
                Some([RPI_HQ_BLACK_LEVEL; 3]),
                Some(RPI_HQ_CCM),
                Some(CfaPattern::rggb()),
            ),
            "rpi_gs" => Self::new([1088, 1456], um(3.45), 10, None, None, None),
            unknown => Err(Error::config(format!(
                "unknown sensor `{unknown}`; known sensors: {:?}", KNOWN_SENSORS))),
        }
    }

    /// A virtual sensor binning `factor`² physical pixels into one: the
    /// resolution shrinks, the pitch grows, total extent is preserved.
    pub fn downsample(&self, factor: f32) -> Result<Self, Error> {
        if !(factor >= 1.0) {
            return Err(Error::config(format!("downsample factor must be >= 1, got {factor}")));
        }
        let [rows, cols] = self.resolution;
        let resolution = [
            ((rows as f32 / factor).round() as usize).max(1),
            ((cols as f32 / factor).round() as usize).max(1),
        ];
        Self::new(resolution, self.pitch * factor, self.bit_depth,
                  self.black_level, self.ccm, self.cfa.clone())
    }

    pub fn resolution (&self) -> Shape2 { self.resolution }
    pub fn pitch      (&self) -> Length { self.pitch }
    pub fn bit_depth  (&self) -> u8     { self.bit_depth }

    pub fn black_level(&self) -> Option<[f32; 3]>      { self.black_level }
    pub fn ccm        (&self) -> Option<[[f32; 3]; 3]> { self.ccm }
    pub fn cfa        (&self) -> Option<&CfaPattern>   { self.cfa.as_ref() }

    /// Largest representable sample value.
    pub fn max_value(&self) -> f32 { ((1_u32 << self.bit_depth) - 1) as f32 }
}

const KNOWN_SENSORS: [&str; 2] = ["rpi_hq", "rpi_gs"];


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use units::mm_;

    #[test]
    fn registry_known_sensors() {
        let hq = Sensor::from_name("rpi_hq").unwrap();
        assert_eq!(hq.resolution(), [3040, 4056]);
        assert_eq!(hq.bit_depth(), 12);
        assert!(hq.cfa().is_some());

        let gs = Sensor::from_name("rpi_gs").unwrap();
        assert!(gs.black_level().is_none());
    }

    #[test]
    fn registry_rejects_unknown_sensor() {
        assert!(matches!(Sensor::from_name("cmos9000"), Err(Error::Configuration(_))));
    }

    #[test]
    fn downsample_preserves_extent() {
        let hq = Sensor::from_name("rpi_hq").unwrap();
        let small = hq.downsample(8.0).unwrap();
        assert_eq!(small.resolution(), [380, 507]);
        assert_float_eq!(um_(small.pitch()), 12.4, abs <= 1e-4);
        // physical extent unchanged up to rounding
        assert_float_eq!(mm_(small.pitch()) * small.resolution()[0] as f32,
                         mm_(hq.pitch())    * hq.resolution()[0]    as f32,
                         rmax <= 1e-2);
    }

    #[test]
    fn downsample_rejects_magnification() {
        let hq = Sensor::from_name("rpi_hq").unwrap();
        assert!(hq.downsample(0.5).is_err());
    }

    #[test]
    fn max_value_matches_bit_depth() {
        let hq = Sensor::from_name("rpi_hq").unwrap();
        assert_eq!(hq.max_value(), 4095.0);
    }
}
