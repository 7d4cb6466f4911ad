//! File formats consumed and produced by the pipeline: serialized numeric
//! arrays for patterns and PSF volumes, raster images for captures and
//! previews.

pub mod npy;
pub mod raster;
