pub use crate::error::Error;

pub use units::uom::si::Quantity;
pub use units::{Angle, Length, Ratio};
pub use units::todo::{Intensityf32, Lengthf32, Ratiof32};

/// Complex field sample at working precision.
pub type Complexf32 = num_complex::Complex32;

/// Spatial shape as (rows, cols).
pub type Shape2 = [usize; 2];
