pub mod todo;

pub use uom;

pub mod mmks {

  // TODO: replace with system! macro, once it has been fixed in uom
  pub mod f32 {
    use uom::{ISQ, system};
    ISQ!(uom::si, f32, (millimeter, kilogram, second, ampere, kelvin, mole, candela));

    /// The full circle constant (τ) Equal to 2π.
    pub const TWOPI: Angle = Angle {
        dimension: std::marker::PhantomData,
        units: std::marker::PhantomData,
        value: std::f32::consts::TAU,
    };
  }

}

pub use uom::si::Quantity;
pub use mmks::f32::{Angle, Length, Ratio, TWOPI};
mod units {
  pub use uom::si::{length::{nanometer, micrometer, millimeter, centimeter, meter},
                    ratio ::ratio,
                    angle ::{radian, degree},
  };
}
// Making values from float literals seems to be very long-winded, so provide
// some pithily-named convenience constructors. These would probably have to be
// packed up in a constructor module in real life.

/// Generate a function called NAME which returns QUANTITY by interpreting its
/// argument as UNIT
///
/// wrap!(NAME QUANTITY UNIT);
macro_rules! wrap {
  ($name:ident $quantity:ident $unit:ident ) => {
    pub fn $name(x: f32) -> $quantity { $quantity::new::<units::$unit>(x) }
  };
}

wrap!(m      Length              meter);
wrap!(cm     Length         centimeter);
wrap!(mm     Length         millimeter);
wrap!(um     Length         micrometer);
wrap!(nm     Length          nanometer);
wrap!(ratio  Ratio               ratio);
wrap!(radian Angle              radian);
wrap!(deg    Angle              degree);

// Reverse direction of the above. Rethink nomenclature once the dust has
// settled after the transition to uom is complete.
pub fn m_ (x: Length) -> f32 { x.get::<units::meter>     () }
pub fn cm_(x: Length) -> f32 { x.get::<units::centimeter>() }
pub fn mm_(x: Length) -> f32 { x.get::<units::millimeter>() }
pub fn um_(x: Length) -> f32 { x.get::<units::micrometer>() }
pub fn nm_(x: Length) -> f32 { x.get::<units::nanometer> () }

pub fn ratio_ (x: Ratio) -> f32 { x.get::<uom::si::ratio::ratio>() }
pub fn radian_(x: Angle) -> f32 { x.get::<uom::si::angle::radian>() }
pub fn deg_   (x: Angle) -> f32 { x.get::<uom::si::angle::degree>() }

#[macro_export]
macro_rules! in_base_unit {
  ($value:expr) => {
    $crate::Quantity {
      dimension: std::marker::PhantomData,
      units: std::marker::PhantomData,
      value: $value,
    }
  };
}


#[macro_export]
macro_rules! assert_uom_eq {
  ($unit:ident, $lhs:expr, $rhs:expr, $algo:ident <= $tol:expr) => {
    float_eq::assert_float_eq!($lhs.get::<$unit>(), $rhs.get::<$unit>(), $algo <= $tol)
  };
}


#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn length_sum_mixed_units() {
    let v = vec![um(1.0), mm(1.0)];
    let total: Length = v.into_iter().sum();
    use units::nanometer;
    assert_uom_eq!(nanometer, total, um(1001.0), ulps <= 1);
  }

  #[test]
  fn wavelengths_survive_f32_storage() {
    // Visible-light wavelengths are ~5e-4 in the mm-based storage unit;
    // they must round-trip through nm without losing precision.
    use units::nanometer;
    assert_uom_eq!(nanometer, nm(532.0), um(0.532), ulps <= 4);
  }

  #[test]
  fn angle_degrees() {
    float_eq::assert_float_eq!(radian_(deg(180.0)), std::f32::consts::PI, ulps <= 2);
  }
}
