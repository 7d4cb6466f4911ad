//! Spatial resampling shared by the mask, PSF and measurement stages:
//! area-preserving resize, rigid rotation about the image centre, and
//! circular shifts.

use ndarray::{Array2, ArrayView2};
use units::{radian_, Angle};

use crate::Shape2;

/// Resize by box integration: each output pixel is the area-weighted mean of
/// the source pixels its footprint overlaps. Exact for integer downsampling
/// factors; the native shape is returned unchanged.
pub fn resize_area(src: ArrayView2<f32>, target: Shape2) -> Array2<f32> {
    let (sh, sw) = src.dim();
    let [th, tw] = target;
    if [sh, sw] == target {
        return src.to_owned();
    }

    let sy = sh as f64 / th as f64;
    let sx = sw as f64 / tw as f64;

    let mut out = Array2::zeros((th, tw));
    for oy in 0..th {
        let y0 = oy as f64 * sy;
        let y1 = y0 + sy;
        let iy1 = (y1.ceil() as usize).min(sh);
        for ox in 0..tw {
            let x0 = ox as f64 * sx;
            let x1 = x0 + sx;
            let ix1 = (x1.ceil() as usize).min(sw);

            let mut acc  = 0.0_f64;
            let mut area = 0.0_f64;
            for iy in (y0.floor() as usize)..iy1 {
                let wy = overlap(iy, y0, y1);
                for ix in (x0.floor() as usize)..ix1 {
                    let wx = overlap(ix, x0, x1);
                    acc  += src[[iy, ix]] as f64 * wy * wx;
                    area += wy * wx;
                }
            }
            out[[oy, ox]] = (acc / area) as f32;
        }
    }
    out
}

/// Overlap of the unit interval starting at `i` with (a, b).
fn overlap(i: usize, a: f64, b: f64) -> f64 {
    (b.min(i as f64 + 1.0) - a.max(i as f64)).max(0.0)
}

/// Rigid rotation about the image centre, bilinear, no reshape; samples
/// falling outside the source are zero.
pub fn rotate_about_center(src: ArrayView2<f32>, angle: Angle) -> Array2<f32> {
    let theta = radian_(angle);
    let (sin, cos) = theta.sin_cos();
    let (h, w) = src.dim();
    let cy = (h as f32 - 1.0) / 2.0;
    let cx = (w as f32 - 1.0) / 2.0;

    Array2::from_shape_fn((h, w), |(oy, ox)| {
        let dy = oy as f32 - cy;
        let dx = ox as f32 - cx;
        // inverse mapping: rotate the destination offset back into the source
        let sy = cy + dy * cos - dx * sin;
        let sx = cx + dy * sin + dx * cos;
        sample_bilinear(src, sy, sx)
    })
}

fn sample_bilinear(src: ArrayView2<f32>, y: f32, x: f32) -> f32 {
    let (h, w) = src.dim();
    let y0 = y.floor();
    let x0 = x.floor();
    let fy = y - y0;
    let fx = x - x0;

    let at = |iy: f32, ix: f32| -> f32 {
        if iy < 0.0 || ix < 0.0 || iy as usize >= h || ix as usize >= w { 0.0 }
        else { src[[iy as usize, ix as usize]] }
    };

    at(y0,       x0      ) * (1.0 - fy) * (1.0 - fx)
  + at(y0,       x0 + 1.0) * (1.0 - fy) * fx
  + at(y0 + 1.0, x0      ) * fy         * (1.0 - fx)
  + at(y0 + 1.0, x0 + 1.0) * fy         * fx
}

/// Circular shift by (rows, cols); positive shifts move content down/right.
pub fn roll(src: ArrayView2<f32>, shift: [isize; 2]) -> Array2<f32> {
    let (h, w) = src.dim();
    Array2::from_shape_fn((h, w), |(y, x)| {
        let sy = (y as isize - shift[0]).rem_euclid(h as isize) as usize;
        let sx = (x as isize - shift[1]).rem_euclid(w as isize) as usize;
        src[[sy, sx]]
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::assert_float_eq;
    use ndarray::{array, Array2};
    use proptest::prelude::*;
    use units::deg;

    #[test]
    fn native_shape_is_identity() {
        let src = Array2::from_shape_fn((5, 7), |(y, x)| (y * 7 + x) as f32);
        assert_eq!(resize_area(src.view(), [5, 7]), src);
    }

    #[test]
    fn integer_downsample_averages_blocks() {
        let src = array![[1.0, 3.0, 5.0, 7.0],
                         [1.0, 3.0, 5.0, 7.0],
                         [9.0, 9.0, 2.0, 2.0],
                         [9.0, 9.0, 2.0, 2.0_f32]];
        let out = resize_area(src.view(), [2, 2]);
        assert_eq!(out, array![[2.0, 6.0], [9.0, 2.0]]);
    }

    proptest! {
        #[test]
        fn uniform_images_stay_uniform(
            value in -10.0 .. 10.0_f32,
            sh in 1..40_usize, sw in 1..40_usize,
            th in 1..40_usize, tw in 1..40_usize,
        ) {
            let src = Array2::from_elem((sh, sw), value);
            let out = resize_area(src.view(), [th, tw]);
            for v in out.iter() {
                prop_assert!((v - value).abs() < 1e-4);
            }
        }

        #[test]
        fn downsample_preserves_mean(
            seed in 0..1000_u32,
            n in 1..8_usize,
        ) {
            // 4n × 4n down to n × n: footprints tile exactly, so the global
            // mean is preserved to rounding.
            let side = 4 * n;
            let src = Array2::from_shape_fn((side, side), |(y, x)| {
                ((y * 31 + x * 17 + seed as usize) % 97) as f32
            });
            let out = resize_area(src.view(), [n, n]);
            let mean_in:  f32 = src.mean().unwrap();
            let mean_out: f32 = out.mean().unwrap();
            prop_assert!((mean_in - mean_out).abs() < 1e-3);
        }
    }

    #[test]
    fn zero_rotation_is_identity() {
        let src = Array2::from_shape_fn((4, 4), |(y, x)| (y * 4 + x) as f32);
        let out = rotate_about_center(src.view(), deg(0.0));
        for (a, b) in src.iter().zip(out.iter()) {
            assert_float_eq!(*a, *b, abs <= 1e-5);
        }
    }

    #[test]
    fn quarter_turn_moves_pixels() {
        let mut src = Array2::zeros((3, 3));
        src[[0, 1]] = 1.0_f32;
        let out = rotate_about_center(src.view(), deg(90.0));
        assert_float_eq!(out[[1, 2]], 1.0, abs <= 1e-5);
        assert_float_eq!(out[[0, 1]], 0.0, abs <= 1e-5);
    }

    #[test]
    fn roll_wraps_around() {
        let src = array![[1.0, 2.0], [3.0, 4.0_f32]];
        let out = roll(src.view(), [1, 0]);
        assert_eq!(out, array![[3.0, 4.0], [1.0, 2.0]]);
        let out = roll(src.view(), [0, -1]);
        assert_eq!(out, array![[2.0, 1.0], [4.0, 3.0]]);
    }
}
