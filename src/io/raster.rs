//! Raster images: 8/16-bit PNG/TIFF in, min–max-scaled 8-bit previews out.

use std::path::Path;

use image::{DynamicImage, GenericImageView};
use ndarray::{Array2, Array3, ArrayView3};

use crate::error::Error;

/// A decoded raster at its native scale (0..255 for 8-bit sources, 0..65535
/// for 16-bit), in RGB channel order where applicable.
pub enum Raster {
    Gray(Array2<f32>),
    Rgb(Array3<f32>),
}

pub fn load(path: &Path) -> Result<Raster, Error> {
    let img = image::open(path).map_err(map_image_error)?;
    let (w, h) = (img.width() as usize, img.height() as usize);
    Ok(match img {
        DynamicImage::ImageLuma8(g) =>
            Raster::Gray(Array2::from_shape_fn((h, w), |(y, x)| {
                g.get_pixel(x as u32, y as u32)[0] as f32
            })),
        DynamicImage::ImageLuma16(g) =>
            Raster::Gray(Array2::from_shape_fn((h, w), |(y, x)| {
                g.get_pixel(x as u32, y as u32)[0] as f32
            })),
        DynamicImage::ImageRgb8(rgb) =>
            Raster::Rgb(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
                rgb.get_pixel(x as u32, y as u32)[c] as f32
            })),
        DynamicImage::ImageRgb16(rgb) =>
            Raster::Rgb(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
                rgb.get_pixel(x as u32, y as u32)[c] as f32
            })),
        // alpha carries nothing for us: drop it
        DynamicImage::ImageRgba8(rgba) =>
            Raster::Rgb(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
                rgba.get_pixel(x as u32, y as u32)[c] as f32
            })),
        DynamicImage::ImageRgba16(rgba) =>
            Raster::Rgb(Array3::from_shape_fn((h, w, 3), |(y, x, c)| {
                rgba.get_pixel(x as u32, y as u32)[c] as f32
            })),
        other => return Err(Error::format(format!(
            "unsupported raster color type {:?}", other.color()))),
    })
}

/// Save an (h, w, c) image as an 8-bit raster, min–max scaled — the display
/// convention, distinct from any of the pipeline normalizations.
pub fn save_u8(path: &Path, image: ArrayView3<f32>) -> Result<(), Error> {
    let (h, w, c) = image.dim();
    let min = image.fold(f32::INFINITY,     |m, v| m.min(*v));
    let max = image.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
    let scale = if max > min { 255.0 / (max - min) } else { 0.0 };
    let level = |v: f32| ((v - min) * scale).round() as u8;

    match c {
        1 => image::GrayImage::from_fn(w as u32, h as u32, |x, y| {
                image::Luma([level(image[[y as usize, x as usize, 0]])])
             }).save(path).map_err(map_image_error),
        3 => image::RgbImage::from_fn(w as u32, h as u32, |x, y| {
                image::Rgb([
                    level(image[[y as usize, x as usize, 0]]),
                    level(image[[y as usize, x as usize, 1]]),
                    level(image[[y as usize, x as usize, 2]]),
                ])
             }).save(path).map_err(map_image_error),
        n => Err(Error::format(format!("cannot save a {n}-channel image as a raster"))),
    }
}

fn map_image_error(e: image::ImageError) -> Error {
    match e {
        image::ImageError::IoError(io) => Error::Io(io),
        other => Error::format(other.to_string()),
    }
}
