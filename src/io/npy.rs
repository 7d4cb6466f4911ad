//! Read / write serialized numeric arrays (NumPy `.npy`).

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::{ArrayD, ArrayViewD, IxDyn};
use npyz::WriterBuilder;

use crate::error::Error;

/// Read an array as f32, at its native scale. Accepts u8, u16, f32 and f64
/// element types — everything our pattern dumps and PSF volumes come in.
pub fn read_f32_dyn(path: &Path) -> Result<ArrayD<f32>, Error> {
    let file = File::open(path)?;
    let npy = npyz::NpyFile::new(BufReader::new(file))?;
    let shape: Vec<usize> = npy.shape().iter().map(|&n| n as usize).collect();

    let type_str = match npy.dtype() {
        npyz::DType::Plain(ts) => ts.to_string(),
        other => return Err(Error::format(format!("unsupported npy dtype {other:?}"))),
    };
    let data: Vec<f32> = match &type_str[1..] {
        "u1" => npy.into_vec::<u8>()? .into_iter().map(|v| v as f32).collect(),
        "u2" => npy.into_vec::<u16>()?.into_iter().map(|v| v as f32).collect(),
        "f4" => npy.into_vec::<f32>()?,
        "f8" => npy.into_vec::<f64>()?.into_iter().map(|v| v as f32).collect(),
        other => return Err(Error::format(format!("unsupported npy element type {other}"))),
    };

    ArrayD::from_shape_vec(IxDyn(&shape), data)
        .map_err(|e| Error::format(format!("corrupt npy payload: {e}")))
}

/// Read a pattern dump and scale it to [0, 1]: integer dumps divide by the
/// type's full scale, float dumps are taken as already normalized.
pub fn read_pattern(path: &Path) -> Result<ArrayD<f32>, Error> {
    let array = read_f32_dyn(path)?;
    let max = array.fold(0.0_f32, |m, v| m.max(*v));
    Ok(if max > 1.0 { array.mapv(|v| v / 255.0) } else { array })
}

/// Write an f32 array in C order.
pub fn write_f32_dyn(path: &Path, array: ArrayViewD<f32>) -> Result<(), Error> {
    let file = BufWriter::new(File::create(path)?);
    let shape: Vec<u64> = array.shape().iter().map(|&n| n as u64).collect();
    let mut writer = npyz::WriteOptions::new()
        .default_dtype()
        .shape(&shape)
        .writer(file)
        .begin_nd()?;
    for v in array.iter() {
        writer.push(v)?;
    }
    writer.finish()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    #[allow(unused)] use pretty_assertions::{assert_eq, assert_ne};
    use ndarray::ArrayD;
    use tempfile::tempdir;

    #[test]
    fn npy_roundtrip_preserves_shape_and_data() -> Result<(), Error> {
        let dir = tempdir()?;
        let path = dir.path().join("volume.npy");

        let original = ArrayD::from_shape_fn(vec![2, 3, 4], |ix| {
            (ix[0] * 12 + ix[1] * 4 + ix[2]) as f32 / 7.0
        });
        write_f32_dyn(&path, original.view())?;
        let reloaded = read_f32_dyn(&path)?;

        assert_eq!(original, reloaded);
        Ok(())
    }

    #[test]
    fn integer_patterns_are_scaled_to_unit_range() -> Result<(), Error> {
        let dir = tempdir()?;
        let path = dir.path().join("pattern.npy");

        // write an 8-bit-scaled float dump, as produced by pattern tooling
        let dump = ArrayD::from_shape_fn(vec![4, 4], |ix| (ix[0] * 4 + ix[1]) as f32 * 17.0);
        write_f32_dyn(&path, dump.view())?;

        let pattern = read_pattern(&path)?;
        let max = pattern.fold(0.0_f32, |m, v| m.max(*v));
        assert!(max <= 1.0);
        assert_eq!(pattern[[3, 3]], 255.0 / 255.0);
        Ok(())
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = read_f32_dyn(Path::new("no/such/file.npy")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
