// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "prepare_data", about = "Condition a PSF/measurement pair for reconstruction")]
pub struct Cli {

    /// PSF file: .npy volume, raster image, or mosaiced capture
    #[clap(long)]
    pub psf: PathBuf,

    /// Measurement file to pair with the PSF
    #[clap(long)]
    pub data: PathBuf,

    /// Corner region for background estimation, as START..END
    #[clap(short, long, default_value = "5..25", value_parser = parse_region)]
    pub background: CornerRegion,

    /// Downsampling factor applied to the PSF (the measurement follows)
    #[clap(short = 'n', long)]
    pub downsample: Option<f32>,

    /// Sum PSF channels into a single replicated channel
    #[clap(long)]
    pub single_psf: bool,

    /// Flip both axes of PSF and measurement (mounting compensation)
    #[clap(long)]
    pub flip: bool,

    /// Decode the inputs as mosaiced raw using this sensor's metadata
    #[clap(long)]
    pub bayer: Option<String>,

    /// Output bit depth for the mosaic decode
    #[clap(long)]
    pub nbits_out: Option<u8>,

    /// Directory where the conditioned pair is written
    #[clap(short, long, default_value = "out")]
    pub out_dir: PathBuf,

}

fn parse_region(s: &str) -> Result<CornerRegion, String> {
    let v = s.split("..").collect::<Vec<_>>();
    if v.len() != 2 {
        return Err(format!("expected START..END, got `{s}`"));
    }
    let start = v[0].parse().map_err(|e| format!("{e}"))?;
    let end   = v[1].parse().map_err(|e| format!("{e}"))?;
    Ok(CornerRegion { start, end })
}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::fs::create_dir_all;
use std::path::PathBuf;

use clap::Parser;

use lensfree::io::npy;
use lensfree::measurement::{self, LoadOptions, MosaicDecode};
use lensfree::psf::{ConditionConfig, CornerRegion, ResizeTarget};
use lensfree::sensor::Sensor;

fn main() -> Result<(), Box<dyn Error>> {

    env_logger::init();
    let Cli { psf, data, background, downsample, single_psf, flip, bayer, nbits_out, out_dir } =
        Cli::parse();

    let mosaic = bayer
        .map(|name| -> Result<MosaicDecode, lensfree::Error> {
            MosaicDecode::from_sensor(&Sensor::from_name(&name)?, nbits_out)
        })
        .transpose()?;
    let options = LoadOptions { mosaic, flip };

    let config = ConditionConfig {
        background_region: Some(background),
        resize: match downsample {
            Some(factor) => ResizeTarget::Downsample(factor),
            None => ResizeTarget::Native,
        },
        flip: false, // the loader already compensated the mounting
        single_channel: single_psf,
    };

    let (psf, measurement) = measurement::load_pair(&psf, &data, &options, &config)?;
    log::info!("per-channel background: {:?}", psf.background());
    println!("PSF {:?} / measurement {:?}, matched at {:?}",
             psf.data().dim(), measurement.data().dim(), psf.spatial_shape());

    create_dir_all(&out_dir)?;
    npy::write_f32_dyn(&out_dir.join("psf.npy"),  psf.data().view().into_dyn())?;
    npy::write_f32_dyn(&out_dir.join("data.npy"), measurement.data().view().into_dyn())?;

    Ok(())
}
