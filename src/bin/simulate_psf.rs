// ----------------------------------- CLI -----------------------------------
#[derive(clap::Parser, Debug, Clone)]
#[clap(name = "simulate_psf", about = "Render a programmable-mask pattern and simulate its intensity PSF")]
pub struct Cli {

    /// TOML simulation configuration
    #[clap(short, long)]
    pub config: PathBuf,

    /// Pattern dump (.npy); overrides the `pattern` entry of the configuration
    #[clap(short, long)]
    pub pattern: Option<PathBuf>,

    /// Directory where artifacts are written
    #[clap(short, long, default_value = "out")]
    pub out_dir: PathBuf,

    /// Also write 8-bit preview images
    #[clap(long)]
    pub previews: bool,

}

// --------------------------------------------------------------------------------

use std::error::Error;
use std::fs::create_dir_all;
use std::path::PathBuf;

use clap::Parser;
use ndarray::Axis;

use lensfree::config::sim::read_config_file;
use lensfree::io::{npy, raster};
use lensfree::sensor::Sensor;
use lensfree::slm::SlmGeometry;
use lensfree::{mask, psf, wave};

fn main() -> Result<(), Box<dyn Error>> {

    env_logger::init();
    let Cli { config, pattern, out_dir, previews } = Cli::parse();

    // Set up progress reporting and timing
    use std::time::Instant;
    let mut now = Instant::now();

    let mut report_time = |message: &str| {
        println!("{}: {} ms", message, now.elapsed().as_millis());
        now = Instant::now();
    };

    let config = read_config_file(&config)?;
    let slm = SlmGeometry::from_name(&config.device)?;
    let mut sensor = Sensor::from_name(&config.sensor)?;
    if let Some(factor) = config.downsample {
        sensor = sensor.downsample(factor)?;
    }

    let pattern_path = pattern.or_else(|| config.pattern.clone())
        .ok_or("no pattern on the command line or in the configuration")?;
    let pattern = npy::read_pattern(&pattern_path)?;
    report_time("Loaded pattern");

    let mask = mask::render(&pattern, &slm, &sensor, &config.render_options())?;
    report_time("Rendered mask");

    let raw = wave::intensity_psf(&mask, &sensor, &config.propagation())?;
    report_time("Propagated to sensor");

    let psf = psf::condition(&raw, &config.condition_config())?;
    log::info!("per-channel background: {:?}", psf.background());
    report_time("Conditioned PSF");

    create_dir_all(&out_dir)?;
    npy::write_f32_dyn(&out_dir.join("mask.npy"), mask.data().view().into_dyn())?;
    npy::write_f32_dyn(&out_dir.join("psf.npy"),  psf.data().view().into_dyn())?;
    if previews {
        // previews are (h, w, c); the mask is stored channel-major
        let mask_hwc = mask.data().view().permuted_axes([1, 2, 0]);
        raster::save_u8(&out_dir.join("mask.png"), mask_hwc)?;
        raster::save_u8(&out_dir.join("psf.png"), psf.data().index_axis(Axis(0), 0))?;
    }
    report_time("Wrote artifacts");

    Ok(())
}
