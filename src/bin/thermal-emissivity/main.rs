use std::{fs::File, io::BufReader, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::value_t_or_exit;
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tracing::info;

use thermal_sweep::{
    arg, args_parser, cli::init_logging, emissivity::ndvi_to_emissivity_f32,
    export::write_grid_tiff,
};

fn main() -> Result<()> {
    let matches = args_parser!("thermal-emissivity")
        .about("Convert a single-band float NDVI TIFF into per-pixel emissivity.")
        .arg(arg!("ndvi").required(true).help("NDVI TIFF path"))
        .arg(arg!("output").required(true).help("Emissivity TIFF path"))
        .get_matches();
    init_logging(0);

    let input = value_t_or_exit!(matches, "ndvi", PathBuf);
    let output = value_t_or_exit!(matches, "output", PathBuf);

    let mut decoder = Decoder::new(BufReader::new(
        File::open(&input).with_context(|| format!("opening {}", input.display()))?,
    ))?;
    let (width, height) = decoder.dimensions()?;
    let values = match decoder.read_image()? {
        DecodingResult::F32(values) => values,
        DecodingResult::F64(values) => values.into_iter().map(|v| v as f32).collect(),
        _ => bail!("NDVI image must hold floating point samples"),
    };
    let ndvi = Array2::from_shape_vec((height as usize, width as usize), values)
        .context("NDVI image must be single-band")?;

    let emissivity = ndvi_to_emissivity_f32(&ndvi);
    write_grid_tiff(&output, &emissivity)?;
    info!(width, height, output = %output.display(), "wrote emissivity");

    Ok(())
}
