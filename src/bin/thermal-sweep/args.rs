use anyhow::Result;
use std::path::PathBuf;
use thermal_sweep::{arg, args_parser, cli::sweep_config_from_matches, opt, SweepConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMetadata {
    None,
    Exiv2,
    ExifTool,
}

pub struct Args {
    pub image: PathBuf,
    pub config: SweepConfig,
    pub mask: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub copy_metadata: CopyMetadata,
    pub parallel: bool,
    pub verbosity: u64,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("thermal-sweep")
            .about("Measure an R-JPEG under every combination of ambient parameters.")
            .arg(
                opt!("config")
                    .short("c")
                    .help("JSON sweep file with `distances`, `humidities`, `emissivities`, `reflections`"),
            )
            .arg(
                opt!("distance")
                    .short("d")
                    .help("Distances in meters, e.g. `5,10` or `5:50:5`"),
            )
            .arg(opt!("humidity").short("u").help("Relative humidities in percent"))
            .arg(opt!("emissivity").short("e").help("Target emissivities"))
            .arg(
                opt!("reflection")
                    .short("r")
                    .help("Reflected apparent temperatures in celsius"),
            )
            .arg(
                opt!("mask")
                    .short("m")
                    .help("Grayscale mask image; prints the masked mean of every grid as JSON"),
            )
            .arg(
                opt!("output").short("o").help(
                    "Directory to export every grid into as TIFF. If the sweep fails, \
                     grids measured before the failure are still written",
                ),
            )
            .arg(
                opt!("copy metadata")
                    .short("x")
                    .possible_values(&["none", "exiv2", "exiftool"])
                    .default_value("none")
                    .help("Tool used to copy metadata from the image onto exported TIFFs"),
            )
            .arg(
                opt!("parallel")
                    .short("p")
                    .takes_value(false)
                    .help("Measure on all cores, loading one copy of the image per thread"),
            )
            .arg(
                opt!("verbose")
                    .short("v")
                    .takes_value(false)
                    .multiple(true)
                    .help("Increase log verbosity"),
            )
            .arg(arg!("image").required(true).help("R-JPEG path"))
            .get_matches();

        let config = sweep_config_from_matches(&matches)?;
        let copy_metadata = match matches.value_of("copy metadata") {
            Some("exiv2") => CopyMetadata::Exiv2,
            Some("exiftool") => CopyMetadata::ExifTool,
            _ => CopyMetadata::None,
        };

        Ok(Args {
            image: matches.value_of("image").unwrap().into(),
            config,
            mask: matches.value_of("mask").map(PathBuf::from),
            output: matches.value_of("output").map(PathBuf::from),
            copy_metadata,
            parallel: matches.is_present("parallel"),
            verbosity: matches.occurrences_of("verbose"),
        })
    }
}
