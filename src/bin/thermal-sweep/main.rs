mod args;

use std::{fs, io};

use anyhow::{Context, Result};
use serde_derive::*;
use tracing::{error, info, warn};

use thermal_sweep::{
    cli::{init_logging, progress_bar},
    dji::{DjiDecoder, Verbosity, DEFAULT_APP_KEY},
    export::{export, export_grids, ExifTool, Exiv2, MetadataCopier, NoMetadata},
    mask::mask_mean,
    measure,
    stats::Stats,
    sweep::{self, CancelToken, SweepOutcome},
    SweepResult, TemperatureGrid,
};

use args::{Args, CopyMetadata};

fn main() -> Result<()> {
    let args = Args::from_cmd_line()?;
    init_logging(args.verbosity);

    let verbosity = match args.verbosity {
        0 | 1 => Verbosity::None,
        2 => Verbosity::Debug,
        _ => Verbosity::Detail,
    };
    let decoder = DjiDecoder::new(DEFAULT_APP_KEY, verbosity)?;
    let bytes = fs::read(&args.image)
        .with_context(|| format!("reading {}", args.image.display()))?;

    let copier: Box<dyn MetadataCopier> = match args.copy_metadata {
        CopyMetadata::None => Box::new(NoMetadata),
        CopyMetadata::Exiv2 => Box::new(Exiv2),
        CopyMetadata::ExifTool => Box::new(ExifTool),
    };

    let bar = progress_bar(args.config.len() as u64);
    let outcome: SweepOutcome = if args.parallel {
        sweep::run_par(&decoder, &bytes, &args.config, &CancelToken::new(), |_| {
            bar.inc(1)
        })
    } else {
        let mut engine = measure::load(&decoder, bytes)?;
        sweep::run_with_progress(&mut engine, &args.config, &CancelToken::new(), |_| {
            bar.inc(1)
        })
    };
    bar.finish_and_clear();

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            error!(completed = e.completed.len(), "{}", e.source);
            if let Some(dir) = args.output.as_ref().filter(|_| !e.completed.is_empty()) {
                let grids = e.completed.iter().map(|(params, grid)| (*params, grid));
                match export_grids(grids, &args.image, dir, &*copier) {
                    Ok(written) => eprintln!(
                        "Exported {} completed grids to {}",
                        written.len(),
                        dir.display()
                    ),
                    Err(export_err) => warn!("could not export completed grids: {}", export_err),
                }
            }
            return Err(e.into());
        }
    };
    info!(shape = ?result.shape(), "sweep finished");

    if let Some(mask) = &args.mask {
        let means = mask_mean(&result, mask)
            .with_context(|| format!("masking with {}", mask.display()))?;
        print_means(&result, &means)?;
    }

    if let Some(dir) = &args.output {
        let written = export(&result, &args.image, dir, &*copier)?;
        eprintln!("Exported {} grids to {}", written.len(), dir.display());
    }

    Ok(())
}

fn print_means(result: &SweepResult<TemperatureGrid>, means: &SweepResult<f64>) -> Result<()> {
    #[derive(Debug, Serialize)]
    struct OutputJson<'a> {
        means: &'a SweepResult<f64>,
        cumulative: Stats,
    }

    let mut cumulative = Stats::default();
    for grid in result.leaves() {
        cumulative += &grid.iter().collect::<Stats>();
    }

    serde_json::to_writer(
        io::stdout().lock(),
        &OutputJson {
            means,
            cumulative,
        },
    )?;
    Ok(())
}
