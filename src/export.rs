//! Write sweep results to disk.
//!
//! Each grid becomes a single-band 32-bit float TIFF named
//! `{stem}_d{distance}_h{humidity}_e{emissivity}_r{reflection}.tiff`,
//! where `stem` is the source file name up to its first `.`.
//! Metadata is then copied from the source image onto the
//! new file; that step is best-effort and only logged.
use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};

use tiff::encoder::{colortype, TiffEncoder};
use tracing::{info, warn};

use crate::{
    error::{Error, Result},
    measure::{MeasurementParams, TemperatureGrid},
    sweep::SweepResult,
};

/// Copies metadata tags from a source image onto a target.
pub trait MetadataCopier {
    fn copy_metadata(&self, source: &Path, target: &Path) -> Result<()>;
}

/// Skip metadata entirely.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataCopier for NoMetadata {
    fn copy_metadata(&self, _: &Path, _: &Path) -> Result<()> {
        Ok(())
    }
}

/// Copy EXIF and XMP by piping `exiv2 -e?-` into `exiv2 -i?-`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exiv2;

impl MetadataCopier for Exiv2 {
    fn copy_metadata(&self, source: &Path, target: &Path) -> Result<()> {
        for (extract, insert, what) in [("-ea-", "-ia-", "exif"), ("-eX-", "-iX-", "xmp")] {
            let mut extractor = Command::new("exiv2")
                .arg(extract)
                .arg(source)
                .stdout(Stdio::piped())
                .spawn()
                .map_err(|e| copy_failed(target, format!("could not run copy of {}: {}", what, e)))?;
            let piped = extractor
                .stdout
                .take()
                .ok_or_else(|| copy_failed(target, format!("no output from {} extraction", what)))?;

            let inserted = run_command(
                Command::new("exiv2").arg(insert).arg(target).stdin(piped),
                target,
                what,
            );
            check_status(extractor.wait(), target, what)?;
            inserted?;
        }
        Ok(())
    }
}

/// Copy all tags with `exiftool -tagsfromfile`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExifTool;

impl MetadataCopier for ExifTool {
    fn copy_metadata(&self, source: &Path, target: &Path) -> Result<()> {
        run_command(
            Command::new("exiftool")
                .arg("-tagsfromfile")
                .arg(source)
                .arg(target)
                .arg("-overwrite_original_in_place"),
            target,
            "tags",
        )
    }
}

fn copy_failed(target: &Path, reason: String) -> Error {
    Error::MetadataCopyFailed {
        target: target.to_path_buf(),
        reason,
    }
}

fn check_status(status: std::io::Result<ExitStatus>, target: &Path, what: &str) -> Result<()> {
    let status =
        status.map_err(|e| copy_failed(target, format!("could not run copy of {}: {}", what, e)))?;
    if !status.success() {
        return Err(copy_failed(target, format!("copy of {} exited with {}", what, status)));
    }
    Ok(())
}

fn run_command(cmd: &mut Command, target: &Path, what: &str) -> Result<()> {
    check_status(cmd.status(), target, what)
}

/// Output path for the grid measured with `params`.
pub fn output_path(dir: &Path, source: &Path, params: &MeasurementParams) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.split('.').next().unwrap_or_default();
    dir.join(format!(
        "{}_d{}_h{}_e{}_r{}.tiff",
        stem, params.distance, params.humidity, params.emissivity, params.reflection
    ))
}

/// Write `grid` as a 32-bit float grayscale TIFF.
pub fn write_grid_tiff(path: &Path, grid: &TemperatureGrid) -> Result<()> {
    let (rows, cols) = grid.dim();
    let data: Vec<f32> = grid.iter().copied().collect();

    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path)?))?;
    encoder.write_image::<colortype::Gray32Float>(cols as u32, rows as u32, &data)?;
    Ok(())
}

/// Write every grid of `result` into `dir` and copy
/// `source`'s metadata onto each of them. Returns the
/// written paths in sweep order.
pub fn export<M: MetadataCopier + ?Sized>(
    result: &SweepResult<TemperatureGrid>,
    source: &Path,
    dir: &Path,
    metadata: &M,
) -> Result<Vec<PathBuf>> {
    export_grids(result.iter(), source, dir, metadata)
}

/// As [`export`], for grids not nested in a
/// [`SweepResult`], such as those completed before a sweep
/// failed.
pub fn export_grids<'a, I, M>(
    grids: I,
    source: &Path,
    dir: &Path,
    metadata: &M,
) -> Result<Vec<PathBuf>>
where
    I: IntoIterator<Item = (MeasurementParams, &'a TemperatureGrid)>,
    M: MetadataCopier + ?Sized,
{
    fs::create_dir_all(dir)?;

    let mut written = vec![];
    for (params, grid) in grids {
        let path = output_path(dir, source, &params);
        write_grid_tiff(&path, grid)?;
        if let Err(e) = metadata.copy_metadata(source, &path) {
            warn!("{}", e);
        }
        written.push(path);
    }

    info!(count = written.len(), dir = %dir.display(), "exported sweep");
    Ok(written)
}
