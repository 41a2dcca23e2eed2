//! Reduce sweep results over a region of interest.
//!
//! The region is given as a grayscale image of the same
//! size as the temperature grids. It is binarized with
//! Otsu's method: pixels brighter than the threshold are in
//! the region (255), the rest are not (0).
use std::path::Path;

use ndarray::{Array2, ArrayView2, Zip};
use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    measure::TemperatureGrid,
    stats::Stats,
    sweep::SweepResult,
};

/// Otsu threshold of an 8-bit image: the level `t` that
/// maximizes the between-class variance of `<= t` and `> t`.
pub fn otsu_threshold(image: &ArrayView2<u8>) -> u8 {
    let mut histogram = [0u64; 256];
    for &pixel in image.iter() {
        histogram[pixel as usize] += 1;
    }

    let total = image.len() as f64;
    let sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut sum_b = 0.;
    let mut weight_b = 0.;
    let mut max_variance = 0.;
    let mut threshold = 0;

    for (i, &count) in histogram.iter().enumerate() {
        weight_b += count as f64;
        if weight_b == 0. {
            continue;
        }
        let weight_f = total - weight_b;
        if weight_f == 0. {
            break;
        }

        sum_b += i as f64 * count as f64;
        let mean_b = sum_b / weight_b;
        let mean_f = (sum - sum_b) / weight_f;

        let variance = weight_b * weight_f * (mean_b - mean_f).powi(2);
        if variance > max_variance {
            max_variance = variance;
            threshold = i as u8;
        }
    }
    threshold
}

/// Map pixels above `threshold` to 255 and the rest to 0.
pub fn binarize(image: &ArrayView2<u8>, threshold: u8) -> Array2<u8> {
    image.mapv(|v| if v > threshold { 255 } else { 0 })
}

/// Load a grayscale image as an Otsu-binarized mask.
pub fn load_mask(path: &Path) -> Result<Array2<u8>> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }

    let gray = image::open(path)?.to_luma8();
    let (width, height) = gray.dimensions();
    let gray = Array2::from_shape_vec((height as usize, width as usize), gray.into_raw())
        .map_err(|e| Error::Load(e.to_string()))?;

    let threshold = otsu_threshold(&gray.view());
    let mask = binarize(&gray.view(), threshold);
    debug!(
        path = %path.display(),
        threshold,
        selected = mask.iter().filter(|&&v| v != 0).count(),
        "loaded mask"
    );
    Ok(mask)
}

/// Statistics of `grid` over the non-zero pixels of `mask`.
pub fn masked_stats(grid: &TemperatureGrid, mask: &ArrayView2<u8>) -> Result<Stats> {
    if grid.dim() != mask.dim() {
        return Err(Error::ShapeMismatch {
            expected: grid.dim(),
            found: mask.dim(),
        });
    }

    let mut stats = Stats::default();
    Zip::from(grid).and(mask).for_each(|&temp, &m| {
        if m != 0 {
            stats += temp as f64;
        }
    });
    Ok(stats)
}

/// Masked statistics of every grid, nested like the sweep.
pub fn mask_stats(
    result: &SweepResult<TemperatureGrid>,
    mask: &ArrayView2<u8>,
) -> Result<SweepResult<Stats>> {
    if mask.iter().all(|&v| v == 0) {
        warn!("mask selects no pixels; means will be NaN");
    }
    result.try_par_map(|grid| masked_stats(grid, mask))
}

/// Mean temperature over the mask at `mask_path` for every
/// grid, nested like the sweep.
pub fn mask_mean(
    result: &SweepResult<TemperatureGrid>,
    mask_path: &Path,
) -> Result<SweepResult<f64>> {
    let mask = load_mask(mask_path)?;
    Ok(mask_stats(result, &mask.view())?.map(Stats::mean))
}
