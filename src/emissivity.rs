//! Surface emissivity from NDVI.
//!
//! Piecewise model between a bare-soil and a full-canopy
//! reference: below the soil NDVI the soil emissivity is
//! used, above the vegetation NDVI the vegetation
//! emissivity, and in between the two are blended by the
//! squared scaled NDVI (the vegetation proportion).
use ndarray::{Array, ArrayBase, Data, Dimension};

const NDVI_SOIL: f64 = 0.157;
const NDVI_VEG: f64 = 0.905;
const EMISSIVITY_SOIL: f64 = 0.935;
const EMISSIVITY_VEG: f64 = 0.988;

/// Emissivity of a single pixel.
pub fn emissivity_from_ndvi(ndvi: f64) -> f64 {
    if ndvi < NDVI_SOIL {
        EMISSIVITY_SOIL
    } else if ndvi > NDVI_VEG {
        EMISSIVITY_VEG
    } else {
        let p_v = ((ndvi - NDVI_SOIL) / (NDVI_VEG - NDVI_SOIL)).powi(2);
        EMISSIVITY_VEG * p_v + EMISSIVITY_SOIL * (1. - p_v)
    }
}

/// Element-wise [`emissivity_from_ndvi`], preserving shape.
pub fn ndvi_to_emissivity<S, D>(ndvi: &ArrayBase<S, D>) -> Array<f64, D>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    ndvi.mapv(emissivity_from_ndvi)
}

/// [`ndvi_to_emissivity`] for single-precision rasters.
pub fn ndvi_to_emissivity_f32<S, D>(ndvi: &ArrayBase<S, D>) -> Array<f32, D>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    ndvi.mapv(|v| emissivity_from_ndvi(v as f64) as f32)
}
