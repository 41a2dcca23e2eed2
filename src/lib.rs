//! Radiometric temperature sweeps over thermal R-JPEGs.
//!
//! This crate provides three functionalities:
//!
//! 1. Locate and decode [tagged records](tag::find_tag)
//! embedded in an image file, such as the APPn segments
//! carrying raw sensor data in a DJI R-JPEG, and
//! [reinterpret](decode) their payloads as numeric arrays.
//!
//! 2. [Measure](measure::MeasurementEngine::measure)
//! temperature grids from an image under chosen ambient
//! parameters (distance, humidity, emissivity, reflected
//! temperature), and [sweep](sweep) over every combination
//! of candidate values. The heavy lifting is done by a
//! [`ThermalDecoder`]; with the `dji` feature this is the
//! DJI Thermal SDK.
//!
//! 3. Reduce sweep results to [masked means](mask::mask_mean)
//! over a region of interest, or [export](export::export)
//! every grid as a TIFF. Per-pixel emissivity can be
//! [derived from NDVI](emissivity::ndvi_to_emissivity).
//!
//! # Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "dji")]
//! # fn test_compile() -> anyhow::Result<()> {
//! use std::path::Path;
//! use thermal_sweep::{
//!     dji::{DjiDecoder, Verbosity, DEFAULT_APP_KEY},
//!     mask, measure,
//!     sweep::{self, CancelToken},
//! };
//!
//! let decoder = DjiDecoder::new(DEFAULT_APP_KEY, Verbosity::None)?;
//! let mut engine = measure::load_path(&decoder, Path::new("image.jpg"))?;
//!
//! let config = sweep::setup(vec![10.], vec![50.], vec![0.9, 0.95], vec![20.]);
//! let result = sweep::run(&mut engine, &config, &CancelToken::new())?;
//! let means = mask::mask_mean(&result, Path::new("mask.png"))?;
//! # Ok(())
//! # }
//! ```

pub mod decode;
pub mod emissivity;
pub mod error;
pub mod export;
pub mod mask;
pub mod measure;
pub mod stats;
pub mod sweep;
pub mod tag;

#[cfg(feature = "dji")]
pub mod dji;

#[cfg(feature = "cli")]
pub mod cli;

pub use crate::error::{Error, Result};
pub use crate::measure::{
    MeasurementEngine, MeasurementParams, TemperatureGrid, ThermalDecoder, ThermalSession,
};
pub use crate::sweep::{SweepConfig, SweepResult};
