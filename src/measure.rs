//! Temperature measurement over an opaque radiometric
//! decoder.
//!
//! The decoder holds per-image mutable state (the current
//! measurement parameters and its own output buffer), so a
//! [`ThermalSession`] is `&mut` for every call. Share one
//! across threads only behind a lock, or open one session
//! per thread (see [`crate::sweep::run_par`]).
use std::path::Path;

use ndarray::Array2;
use serde_derive::*;
use tracing::debug;

use crate::error::{Error, Result};

/// Output shape (rows, columns) of the supported cameras.
pub const GRID_SHAPE: (usize, usize) = (512, 640);

/// Row-major temperatures in celsius.
pub type TemperatureGrid = Array2<f32>;

/// Ambient parameters used to derive temperatures from raw
/// sensor values. Ranges are not validated here; the
/// decoder is free to reject values it can't handle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementParams {
    /// Distance to the target in meters.
    pub distance: f32,
    /// Relative humidity in percent.
    pub humidity: f32,
    /// Target emissivity in `[0, 1]`.
    pub emissivity: f32,
    /// Reflected apparent temperature in celsius.
    pub reflection: f32,
}

impl MeasurementParams {
    pub fn new(distance: f32, humidity: f32, emissivity: f32, reflection: f32) -> Self {
        MeasurementParams {
            distance,
            humidity,
            emissivity,
            reflection,
        }
    }
}

impl Default for MeasurementParams {
    fn default() -> Self {
        MeasurementParams::new(10.0, 77.0, 0.95, 21.0)
    }
}

/// A loaded image inside a radiometric decoder.
pub trait ThermalSession {
    fn set_measurement_params(&mut self, params: &MeasurementParams) -> Result<()>;

    /// Decode temperatures with the current parameters into
    /// `out`, which holds exactly `rows * cols` values.
    fn measure_into(&mut self, out: &mut [f32]) -> Result<()>;

    /// Output shape as (rows, columns).
    fn resolution(&self) -> Result<(usize, usize)> {
        Ok(GRID_SHAPE)
    }
}

/// Opens [`ThermalSession`]s from raw image bytes.
pub trait ThermalDecoder {
    type Session: ThermalSession;

    fn load(&self, bytes: Vec<u8>) -> Result<Self::Session>;
}

/// Owns a session and its scratch buffer, and hands out
/// independent temperature grids.
#[derive(Debug)]
pub struct MeasurementEngine<S> {
    session: S,
    shape: (usize, usize),
    scratch: Vec<f32>,
}

impl<S: ThermalSession> MeasurementEngine<S> {
    pub fn new(session: S) -> Result<Self> {
        let shape = session.resolution()?;
        Ok(MeasurementEngine {
            session,
            shape,
            scratch: vec![0.; shape.0 * shape.1],
        })
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Measure a temperature grid under `params`.
    ///
    /// The returned grid is a fresh copy; later calls never
    /// write into it.
    pub fn measure(&mut self, params: MeasurementParams) -> Result<TemperatureGrid> {
        debug!(?params, "measuring");
        self.session.set_measurement_params(&params)?;
        self.session.measure_into(&mut self.scratch)?;
        Array2::from_shape_vec(self.shape, self.scratch.clone())
            .map_err(|e| Error::Decode(e.to_string()))
    }
}

impl<S> MeasurementEngine<S> {
    pub fn into_session(self) -> S {
        self.session
    }
}

/// Load an image from raw bytes into `decoder`.
pub fn load<D: ThermalDecoder>(
    decoder: &D,
    bytes: Vec<u8>,
) -> Result<MeasurementEngine<D::Session>> {
    MeasurementEngine::new(decoder.load(bytes)?)
}

/// Read an image file and load it into `decoder`.
pub fn load_path<D: ThermalDecoder>(
    decoder: &D,
    path: &Path,
) -> Result<MeasurementEngine<D::Session>> {
    load(decoder, read_source(path)?)
}

pub(crate) fn read_source(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    Ok(std::fs::read(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Fills the output with the sum of the parameters, and
    /// the pixel index in the first column.
    struct Affine {
        params: Option<MeasurementParams>,
        fail: bool,
    }

    impl ThermalSession for Affine {
        fn set_measurement_params(&mut self, params: &MeasurementParams) -> Result<()> {
            self.params = Some(*params);
            Ok(())
        }

        fn measure_into(&mut self, out: &mut [f32]) -> Result<()> {
            if self.fail {
                return Err(Error::Decode("synthetic failure".into()));
            }
            let p = self.params.ok_or_else(|| Error::Decode("no params".into()))?;
            let base = p.distance + p.humidity + p.emissivity + p.reflection;
            for (i, v) in out.iter_mut().enumerate() {
                *v = base + i as f32;
            }
            Ok(())
        }

        fn resolution(&self) -> Result<(usize, usize)> {
            Ok((2, 3))
        }
    }

    #[test]
    fn grids_are_independent() -> Result<()> {
        let mut engine = MeasurementEngine::new(Affine {
            params: None,
            fail: false,
        })?;
        assert_eq!(engine.shape(), (2, 3));

        let first = engine.measure(MeasurementParams::new(1., 2., 3., 4.))?;
        let second = engine.measure(MeasurementParams::new(10., 20., 30., 40.))?;

        assert_eq!(first.dim(), (2, 3));
        assert_eq!(first[(0, 0)], 10.);
        assert_eq!(first[(1, 2)], 15.);
        assert_eq!(second[(0, 0)], 100.);
        Ok(())
    }

    #[test]
    fn decode_failure_is_surfaced() -> Result<()> {
        let mut engine = MeasurementEngine::new(Affine {
            params: None,
            fail: true,
        })?;
        assert!(matches!(
            engine.measure(MeasurementParams::default()),
            Err(Error::Decode(_))
        ));
        Ok(())
    }

    #[test]
    fn default_shape() {
        struct Fixed;
        impl ThermalSession for Fixed {
            fn set_measurement_params(&mut self, _: &MeasurementParams) -> Result<()> {
                Ok(())
            }
            fn measure_into(&mut self, out: &mut [f32]) -> Result<()> {
                assert_eq!(out.len(), 512 * 640);
                Ok(())
            }
        }
        let engine = MeasurementEngine::new(Fixed).unwrap();
        assert_eq!(engine.shape(), GRID_SHAPE);
    }

    #[test]
    fn missing_source() {
        let path = Path::new("/nonexistent/image.jpg");
        assert!(matches!(read_source(path), Err(Error::FileNotFound(p)) if p == path));
    }
}
