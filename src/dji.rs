//! DJI thermal SDK backed decoder.
//!
//! Wraps the `dirp` API of the DJI Thermal SDK through
//! [`dji_thermal_sys`]. The SDK library must be linkable at
//! build time and loadable at run time.
use std::{
    ffi::CString,
    mem::{size_of, MaybeUninit},
};

use dji_thermal_sys::*;
use tracing::debug;

use crate::{
    error::{Error, Result},
    measure::{MeasurementParams, ThermalDecoder, ThermalSession},
};

/// Application key registered with the SDK.
pub const DEFAULT_APP_KEY: &str = "DJI_TSDK";

/// SDK log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    None = 0,
    Debug = 1,
    Detail = 2,
}

#[derive(Debug)]
pub struct DjiDecoder {
    _private: (),
}

impl DjiDecoder {
    /// Register `app_key` with the SDK and set its verbosity.
    pub fn new(app_key: &str, verbosity: Verbosity) -> Result<Self> {
        let key = CString::new(app_key).map_err(|e| Error::Load(e.to_string()))?;
        let ret = unsafe { dirp_register_app(key.as_ptr() as _) };
        if ret != 0 {
            return Err(Error::Load(format!("could not register app (code {})", ret)));
        }

        let ret = unsafe { dirp_set_verbose_level(verbosity as _) };
        if ret != 0 {
            return Err(Error::Load(format!("could not set verbosity (code {})", ret)));
        }
        debug!(?verbosity, "registered with DJI thermal SDK");
        Ok(DjiDecoder { _private: () })
    }
}

impl ThermalDecoder for DjiDecoder {
    type Session = RJpeg;

    fn load(&self, bytes: Vec<u8>) -> Result<RJpeg> {
        RJpeg::try_from_bytes(bytes)
    }
}

/// An R-JPEG loaded into the SDK.
#[derive(Debug)]
pub struct RJpeg {
    handle: DIRP_HANDLE,
    // The SDK reads from this buffer for the lifetime of the handle.
    _data: Vec<u8>,
}

unsafe impl Send for RJpeg {}

impl RJpeg {
    pub fn try_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let size = bytes.len() as i32;
        let mut handle = MaybeUninit::uninit();
        let ret = unsafe { dirp_create_from_rjpeg(bytes.as_ptr(), size, handle.as_mut_ptr()) };
        if ret != 0 {
            return Err(Error::Load(format!("could not parse rjpeg (code {})", ret)));
        }

        Ok(RJpeg {
            handle: unsafe { handle.assume_init() },
            _data: bytes,
        })
    }

    /// Parameters stored in the image itself.
    pub fn measurement_params(&self) -> Result<MeasurementParams> {
        let mut params = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_measurement_params(self.handle, params.as_mut_ptr()) };
        if ret != 0 {
            return Err(Error::Decode(format!(
                "could not read measurement params (code {})",
                ret
            )));
        }

        let params: dirp_measurement_params_t = unsafe { params.assume_init() };
        Ok(MeasurementParams::new(
            params.distance,
            params.humidity,
            params.emissivity,
            params.reflection,
        ))
    }
}

impl ThermalSession for RJpeg {
    fn set_measurement_params(&mut self, params: &MeasurementParams) -> Result<()> {
        let c_params = dirp_measurement_params_t {
            distance: params.distance,
            humidity: params.humidity,
            emissivity: params.emissivity,
            reflection: params.reflection,
        };
        let ret = unsafe { dirp_set_measurement_params(self.handle, &c_params as *const _ as _) };
        if ret != 0 {
            return Err(Error::Decode(format!(
                "could not set measurement params {:?} (code {})",
                params, ret
            )));
        }
        Ok(())
    }

    fn measure_into(&mut self, out: &mut [f32]) -> Result<()> {
        let ret = unsafe {
            dirp_measure_ex(
                self.handle,
                out.as_mut_ptr(),
                (out.len() * size_of::<f32>()) as i32,
            )
        };
        if ret != 0 {
            return Err(Error::Decode(format!(
                "could not calculate rjpeg temperatures (code {})",
                ret
            )));
        }
        Ok(())
    }

    fn resolution(&self) -> Result<(usize, usize)> {
        let mut resolution = MaybeUninit::uninit();
        let ret = unsafe { dirp_get_rjpeg_resolution(self.handle, resolution.as_mut_ptr()) };
        if ret != 0 {
            return Err(Error::Load(format!(
                "could not read rjpeg dimensions (code {})",
                ret
            )));
        }

        let resolution = unsafe { resolution.assume_init() };
        Ok((resolution.height as usize, resolution.width as usize))
    }
}

impl Drop for RJpeg {
    fn drop(&mut self) {
        unsafe {
            dirp_destroy(self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{Context, Result};
    use glob::{glob_with, MatchOptions};

    use std::{env, path::Path};

    use super::{DjiDecoder, Verbosity, DEFAULT_APP_KEY};
    use crate::{
        measure::load_path,
        sweep::{self, CancelToken},
    };

    #[test]
    fn sweep_samples() -> Result<()> {
        let base = env::var("DJI_SAMPLES").context("env `DJI_SAMPLES`")?;
        let decoder = DjiDecoder::new(DEFAULT_APP_KEY, Verbosity::None)?;

        let mut opts = MatchOptions::new();
        opts.case_sensitive = false;
        eprintln!("Sweeping {base}/**/*.jpg");
        for path in glob_with(&format!("{base}/**/*.jpg"), opts)? {
            let path = path?;
            eprintln!("Reading {path}...", path = path.display());
            sweep_at_path(&decoder, &path)?;
        }
        Ok(())
    }

    fn sweep_at_path(decoder: &DjiDecoder, path: &Path) -> Result<()> {
        let mut engine = load_path(decoder, path).context("dji rjpeg loading failed")?;
        eprintln!("\tparams: {:?}", engine.session().measurement_params()?);

        let config = sweep::setup(vec![10.], vec![50.], vec![0.9, 0.95], vec![20.]);
        let result = sweep::run(&mut engine, &config, &CancelToken::new())?;
        assert_eq!(result.shape(), [1, 1, 2, 1]);
        for grid in result.leaves() {
            assert_eq!(grid.dim(), engine.shape());
        }
        Ok(())
    }
}
