//! Measure an image under every combination of candidate
//! measurement parameters.
//!
//! A [`SweepConfig`] holds one ordered list of candidates per
//! parameter. The combinations are enumerated with distance
//! outermost and reflection innermost, each list in its
//! given order, and results are indexed the same way:
//! `result.values[d][h][e][r]`.
use std::{
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use itertools::iproduct;
use lazy_static::lazy_static;
use rayon::prelude::*;
use regex::Regex;
use serde_derive::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    error::{Error, Result},
    measure::{load, MeasurementEngine, MeasurementParams, TemperatureGrid, ThermalDecoder, ThermalSession},
};

/// Candidate values for each measurement parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub distances: Vec<f32>,
    pub humidities: Vec<f32>,
    pub emissivities: Vec<f32>,
    pub reflections: Vec<f32>,
}

/// Build a sweep over the given candidate lists.
pub fn setup(
    distances: Vec<f32>,
    humidities: Vec<f32>,
    emissivities: Vec<f32>,
    reflections: Vec<f32>,
) -> SweepConfig {
    SweepConfig {
        distances,
        humidities,
        emissivities,
        reflections,
    }
}

impl SweepConfig {
    /// Lengths of the candidate lists, in index order.
    pub fn shape(&self) -> [usize; 4] {
        [
            self.distances.len(),
            self.humidities.len(),
            self.emissivities.len(),
            self.reflections.len(),
        ]
    }

    /// Number of combinations.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every combination in sweep order.
    pub fn configurations(&self) -> Vec<MeasurementParams> {
        iproduct!(
            self.distances.iter(),
            self.humidities.iter(),
            self.emissivities.iter(),
            self.reflections.iter()
        )
        .map(|(&d, &h, &e, &r)| MeasurementParams::new(d, h, e, r))
        .collect()
    }

    fn ensure_configured(&self) -> Result<()> {
        let lists = [
            ("distance", &self.distances),
            ("humidity", &self.humidities),
            ("emissivity", &self.emissivities),
            ("reflection", &self.reflections),
        ];
        match lists.iter().find(|(_, l)| l.is_empty()) {
            Some((name, _)) => Err(Error::NotConfigured(*name)),
            None => Ok(()),
        }
    }
}

/// Nested `[distance][humidity][emissivity][reflection]`
/// sequence.
pub type Nested<T> = Vec<Vec<Vec<Vec<T>>>>;

/// One value per combination of a [`SweepConfig`].
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult<T> {
    pub config: SweepConfig,
    pub values: Nested<T>,
}

impl<T> SweepResult<T> {
    /// Nest values given in sweep order. `flat` must hold
    /// exactly `config.len()` items.
    fn from_flat(config: SweepConfig, flat: Vec<T>) -> Self {
        debug_assert_eq!(flat.len(), config.len());
        let [_, nh, ne, nr] = config.shape();
        let mut flat = flat.into_iter();

        let mut values = Vec::with_capacity(config.distances.len());
        for _ in &config.distances {
            let mut by_h = Vec::with_capacity(nh);
            for _ in 0..nh {
                let mut by_e = Vec::with_capacity(ne);
                for _ in 0..ne {
                    by_e.push(flat.by_ref().take(nr).collect());
                }
                by_h.push(by_e);
            }
            values.push(by_h);
        }
        SweepResult { config, values }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.config.shape()
    }

    pub fn len(&self) -> usize {
        self.config.len()
    }

    pub fn is_empty(&self) -> bool {
        self.config.is_empty()
    }

    pub fn get(&self, d: usize, h: usize, e: usize, r: usize) -> Option<&T> {
        self.values.get(d)?.get(h)?.get(e)?.get(r)
    }

    /// Values in sweep order.
    pub fn leaves(&self) -> impl Iterator<Item = &T> {
        self.values.iter().flatten().flatten().flatten()
    }

    /// `(params, value)` pairs in sweep order.
    pub fn iter(&self) -> impl Iterator<Item = (MeasurementParams, &T)> {
        self.config.configurations().into_iter().zip(self.leaves())
    }

    pub fn into_flat(self) -> Vec<T> {
        self.values
            .into_iter()
            .flatten()
            .flatten()
            .flatten()
            .collect()
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> SweepResult<U> {
        let flat = self.leaves().map(f).collect();
        SweepResult::from_flat(self.config.clone(), flat)
    }

    /// Fallible [`map`](Self::map) that runs on the rayon pool.
    pub fn try_par_map<U, F>(&self, f: F) -> Result<SweepResult<U>>
    where
        T: Sync,
        U: Send,
        F: Fn(&T) -> Result<U> + Sync + Send,
    {
        let leaves: Vec<&T> = self.leaves().collect();
        let flat = leaves
            .into_par_iter()
            .map(f)
            .collect::<Result<Vec<_>>>()?;
        Ok(SweepResult::from_flat(self.config.clone(), flat))
    }
}

/// Cooperative cancellation flag shared with a running sweep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A sweep that stopped early. Grids measured before the
/// failure are kept.
#[derive(Debug, Error)]
#[error("sweep stopped after {} measurement(s): {source}", .completed.len())]
pub struct SweepError {
    pub completed: Vec<(MeasurementParams, TemperatureGrid)>,
    pub source: Error,
}

impl From<Error> for SweepError {
    fn from(source: Error) -> Self {
        SweepError {
            completed: vec![],
            source,
        }
    }
}

pub type SweepOutcome = std::result::Result<SweepResult<TemperatureGrid>, SweepError>;

/// Measure every combination of `config` in sweep order.
pub fn run<S: ThermalSession>(
    engine: &mut MeasurementEngine<S>,
    config: &SweepConfig,
    cancel: &CancelToken,
) -> SweepOutcome {
    run_with_progress(engine, config, cancel, |_| {})
}

/// As [`run`], calling `progress` after every measurement.
pub fn run_with_progress<S, F>(
    engine: &mut MeasurementEngine<S>,
    config: &SweepConfig,
    cancel: &CancelToken,
    mut progress: F,
) -> SweepOutcome
where
    S: ThermalSession,
    F: FnMut(&MeasurementParams),
{
    config.ensure_configured()?;
    let configurations = config.configurations();
    info!(combinations = configurations.len(), "starting sweep");

    let mut completed = Vec::with_capacity(configurations.len());
    for params in configurations {
        let grid = cancel.check().and_then(|_| engine.measure(params));
        match grid {
            Ok(grid) => completed.push((params, grid)),
            Err(source) => return Err(SweepError { completed, source }),
        }
        progress(&params);
    }

    info!(combinations = completed.len(), "sweep complete");
    let grids = completed.into_iter().map(|(_, grid)| grid).collect();
    Ok(SweepResult::from_flat(config.clone(), grids))
}

/// Measure every combination of `config` on the rayon pool.
///
/// Each worker loads its own session from `bytes`, so the
/// decoder never sees concurrent calls on one session.
/// Results are still collected in sweep order.
pub fn run_par<D, F>(
    decoder: &D,
    bytes: &[u8],
    config: &SweepConfig,
    cancel: &CancelToken,
    progress: F,
) -> SweepOutcome
where
    D: ThermalDecoder + Sync,
    D::Session: Send,
    F: Fn(&MeasurementParams) + Sync + Send,
{
    config.ensure_configured()?;
    let configurations = config.configurations();
    info!(
        combinations = configurations.len(),
        threads = rayon::current_num_threads(),
        "starting parallel sweep"
    );

    let results: Vec<(MeasurementParams, Result<TemperatureGrid>)> = configurations
        .into_par_iter()
        .map_init(
            || {
                debug!("opening worker session");
                load(decoder, bytes.to_vec())
            },
            |engine, params| {
                let grid = cancel.check().and_then(|_| match engine {
                    Ok(engine) => engine.measure(params),
                    Err(Error::Load(msg)) => Err(Error::Load(msg.clone())),
                    Err(e) => Err(Error::Load(e.to_string())),
                });
                progress(&params);
                (params, grid)
            },
        )
        .collect();

    let mut completed = Vec::with_capacity(results.len());
    let mut failure = None;
    for (params, grid) in results {
        match grid {
            Ok(grid) => completed.push((params, grid)),
            Err(e) => {
                failure.get_or_insert(e);
            }
        }
    }
    if let Some(source) = failure {
        return Err(SweepError { completed, source });
    }

    info!(combinations = completed.len(), "sweep complete");
    let grids = completed.into_iter().map(|(_, grid)| grid).collect();
    Ok(SweepResult::from_flat(config.clone(), grids))
}

/// Candidate values parsed from text.
///
/// Accepts comma separated numbers and inclusive ranges
/// written `start:stop:step`, e.g. `10,20` or
/// `0.90:1.00:0.05` (`0.90, 0.95, 1.00`).
#[derive(Debug, Clone, PartialEq)]
pub struct Values(pub Vec<f32>);

/// Most values a single `start:stop:step` range may expand to.
pub const MAX_RANGE_LEN: usize = 1_000_000;

impl FromStr for Values {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        lazy_static! {
            static ref RANGE: Regex =
                Regex::new(r"^\s*([^:]+):([^:]+):([^:]+)\s*$").unwrap();
        }

        let mut out = vec![];
        for item in s.split(',').map(str::trim).filter(|i| !i.is_empty()) {
            match RANGE.captures(item) {
                Some(caps) => {
                    let start: f64 = caps[1].trim().parse()?;
                    let stop: f64 = caps[2].trim().parse()?;
                    let step: f64 = caps[3].trim().parse()?;
                    anyhow::ensure!(
                        start.is_finite() && stop.is_finite() && step.is_finite(),
                        "range bounds must be finite: {}",
                        item
                    );
                    anyhow::ensure!(step > 0., "range step must be positive: {}", item);
                    anyhow::ensure!(start <= stop, "range start exceeds stop: {}", item);

                    let count = ((stop - start) / step + 1e-6).floor();
                    anyhow::ensure!(
                        count < MAX_RANGE_LEN as f64,
                        "range has more than {} values: {}",
                        MAX_RANGE_LEN,
                        item
                    );
                    let count = count as usize;
                    out.extend((0..=count).map(|i| (start + i as f64 * step) as f32));
                }
                None => out.push(item.parse()?),
            }
        }
        Ok(Values(out))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every parameter set it measures, and fills
    /// grids with the parameter sum.
    #[derive(Default)]
    struct Recorder {
        current: Option<MeasurementParams>,
        log: Arc<Mutex<Vec<MeasurementParams>>>,
        fail_on: Option<f32>,
    }

    impl ThermalSession for Recorder {
        fn set_measurement_params(&mut self, params: &MeasurementParams) -> Result<()> {
            self.current = Some(*params);
            Ok(())
        }

        fn measure_into(&mut self, out: &mut [f32]) -> Result<()> {
            let p = self.current.ok_or_else(|| Error::Decode("no params".into()))?;
            if Some(p.emissivity) == self.fail_on {
                return Err(Error::Decode("rejected emissivity".into()));
            }
            self.log.lock().unwrap().push(p);
            let sum = p.distance + p.humidity + p.emissivity + p.reflection;
            out.iter_mut().for_each(|v| *v = sum);
            Ok(())
        }

        fn resolution(&self) -> Result<(usize, usize)> {
            Ok((4, 5))
        }
    }

    struct RecorderDecoder;
    impl ThermalDecoder for RecorderDecoder {
        type Session = Recorder;
        fn load(&self, _: Vec<u8>) -> Result<Recorder> {
            Ok(Recorder::default())
        }
    }

    fn engine(fail_on: Option<f32>) -> (MeasurementEngine<Recorder>, Arc<Mutex<Vec<MeasurementParams>>>) {
        let log = Arc::new(Mutex::new(vec![]));
        let session = Recorder {
            log: log.clone(),
            fail_on,
            ..Default::default()
        };
        (MeasurementEngine::new(session).unwrap(), log)
    }

    #[test]
    fn configurations_keep_list_order() {
        let config = setup(vec![2., 1.], vec![5.], vec![0.9, 0.8], vec![20., 10.]);
        let params: Vec<_> = config
            .configurations()
            .iter()
            .map(|p| (p.distance, p.emissivity, p.reflection))
            .collect();
        assert_eq!(
            params,
            vec![
                (2., 0.9, 20.),
                (2., 0.9, 10.),
                (2., 0.8, 20.),
                (2., 0.8, 10.),
                (1., 0.9, 20.),
                (1., 0.9, 10.),
                (1., 0.8, 20.),
                (1., 0.8, 10.),
            ]
        );
        assert_eq!(config.len(), 8);
    }

    #[test]
    fn run_nests_in_sweep_order() {
        let (mut engine, log) = engine(None);
        let config = setup(vec![1.], vec![2.], vec![3., 4.], vec![5.]);
        let result = run(&mut engine, &config, &CancelToken::new()).unwrap();

        assert_eq!(result.values.len(), 1);
        assert_eq!(result.values[0].len(), 1);
        assert_eq!(result.values[0][0].len(), 2);
        assert_eq!(result.values[0][0][0].len(), 1);
        assert_eq!(result.values[0][0][1].len(), 1);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                MeasurementParams::new(1., 2., 3., 5.),
                MeasurementParams::new(1., 2., 4., 5.),
            ]
        );
        assert_eq!(result.get(0, 0, 0, 0).unwrap()[(0, 0)], 11.);
        assert_eq!(result.get(0, 0, 1, 0).unwrap()[(3, 4)], 12.);
        assert!(result.get(0, 0, 2, 0).is_none());
    }

    #[test]
    fn empty_list_is_not_configured() {
        let (mut engine, log) = engine(None);
        let config = setup(vec![1.], vec![], vec![0.9], vec![20.]);
        let err = run(&mut engine, &config, &CancelToken::new()).unwrap_err();
        assert!(matches!(err.source, Error::NotConfigured("humidity")));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn failure_keeps_completed_grids() {
        let (mut engine, _) = engine(Some(0.8));
        let config = setup(vec![1., 2.], vec![50.], vec![0.9, 0.8], vec![20.]);
        let err = run(&mut engine, &config, &CancelToken::new()).unwrap_err();

        assert!(matches!(err.source, Error::Decode(_)));
        assert_eq!(err.completed.len(), 1);
        assert_eq!(err.completed[0].0, MeasurementParams::new(1., 50., 0.9, 20.));
    }

    #[test]
    fn cancellation_between_measurements() {
        let (mut engine, log) = engine(None);
        let config = setup(vec![1., 2., 3.], vec![50.], vec![0.9], vec![20.]);
        let cancel = CancelToken::new();
        let err = run_with_progress(&mut engine, &config, &cancel.clone(), |_| cancel.cancel())
            .unwrap_err();

        assert!(matches!(err.source, Error::Cancelled));
        assert_eq!(err.completed.len(), 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn parallel_matches_sequential() {
        let config = setup(vec![1., 2., 3.], vec![40., 60.], vec![0.9, 0.95], vec![10., 20., 30.]);
        let par = run_par(&RecorderDecoder, &[], &config, &CancelToken::new(), |_| {}).unwrap();

        let (mut engine, _) = engine(None);
        let seq = run(&mut engine, &config, &CancelToken::new()).unwrap();

        assert_eq!(par.shape(), [3, 2, 2, 3]);
        for (a, b) in par.leaves().zip(seq.leaves()) {
            assert_eq!(a, b);
        }
    }

    struct Unreadable;
    impl ThermalDecoder for Unreadable {
        type Session = Recorder;
        fn load(&self, _: Vec<u8>) -> Result<Recorder> {
            Err(Error::Load("bad header".into()))
        }
    }

    #[test]
    fn parallel_load_failure_keeps_message() {
        let config = setup(vec![1., 2.], vec![50.], vec![0.9], vec![20.]);
        let err = run_par(&Unreadable, &[], &config, &CancelToken::new(), |_| {}).unwrap_err();

        assert!(matches!(&err.source, Error::Load(msg) if msg == "bad header"));
        assert_eq!(err.source.to_string(), "could not load thermal image: bad header");
        assert!(err.completed.is_empty());
    }

    #[test]
    fn parallel_cancellation() {
        let config = setup(vec![1., 2., 3.], vec![50.], vec![0.9, 0.95], vec![20.]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_par(&RecorderDecoder, &[], &config, &cancel, |_| {}).unwrap_err();

        assert!(matches!(err.source, Error::Cancelled));
        assert!(err.completed.is_empty());
    }

    #[test]
    fn map_preserves_nesting() {
        let config = setup(vec![1., 2.], vec![3.], vec![4., 5., 6.], vec![7.]);
        let indices = SweepResult::from_flat(config.clone(), (0..6).collect::<Vec<i32>>());
        let doubled = indices.map(|v| v * 2);

        assert_eq!(doubled.values[1][0][2][0], 10);
        assert_eq!(doubled.into_flat(), vec![0, 2, 4, 6, 8, 10]);

        let pairs: Vec<_> = indices.iter().map(|(p, &v)| (p.distance, p.emissivity, v)).collect();
        assert_eq!(pairs[4], (2., 5., 4));
    }

    #[test]
    fn parse_values() -> anyhow::Result<()> {
        assert_eq!("10, 20,30".parse::<Values>()?, Values(vec![10., 20., 30.]));
        assert_eq!(
            "0.90:1.00:0.05".parse::<Values>()?.0.len(),
            3
        );
        assert_eq!("1:3:1,7".parse::<Values>()?, Values(vec![1., 2., 3., 7.]));
        assert!("1:0:1".parse::<Values>().is_err());
        assert!("1:2:0".parse::<Values>().is_err());
        assert!("abc".parse::<Values>().is_err());

        assert!("1:inf:1".parse::<Values>().is_err());
        assert!("nan:1:0.5".parse::<Values>().is_err());
        assert!("0:1:inf".parse::<Values>().is_err());
        assert!("0:1:1e-30".parse::<Values>().is_err());
        assert_eq!("0:999999:1".parse::<Values>()?.0.len(), MAX_RANGE_LEN);
        Ok(())
    }

    #[test]
    fn config_from_json() -> anyhow::Result<()> {
        let config: SweepConfig = serde_json::from_str(r#"{"distances":[5],"reflections":[20,25]}"#)?;
        assert_eq!(config.shape(), [1, 0, 0, 2]);
        Ok(())
    }
}
