//! Running summary statistics.
use std::ops::AddAssign;

use serde_derive::*;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl Default for Stats {
    fn default() -> Self {
        Stats {
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.,
        }
    }
}

impl Stats {
    /// Arithmetic mean, `NaN` if no values were added.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }
}

impl AddAssign<f64> for Stats {
    fn add_assign(&mut self, val: f64) {
        self.count += 1;
        self.min = self.min.min(val);
        self.max = self.max.max(val);
        self.sum += val;
    }
}

impl AddAssign<&Stats> for Stats {
    fn add_assign(&mut self, other: &Stats) {
        self.count += other.count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
    }
}

impl<'a> std::iter::FromIterator<&'a f32> for Stats {
    fn from_iter<I: IntoIterator<Item = &'a f32>>(iter: I) -> Self {
        let mut stats = Stats::default();
        for &val in iter {
            stats += val as f64;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate() {
        let mut a: Stats = [1.0f32, 3.0].iter().collect();
        let b: Stats = [-2.0f32].iter().collect();
        a += &b;
        assert_eq!(a.count, 3);
        assert_eq!(a.min, -2.);
        assert_eq!(a.max, 3.);
        assert!((a.mean() - 2. / 3.).abs() < 1e-12);
    }

    #[test]
    fn empty_mean_is_nan() {
        assert!(Stats::default().mean().is_nan());
    }
}
