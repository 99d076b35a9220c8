//! Bounded derivative-free minimization
//!
//! The fitters only see the `Minimizer` trait: a scalar objective over a
//! box-bounded parameter vector, an initial guess and an optional time
//! budget. `ParticleSwarm` is the default implementation.

pub mod pso;

pub use pso::ParticleSwarm;

use std::time::Duration;

use nalgebra::DVector;

use crate::error::{CalibrationError, Result};

/// Axis-aligned box of admissible parameter values
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    lower: DVector<f64>,
    upper: DVector<f64>,
}

impl Bounds {
    pub fn new(lower: &[f64], upper: &[f64]) -> Result<Self> {
        if lower.len() != upper.len() {
            return Err(CalibrationError::InvalidBounds(format!(
                "lower has {} entries, upper has {}",
                lower.len(),
                upper.len()
            )));
        }
        if lower.is_empty() {
            return Err(CalibrationError::InvalidBounds(
                "bounds must have at least one dimension".to_string(),
            ));
        }
        for (i, (lo, hi)) in lower.iter().zip(upper.iter()).enumerate() {
            if !lo.is_finite() || !hi.is_finite() || lo > hi {
                return Err(CalibrationError::InvalidBounds(format!(
                    "dimension {i}: [{lo}, {hi}]"
                )));
            }
        }
        Ok(Self {
            lower: DVector::from_column_slice(lower),
            upper: DVector::from_column_slice(upper),
        })
    }

    /// Box of half-width `half_width` around `center` in every dimension
    pub fn around(center: &[f64], half_width: f64) -> Result<Self> {
        let lower: Vec<f64> = center.iter().map(|c| c - half_width).collect();
        let upper: Vec<f64> = center.iter().map(|c| c + half_width).collect();
        Self::new(&lower, &upper)
    }

    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &DVector<f64> {
        &self.lower
    }

    pub fn upper(&self) -> &DVector<f64> {
        &self.upper
    }

    pub fn width(&self, i: usize) -> f64 {
        self.upper[i] - self.lower[i]
    }

    pub fn clamp(&self, x: &DVector<f64>) -> DVector<f64> {
        DVector::from_fn(x.len(), |i, _| x[i].clamp(self.lower[i], self.upper[i]))
    }

    pub fn contains(&self, x: &DVector<f64>) -> bool {
        x.len() == self.dim()
            && x
                .iter()
                .enumerate()
                .all(|(i, v)| *v >= self.lower[i] && *v <= self.upper[i])
    }
}

/// Best parameters found by a minimizer run
#[derive(Clone, Debug)]
pub struct Minimum {
    pub x: DVector<f64>,
    pub cost: f64,
    pub iterations: usize,
    /// False when the time budget or the iteration cap ended the run
    pub converged: bool,
}

/// Minimize a scalar objective over a box, starting from `x0`.
///
/// `time_limit = None` runs to the implementation's own convergence
/// criterion. Running out of time is not an error; the best parameters
/// seen so far are returned.
pub trait Minimizer {
    fn minimize(
        &mut self,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &Bounds,
        x0: &[f64],
        time_limit: Option<Duration>,
    ) -> Result<Minimum>;
}
