use std::time::{Duration, Instant};

use log::{debug, trace};
use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Bounds, Minimizer, Minimum};
use crate::config::SwarmConfig;
use crate::error::{CalibrationError, Result};

// Constriction coefficients (Clerc & Kennedy)
const INERTIA: f64 = 0.7298;
const COGNITIVE: f64 = 1.49618;
const SOCIAL: f64 = 1.49618;

/// Global-best particle swarm over a bounded box
///
/// Particle 0 starts at the initial guess, the rest uniformly in the box,
/// so the result is never worse than the seed.
pub struct ParticleSwarm {
    particles: usize,
    max_iterations: usize,
    stall_iterations: usize,
    tolerance: f64,
    rng: StdRng,
}

impl ParticleSwarm {
    pub fn new(config: &SwarmConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            particles: config.particles.max(2),
            max_iterations: config.max_iterations.max(1),
            stall_iterations: config.stall_iterations.max(1),
            tolerance: config.tolerance,
            rng,
        }
    }

    /// Swarm with default settings and a fixed seed
    pub fn seeded(seed: u64) -> Self {
        Self::new(&SwarmConfig {
            seed: Some(seed),
            ..SwarmConfig::default()
        })
    }

    fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.rng.random::<f64>()
    }
}

impl Default for ParticleSwarm {
    fn default() -> Self {
        Self::new(&SwarmConfig::default())
    }
}

fn evaluate(objective: &dyn Fn(&[f64]) -> f64, x: &DVector<f64>) -> f64 {
    let cost = objective(x.as_slice());
    if cost.is_nan() {
        f64::INFINITY
    } else {
        cost
    }
}

impl Minimizer for ParticleSwarm {
    fn minimize(
        &mut self,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &Bounds,
        x0: &[f64],
        time_limit: Option<Duration>,
    ) -> Result<Minimum> {
        let dim = bounds.dim();
        if x0.len() != dim {
            return Err(CalibrationError::InvalidBounds(format!(
                "initial guess has {} entries, bounds have {}",
                x0.len(),
                dim
            )));
        }
        if x0.iter().any(|v| !v.is_finite()) {
            return Err(CalibrationError::InvalidBounds(
                "initial guess is not finite".to_string(),
            ));
        }

        let start = Instant::now();

        // Initialize swarm
        let mut positions: Vec<DVector<f64>> = Vec::with_capacity(self.particles);
        positions.push(bounds.clamp(&DVector::from_column_slice(x0)));
        for _ in 1..self.particles {
            let p = DVector::from_iterator(
                dim,
                (0..dim).map(|i| self.uniform(bounds.lower()[i], bounds.upper()[i])),
            );
            positions.push(p);
        }

        let mut velocities: Vec<DVector<f64>> = Vec::with_capacity(self.particles);
        for x in &positions {
            let v = DVector::from_iterator(
                dim,
                (0..dim).map(|i| {
                    let target = self.uniform(bounds.lower()[i], bounds.upper()[i]);
                    0.5 * (target - x[i])
                }),
            );
            velocities.push(v);
        }

        let mut best_positions = positions.clone();
        let mut best_costs: Vec<f64> = positions.iter().map(|x| evaluate(objective, x)).collect();

        let mut global = 0;
        for (i, cost) in best_costs.iter().enumerate() {
            if *cost < best_costs[global] {
                global = i;
            }
        }
        let mut global_position = best_positions[global].clone();
        let mut global_cost = best_costs[global];

        let mut iterations = 0;
        let mut stall = 0;
        let mut converged = false;

        while iterations < self.max_iterations {
            if let Some(limit) = time_limit {
                if start.elapsed() >= limit {
                    break;
                }
            }
            iterations += 1;
            let previous_best = global_cost;

            for p in 0..self.particles {
                for i in 0..dim {
                    let r1 = self.rng.random::<f64>();
                    let r2 = self.rng.random::<f64>();
                    let x = positions[p][i];
                    let max_speed = bounds.width(i);

                    let v = INERTIA * velocities[p][i]
                        + COGNITIVE * r1 * (best_positions[p][i] - x)
                        + SOCIAL * r2 * (global_position[i] - x);
                    let v = v.clamp(-max_speed, max_speed);

                    let next = x + v;
                    let clamped = next.clamp(bounds.lower()[i], bounds.upper()[i]);
                    // Particles that hit a wall stop along that axis
                    velocities[p][i] = if clamped == next { v } else { 0.0 };
                    positions[p][i] = clamped;
                }

                let cost = evaluate(objective, &positions[p]);
                if cost < best_costs[p] {
                    best_costs[p] = cost;
                    best_positions[p].copy_from(&positions[p]);
                    if cost < global_cost {
                        global_cost = cost;
                        global_position.copy_from(&positions[p]);
                    }
                }
            }

            if previous_best - global_cost > self.tolerance {
                stall = 0;
            } else {
                stall += 1;
                if stall >= self.stall_iterations {
                    converged = true;
                    break;
                }
            }
        }

        trace!(
            "swarm finished after {} iterations in {:?}",
            iterations,
            start.elapsed()
        );
        debug!(
            "swarm minimum cost={:.3e} iterations={} converged={}",
            global_cost, iterations, converged
        );

        Ok(Minimum {
            x: global_position,
            cost: global_cost,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 0.3) * (v - 0.3)).sum()
    }

    #[test]
    fn test_finds_shifted_sphere_minimum() {
        let mut swarm = ParticleSwarm::seeded(1);
        let bounds = Bounds::new(&[-1.0; 4], &[1.0; 4]).unwrap();
        let result = swarm
            .minimize(&sphere, &bounds, &[0.0; 4], None)
            .unwrap();

        assert!(result.converged);
        assert!(result.cost < 1e-8);
        for v in result.x.iter() {
            assert_abs_diff_eq!(*v, 0.3, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_respects_bounds() {
        let mut swarm = ParticleSwarm::seeded(2);
        let bounds = Bounds::new(&[0.5, 0.5], &[1.0, 1.0]).unwrap();
        let result = swarm
            .minimize(&sphere, &bounds, &[0.8, 0.8], None)
            .unwrap();

        assert!(bounds.contains(&result.x));
        assert_abs_diff_eq!(result.x[0], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(result.x[1], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn test_never_worse_than_seed() {
        let mut swarm = ParticleSwarm::seeded(3);
        let bounds = Bounds::new(&[-1.0; 3], &[1.0; 3]).unwrap();
        let seed = [0.3, 0.3, 0.3];
        let result = swarm
            .minimize(&sphere, &bounds, &seed, Some(Duration::ZERO))
            .unwrap();

        // Zero budget: only the initial population is evaluated
        assert_eq!(result.iterations, 0);
        assert!(!result.converged);
        assert!(result.cost <= sphere(&seed));
    }

    #[test]
    fn test_rejects_mismatched_initial_guess() {
        let mut swarm = ParticleSwarm::seeded(4);
        let bounds = Bounds::new(&[-1.0; 3], &[1.0; 3]).unwrap();
        let err = swarm
            .minimize(&sphere, &bounds, &[0.0; 2], None)
            .unwrap_err();
        assert!(matches!(err, CalibrationError::InvalidBounds(_)));
    }
}
