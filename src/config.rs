use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CalibrationError, Result};

/// Calibration configuration
///
/// Thresholds are in g, the time limit in seconds. `time_limit = inf`
/// lets every fit run to the minimizer's own convergence criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Stability radius: every window sample must stay this close to the window mean
    pub stable_th: f64,
    /// Minimum separation between two accepted calibration points
    pub cal_th: f64,
    /// Ring buffer depth of the stability window (samples)
    pub window_size: usize,
    /// Solver time budget per fit (seconds, `inf` = no limit)
    pub time_limit: f64,
    pub swarm: SwarmConfig,
}

/// Particle swarm settings for the default minimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub particles: usize,
    pub max_iterations: usize,
    /// Iterations without meaningful improvement before the swarm is considered converged
    pub stall_iterations: usize,
    /// Smallest improvement of the global best that resets the stall counter
    pub tolerance: f64,
    /// RNG seed; `None` seeds from the OS
    pub seed: Option<u64>,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            stable_th: 0.2,
            cal_th: 0.4,
            window_size: 10,
            time_limit: 0.1,
            swarm: SwarmConfig::default(),
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particles: 10,
            max_iterations: 5000,
            stall_iterations: 200,
            tolerance: 1e-12,
            seed: None,
        }
    }
}

impl CalibrationConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: CalibrationConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            CalibrationError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.stable_th > 0.0 && self.stable_th.is_finite()) {
            return Err(CalibrationError::Config(format!(
                "stable_th must be positive, got {}",
                self.stable_th
            )));
        }
        if !(self.cal_th > 0.0 && self.cal_th.is_finite()) {
            return Err(CalibrationError::Config(format!(
                "cal_th must be positive, got {}",
                self.cal_th
            )));
        }
        if self.window_size == 0 {
            return Err(CalibrationError::Config(
                "window_size must be at least 1".to_string(),
            ));
        }
        if self.time_limit.is_nan() || self.time_limit <= 0.0 {
            return Err(CalibrationError::Config(format!(
                "time_limit must be positive or inf, got {}",
                self.time_limit
            )));
        }
        if self.swarm.particles < 2 {
            return Err(CalibrationError::Config(format!(
                "swarm needs at least 2 particles, got {}",
                self.swarm.particles
            )));
        }
        if self.swarm.max_iterations == 0 || self.swarm.stall_iterations == 0 {
            return Err(CalibrationError::Config(
                "swarm iteration limits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Time budget as a `Duration`; `None` means unbounded. Limits too large
    /// for a `Duration` are treated as unbounded as well.
    pub fn time_budget(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.time_limit).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CalibrationConfig::default();
        assert_eq!(config.window_size, 10);
        assert_eq!(config.swarm.particles, 10);
        assert_eq!(config.time_budget(), Some(Duration::from_millis(100)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = CalibrationConfig::from_toml_str("cal_th = 0.5\n").unwrap();
        assert_eq!(config.cal_th, 0.5);
        assert_eq!(config.stable_th, 0.2);
        assert_eq!(config.window_size, 10);
    }

    #[test]
    fn test_infinite_time_limit() {
        let text = "time_limit = inf\n[swarm]\nseed = 7\n";
        let config = CalibrationConfig::from_toml_str(text).unwrap();
        assert_eq!(config.time_budget(), None);
        assert_eq!(config.swarm.seed, Some(7));
    }

    #[test]
    fn test_huge_time_limit_is_unbounded() {
        let mut config = CalibrationConfig::default();
        config.time_limit = 1e30;
        assert!(config.validate().is_ok());
        assert_eq!(config.time_budget(), None);

        let calibration = crate::Calibration::from_config(&config);
        assert_eq!(calibration.time_limit(), None);
    }

    #[test]
    fn test_rejects_zero_window() {
        let err = CalibrationConfig::from_toml_str("window_size = 0\n").unwrap_err();
        assert!(matches!(err, CalibrationError::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = CalibrationConfig::from_toml_str("stable_th = \"wide\"\n").unwrap_err();
        assert!(matches!(err, CalibrationError::Config(_)));
    }
}
