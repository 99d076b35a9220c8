//! Per-channel accelerometer calibration
//!
//! A `Calibration` owns one channel's stability window, its accepted point
//! cloud and the fitted parameters. Corrected samples are
//! `R(θ) · ((raw .* scale) − offset)`.

pub mod offset_scale;
pub mod rotation;

pub use offset_scale::sphere_residual;
pub use rotation::{align_rotations, align_rotations_within};

use std::fmt;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::CalibrationConfig;
use crate::error::Result;
use crate::optim::{Minimizer, ParticleSwarm};
use crate::stability::StabilityWindow;
use crate::types::{rotation_from_euler, EulerAngles, Mat3, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitKind {
    OffsetScale,
    Rotation,
}

/// Outcome of one fit, handed to the channel's callback
#[derive(Clone, Debug, Serialize)]
pub struct FitReport {
    pub kind: FitKind,
    /// Final objective value
    pub cost: f64,
    pub iterations: usize,
    /// False when the time budget ended the fit
    pub converged: bool,
}

/// Snapshot of a channel's parameters for observers
#[derive(Clone, Debug, Serialize)]
pub struct CalibrationSummary {
    pub offset: [f64; 3],
    pub scale: [f64; 3],
    /// Roll, pitch, yaw in degrees
    pub rotation_deg: [f64; 3],
    pub points: usize,
    pub residual: f64,
}

pub type FitCallback = Box<dyn FnMut(&FitReport)>;

pub struct Calibration {
    window: StabilityWindow,
    points: Vec<Vec3>,
    offset: Vec3,
    scale: Vec3,
    rotation: EulerAngles,
    time_limit: Option<Duration>,
    callback: FitCallback,
    minimizer: Box<dyn Minimizer>,
}

impl Calibration {
    /// Calibration with default thresholds and a 0.1 s solver budget
    pub fn new() -> Self {
        Self::from_config(&CalibrationConfig::default())
    }

    pub fn from_config(config: &CalibrationConfig) -> Self {
        Self {
            window: StabilityWindow::new(config.window_size, config.stable_th, config.cal_th),
            points: Vec::new(),
            offset: Vec3::zeros(),
            scale: Vec3::repeat(1.0),
            rotation: EulerAngles::zeros(),
            time_limit: config.time_budget(),
            callback: Box::new(|_| {}),
            minimizer: Box::new(ParticleSwarm::new(&config.swarm)),
        }
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&FitReport) + 'static,
    {
        self.callback = Box::new(callback);
        self
    }

    /// Replace the default particle swarm with another minimizer
    pub fn with_minimizer<M>(mut self, minimizer: M) -> Self
    where
        M: Minimizer + 'static,
    {
        self.minimizer = Box::new(minimizer);
        self
    }

    pub fn set_callback<F>(&mut self, callback: F)
    where
        F: FnMut(&FitReport) + 'static,
    {
        self.callback = Box::new(callback);
    }

    /// `None` lets every fit run to convergence
    pub fn set_time_limit(&mut self, time_limit: Option<Duration>) {
        self.time_limit = time_limit;
    }

    /// Append a calibration point; from the third point on, refit offset and scale.
    pub fn add_point(&mut self, point: Vec3) -> Result<()> {
        self.push_point(point);
        self.fit_if_enough_points()
    }

    pub(crate) fn push_point(&mut self, point: Vec3) {
        self.points.push(point);
        debug!(
            "calibration point {} accepted: [{:.4}, {:.4}, {:.4}]",
            self.points.len(),
            point[0],
            point[1],
            point[2]
        );
    }

    pub(crate) fn fit_if_enough_points(&mut self) -> Result<()> {
        if self.points.len() > 2 {
            self.fit_offset_scale()?;
        }
        Ok(())
    }

    /// Offset/scale fit with the channel's own time limit
    pub fn fit_offset_scale(&mut self) -> Result<FitReport> {
        let time_limit = self.time_limit;
        offset_scale::fit(self, time_limit)
    }

    /// Offset/scale fit with an explicit budget, e.g. `None` to polish the
    /// result once enough points have been collected.
    pub fn refit(&mut self, time_limit: Option<Duration>) -> Result<FitReport> {
        offset_scale::fit(self, time_limit)
    }

    pub fn apply(&self, raw: &Vec3) -> Vec3 {
        self.rotation() * (raw.component_mul(&self.scale) - self.offset)
    }

    /// Offset/scale correction without the rotation
    pub fn correct_unrotated(&self, raw: &Vec3) -> Vec3 {
        raw.component_mul(&self.scale) - self.offset
    }

    /// Clears the window and point cloud and restores offset and scale.
    /// Rotation and callback are kept; they describe the mounting and the
    /// observer rather than a calibration session.
    ///
    /// The window is cleared on purpose so a pose held across the reset is
    /// not re-accepted from stale samples.
    pub fn reset(&mut self) {
        self.window.clear();
        self.points.clear();
        self.offset = Vec3::zeros();
        self.scale = Vec3::repeat(1.0);
    }

    /// Σ(1 − ‖apply(p)‖)² over the point cloud
    pub fn residual_error(&self) -> f64 {
        self.points
            .iter()
            .map(|p| {
                let r = 1.0 - self.apply(p).norm();
                r * r
            })
            .sum()
    }

    pub fn offset(&self) -> Vec3 {
        self.offset
    }

    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    pub fn rotation(&self) -> Mat3 {
        rotation_from_euler(&self.rotation)
    }

    pub fn rotation_angles(&self) -> EulerAngles {
        self.rotation
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    pub fn window(&self) -> &StabilityWindow {
        &self.window
    }

    pub fn summary(&self) -> CalibrationSummary {
        CalibrationSummary {
            offset: self.offset.into(),
            scale: self.scale.into(),
            rotation_deg: self.rotation.map(f64::to_degrees).into(),
            points: self.points.len(),
            residual: self.residual_error(),
        }
    }

    pub(crate) fn window_mut(&mut self) -> &mut StabilityWindow {
        &mut self.window
    }

    fn notify(&mut self, report: &FitReport) {
        (self.callback)(report);
    }
}

impl Default for Calibration {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Calibration")
            .field("points", &self.points.len())
            .field("offset", &self.offset)
            .field("scale", &self.scale)
            .field("rotation", &self.rotation)
            .field("time_limit", &self.time_limit)
            .finish_non_exhaustive()
    }
}
