//! Accelerometer offset, scale and mounting-rotation calibration from a
//! live sample stream.
//!
//! A stationary accelerometer reads 1 g whatever its orientation. Each
//! channel collects distinct stationary orientations, fits offset and
//! scale so they land on the unit sphere, and channels mounted on the same
//! rigid body are rotated into agreement with each other.

pub mod calibration;
pub mod config;
pub mod error;
pub mod optim;
pub mod stability;
pub mod types;
pub mod update;

pub use calibration::{Calibration, CalibrationSummary, FitKind, FitReport};
pub use config::{CalibrationConfig, SwarmConfig};
pub use error::{CalibrationError, Result};
pub use optim::{Bounds, Minimizer, Minimum, ParticleSwarm};
pub use stability::StabilityWindow;
pub use update::{update, update_single};
