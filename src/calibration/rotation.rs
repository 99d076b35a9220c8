//! Rotation alignment across a channel group.
//!
//! Each channel's offset/scale-corrected points are rotated onto the
//! cross-channel mean of the same index. The search is a local correction:
//! every Euler angle may move at most π/16 from its current value per fit,
//! which keeps the solution near the mounting frame instead of jumping to a
//! symmetric alternative.

use std::f64::consts::PI;
use std::time::Duration;

use log::debug;

use super::{Calibration, FitKind, FitReport};
use crate::error::{CalibrationError, Result};
use crate::optim::Bounds;
use crate::types::{rotation_from_euler, EulerAngles, Vec3};

/// Maximum change of each Euler angle in a single alignment
pub const SEARCH_HALF_WIDTH: f64 = PI / 16.0;

/// Σ_i ‖target[i] − R(angles) · corrected[i]‖²
pub fn alignment_error(targets: &[Vec3], corrected: &[Vec3], angles: &EulerAngles) -> f64 {
    let r = rotation_from_euler(angles);
    targets
        .iter()
        .zip(corrected.iter())
        .map(|(t, c)| (t - r * c).norm_squared())
        .sum()
}

/// Index-aligned cloud length shared by every channel of the group
pub fn aligned_len(group: &[Calibration]) -> Result<usize> {
    let first = group.first().ok_or(CalibrationError::EmptyGroup)?;
    let expected = first.points.len();
    for (channel, calibration) in group.iter().enumerate().skip(1) {
        if calibration.points.len() != expected {
            return Err(CalibrationError::MisalignedGroup {
                channel,
                expected,
                actual: calibration.points.len(),
            });
        }
    }
    Ok(expected)
}

/// Per-index mean of the offset/scale-corrected (unrotated) points
pub fn alignment_targets(group: &[Calibration]) -> Result<Vec<Vec3>> {
    let n = aligned_len(group)?;
    if n == 0 {
        return Err(CalibrationError::NoPoints);
    }

    let mut targets = vec![Vec3::zeros(); n];
    for calibration in group {
        for (target, p) in targets.iter_mut().zip(calibration.points.iter()) {
            *target += calibration.correct_unrotated(p);
        }
    }
    let channels = group.len() as f64;
    for target in targets.iter_mut() {
        *target /= channels;
    }
    Ok(targets)
}

/// Align every channel of the group using each channel's own time limit.
pub fn align_rotations(group: &mut [Calibration]) -> Result<Vec<FitReport>> {
    align(group, |calibration| calibration.time_limit)
}

/// Align every channel of the group with one shared time limit
/// (`None` = run to convergence).
pub fn align_rotations_within(
    group: &mut [Calibration],
    time_limit: Option<Duration>,
) -> Result<Vec<FitReport>> {
    align(group, |_| time_limit)
}

fn align<F>(group: &mut [Calibration], budget: F) -> Result<Vec<FitReport>>
where
    F: Fn(&Calibration) -> Option<Duration>,
{
    let targets = alignment_targets(group)?;

    let mut reports = Vec::with_capacity(group.len());
    for (channel, calibration) in group.iter_mut().enumerate() {
        let corrected: Vec<Vec3> = calibration
            .points
            .iter()
            .map(|p| calibration.correct_unrotated(p))
            .collect();
        let objective = |x: &[f64]| {
            let angles = EulerAngles::new(x[0], x[1], x[2]);
            alignment_error(&targets, &corrected, &angles)
        };

        let current = calibration.rotation;
        let bounds = Bounds::around(current.as_slice(), SEARCH_HALF_WIDTH)?;
        let time_limit = budget(&*calibration);
        let minimum = calibration
            .minimizer
            .minimize(&objective, &bounds, current.as_slice(), time_limit)?;

        calibration.rotation = EulerAngles::new(minimum.x[0], minimum.x[1], minimum.x[2]);
        debug!(
            "channel {} rotation fit over {} points: rpy_deg=[{:.3}, {:.3}, {:.3}] cost={:.3e}",
            channel,
            targets.len(),
            calibration.rotation[0].to_degrees(),
            calibration.rotation[1].to_degrees(),
            calibration.rotation[2].to_degrees(),
            minimum.cost
        );

        let report = FitReport {
            kind: FitKind::Rotation,
            cost: minimum.cost,
            iterations: minimum.iterations,
            converged: minimum.converged,
        };
        calibration.notify(&report);
        reports.push(report);
    }

    Ok(reports)
}
