//! Offset/scale fit: bring a channel's point cloud onto the unit sphere.
//!
//! Minimizes `Σ (1 − ‖(p .* s) − o‖)²` with `o ∈ [-1, 1]³` and
//! `s ∈ [0.9, 1.1]³`, seeded at the channel's current parameters.

use std::time::Duration;

use log::{debug, warn};

use super::{Calibration, FitKind, FitReport};
use crate::error::{CalibrationError, Result};
use crate::optim::Bounds;
use crate::types::{pack_offset_scale, unpack_offset_scale, Vec3};

pub const MIN_POINTS: usize = 3;
pub const OFFSET_LIMIT: f64 = 1.0;
pub const SCALE_MIN: f64 = 0.9;
pub const SCALE_MAX: f64 = 1.1;

/// Σ(1 − ‖(p .* scale) − offset‖)² over `points`
pub fn sphere_residual(points: &[Vec3], offset: &Vec3, scale: &Vec3) -> f64 {
    points
        .iter()
        .map(|p| {
            let r = 1.0 - (p.component_mul(scale) - offset).norm();
            r * r
        })
        .sum()
}

fn bounds() -> Result<Bounds> {
    Bounds::new(
        &[
            -OFFSET_LIMIT,
            -OFFSET_LIMIT,
            -OFFSET_LIMIT,
            SCALE_MIN,
            SCALE_MIN,
            SCALE_MIN,
        ],
        &[
            OFFSET_LIMIT,
            OFFSET_LIMIT,
            OFFSET_LIMIT,
            SCALE_MAX,
            SCALE_MAX,
            SCALE_MAX,
        ],
    )
}

pub(super) fn fit(calibration: &mut Calibration, time_limit: Option<Duration>) -> Result<FitReport> {
    let available = calibration.points.len();
    if available < MIN_POINTS {
        return Err(CalibrationError::InsufficientPoints {
            required: MIN_POINTS,
            available,
        });
    }

    let points = &calibration.points;
    let objective = |x: &[f64]| {
        let (offset, scale) = unpack_offset_scale(x);
        sphere_residual(points, &offset, &scale)
    };

    let bounds = bounds()?;
    let x0 = pack_offset_scale(&calibration.offset, &calibration.scale);
    let minimum = calibration
        .minimizer
        .minimize(&objective, &bounds, x0.as_slice(), time_limit)?;

    let (offset, scale) = unpack_offset_scale(minimum.x.as_slice());
    calibration.offset = offset;
    calibration.scale = scale;

    if time_limit.is_none() && !minimum.converged {
        warn!(
            "unbounded offset/scale fit hit the iteration cap after {} iterations",
            minimum.iterations
        );
    }
    debug!(
        "offset/scale fit over {} points: offset={:?} scale={:?} cost={:.3e}",
        available,
        offset.as_slice(),
        scale.as_slice(),
        minimum.cost
    );

    let report = FitReport {
        kind: FitKind::OffsetScale,
        cost: minimum.cost,
        iterations: minimum.iterations,
        converged: minimum.converged,
    };
    calibration.notify(&report);
    Ok(report)
}
