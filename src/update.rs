//! One step of the calibration pipeline per synchronized sample tuple.
//!
//! A new calibration point is only taken when every channel of the group is
//! stable and novel at the same instant, so the point clouds stay
//! index-aligned for the rotation fit.

use log::trace;

use crate::calibration::{align_rotations, rotation::aligned_len, Calibration};
use crate::error::{CalibrationError, Result};
use crate::types::Vec3;

/// Feed one sample per channel. Returns true when a calibration point was
/// appended to every channel (and the fits ran).
pub fn update(group: &mut [Calibration], samples: &[Vec3]) -> Result<bool> {
    if group.is_empty() {
        return Err(CalibrationError::EmptyGroup);
    }
    if group.len() != samples.len() {
        return Err(CalibrationError::GroupSize {
            channels: group.len(),
            samples: samples.len(),
        });
    }
    if let Some(channel) = samples
        .iter()
        .position(|s| s.iter().any(|v| !v.is_finite()))
    {
        return Err(CalibrationError::NonFiniteSample { channel });
    }
    aligned_len(group)?;

    for (calibration, sample) in group.iter_mut().zip(samples.iter()) {
        calibration.window_mut().push(*sample);
    }

    let mut means = Vec::with_capacity(group.len());
    for (channel, calibration) in group.iter().enumerate() {
        let window = calibration.window();
        if !window.is_stable_and_novel(calibration.points()) {
            trace!("channel {} not stable and novel", channel);
            return Ok(false);
        }
        match window.mean() {
            Some(mean) => means.push(mean),
            None => return Ok(false),
        }
    }

    // Every cloud grows before any fit runs, so a failing fit cannot leave
    // the group misaligned.
    for (calibration, mean) in group.iter_mut().zip(means) {
        calibration.push_point(mean);
    }
    for calibration in group.iter_mut() {
        calibration.fit_if_enough_points()?;
    }
    align_rotations(group)?;

    Ok(true)
}

/// Single-channel form of [`update`].
pub fn update_single(calibration: &mut Calibration, sample: Vec3) -> Result<bool> {
    update(std::slice::from_mut(calibration), &[sample])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{FitKind, FitReport};
    use crate::config::CalibrationConfig;
    use crate::optim::{Bounds, Minimizer, Minimum};
    use crate::types::{relative_angle, rotation_from_euler, EulerAngles};
    use approx::assert_abs_diff_eq;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    fn unbounded(seed: u64) -> Calibration {
        let mut config = CalibrationConfig::default();
        config.time_limit = f64::INFINITY;
        config.swarm.seed = Some(seed);
        Calibration::from_config(&config)
    }

    fn orientations() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, -1.0),
        ]
    }

    #[test]
    fn test_single_channel_end_to_end() {
        let true_offset = Vec3::new(0.05, -0.04, 0.03);
        let true_scale = Vec3::new(1.04, 0.97, 1.02);

        let kinds = Rc::new(RefCell::new(Vec::new()));
        let sink = kinds.clone();
        let mut cal =
            unbounded(21).with_callback(move |r: &FitReport| sink.borrow_mut().push(r.kind));

        let mut accepted = 0;
        for _repeat in 0..4 {
            for u in orientations() {
                let raw = (u + true_offset).component_div(&true_scale);
                for _ in 0..10 {
                    if update_single(&mut cal, raw).unwrap() {
                        accepted += 1;
                    }
                }
            }
        }

        assert_eq!(accepted, 5);
        assert_eq!(cal.point_count(), 5);
        assert!(cal.residual_error() < 0.02);

        let kinds = kinds.borrow();
        let offset_scale = kinds.iter().filter(|k| **k == FitKind::OffsetScale).count();
        let rotation = kinds.iter().filter(|k| **k == FitKind::Rotation).count();
        assert_eq!(offset_scale, 3);
        assert_eq!(rotation, 5);
    }

    #[test]
    fn test_two_channels_recover_mounting_rotation() {
        let mount = rotation_from_euler(&EulerAngles::new(0.0, 0.0, 10f64.to_radians()));
        let mut group = [unbounded(31), unbounded(32)];

        let mut poses = orientations();
        poses.push(Vec3::new(1.0, 1.0, 1.0).normalize());

        for u in &poses {
            let samples = [*u, mount * u];
            for _ in 0..10 {
                update(&mut group, &samples).unwrap();
            }
        }

        assert_eq!(group[0].point_count(), poses.len());
        assert_eq!(group[1].point_count(), poses.len());

        let angle = relative_angle(&group[0].rotation(), &group[1].rotation());
        assert_abs_diff_eq!(angle.to_degrees(), 10.0, epsilon = 1.0);

        // Corrected readings of both channels agree after alignment
        for u in &poses {
            let a = group[0].apply(u);
            let b = group[1].apply(&(mount * u));
            assert!((a - b).norm() < 0.02);
        }
    }

    #[test]
    fn test_all_channels_must_agree() {
        let calls = Rc::new(RefCell::new(0));
        let counter = calls.clone();
        let mut group = [
            unbounded(41).with_callback(move |_| *counter.borrow_mut() += 1),
            unbounded(42),
        ];

        for i in 0..30 {
            let wobble = if i % 2 == 0 { 0.5 } else { -0.5 };
            let samples = [Vec3::new(0.0, 0.0, 1.0), Vec3::new(wobble, 0.0, 1.0)];
            assert!(!update(&mut group, &samples).unwrap());
        }

        assert_eq!(group[0].point_count(), 0);
        assert_eq!(group[1].point_count(), 0);
        assert_eq!(*calls.borrow(), 0);
        // Only the window pushes happened
        assert!(group[0].window().is_full());
    }

    #[test]
    fn test_rejects_bad_input_before_mutation() {
        let mut group = [unbounded(51), unbounded(52)];

        let err = update(&mut group, &[Vec3::new(0.0, 0.0, 1.0)]).unwrap_err();
        assert_eq!(
            err,
            CalibrationError::GroupSize {
                channels: 2,
                samples: 1
            }
        );

        let samples = [Vec3::new(0.0, 0.0, 1.0), Vec3::new(f64::NAN, 0.0, 1.0)];
        let err = update(&mut group, &samples).unwrap_err();
        assert_eq!(err, CalibrationError::NonFiniteSample { channel: 1 });

        assert!(group[0].window().is_empty());
        assert!(group[1].window().is_empty());

        let mut empty: [Calibration; 0] = [];
        assert_eq!(
            update(&mut empty, &[]).unwrap_err(),
            CalibrationError::EmptyGroup
        );
    }

    struct FailingMinimizer;

    impl Minimizer for FailingMinimizer {
        fn minimize(
            &mut self,
            _objective: &dyn Fn(&[f64]) -> f64,
            _bounds: &Bounds,
            _x0: &[f64],
            _time_limit: Option<Duration>,
        ) -> Result<Minimum> {
            Err(CalibrationError::InvalidBounds("solver failure".to_string()))
        }
    }

    #[test]
    fn test_failed_fit_keeps_clouds_aligned() {
        let mut group = [
            unbounded(71).with_minimizer(FailingMinimizer),
            unbounded(72),
        ];

        let mut failures = 0;
        for u in orientations().iter().take(4) {
            for _ in 0..10 {
                match update(&mut group, &[*u, *u]) {
                    Ok(accepted) => assert!(!accepted),
                    Err(err) => {
                        assert_eq!(
                            err,
                            CalibrationError::InvalidBounds("solver failure".to_string())
                        );
                        failures += 1;
                    }
                }
                assert_eq!(group[0].point_count(), group[1].point_count());
            }
        }

        // Every pose still lands in both clouds despite the failing solver
        assert_eq!(failures, 4);
        assert_eq!(group[0].point_count(), 4);
        assert_eq!(group[1].point_count(), 4);
    }

    #[test]
    fn test_rejects_misaligned_clouds() {
        let mut group = [unbounded(61), unbounded(62)];
        group[0].add_point(Vec3::new(0.0, 0.0, 1.0)).unwrap();

        let samples = [Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)];
        let err = update(&mut group, &samples).unwrap_err();
        assert!(matches!(err, CalibrationError::MisalignedGroup { .. }));
        assert!(group[1].window().is_empty());
    }
}
