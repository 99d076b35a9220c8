use std::collections::VecDeque;

use crate::types::Vec3;

/// Sliding window over recent raw samples of one channel
///
/// Decides whether the sensor has been held still in an orientation that
/// is not yet represented in the channel's point cloud.
#[derive(Clone, Debug)]
pub struct StabilityWindow {
    window: VecDeque<Vec3>,
    window_size: usize,
    stable_th: f64,
    cal_th: f64,
}

impl StabilityWindow {
    /// Create a window of `window_size` samples (typically 10)
    pub fn new(window_size: usize, stable_th: f64, cal_th: f64) -> Self {
        StabilityWindow {
            window: VecDeque::with_capacity(window_size),
            window_size,
            stable_th,
            cal_th,
        }
    }

    /// Store a sample, evicting the oldest one once full
    pub fn push(&mut self, sample: Vec3) {
        if self.window_size == 0 {
            return;
        }
        if self.window.len() == self.window_size {
            self.window.pop_front();
        }
        self.window.push_back(sample);
    }

    /// Arithmetic mean of the buffered samples, only once the window is full
    pub fn mean(&self) -> Option<Vec3> {
        if !self.is_full() {
            return None;
        }
        let sum = self.window.iter().fold(Vec3::zeros(), |acc, s| acc + s);
        Some(sum / self.window.len() as f64)
    }

    /// True when the window is full, motionless within `stable_th`, and its
    /// mean lies at least `cal_th` away from every existing point.
    pub fn is_stable_and_novel(&self, existing_points: &[Vec3]) -> bool {
        let Some(mean) = self.mean() else {
            return false;
        };

        let stable_sq = self.stable_th * self.stable_th;
        if self
            .window
            .iter()
            .any(|s| (s - mean).norm_squared() > stable_sq)
        {
            return false;
        }

        existing_points
            .iter()
            .all(|p| (p - mean).norm() >= self.cal_th)
    }

    pub fn is_full(&self) -> bool {
        self.window_size > 0 && self.window.len() == self.window_size
    }

    /// Current number of buffered samples (actual, not max)
    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.window_size
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
