//! Speed profile shaping for a selected path
//!
//! Target speeds are capped by path curvature so lateral acceleration stays
//! near `profile_factor`, then smoothed with the same data/smooth gradient
//! scheme used for path smoothing.

use itertools::Itertools;

use crate::common::{Path, SpeedProfiler, Waypoint};

/// Upper bound on smoothing sweeps
pub const MAX_SMOOTHING_ITERATIONS: usize = 500;

/// Curvature below which a segment counts as straight [1/m]
const STRAIGHT_CURVATURE: f64 = 1e-4;

/// Default speed profiler: curvature-capped speeds plus gradient smoothing
#[derive(Debug, Clone, Copy, Default)]
pub struct CurvatureSpeedProfiler;

impl CurvatureSpeedProfiler {
    pub fn new() -> Self {
        CurvatureSpeedProfiler
    }
}

/// Curvature of the circle through three points, 0 when they are collinear
pub fn menger_curvature(a: &Waypoint, b: &Waypoint, c: &Waypoint) -> f64 {
    let ab = a.distance(b);
    let bc = b.distance(c);
    let ca = c.distance(a);
    let denom = ab * bc * ca;
    if denom < 1e-9 {
        return 0.0;
    }
    let cross = (b.pose.x - a.pose.x) * (c.pose.y - a.pose.y)
        - (b.pose.y - a.pose.y) * (c.pose.x - a.pose.x);
    2.0 * cross.abs() / denom
}

impl SpeedProfiler for CurvatureSpeedProfiler {
    fn generate_recommended_speed(&self, path: &mut Path, max_speed: f64, profile_factor: f64) {
        if path.is_empty() {
            return;
        }

        let curvatures: Vec<f64> = path
            .iter()
            .tuple_windows()
            .map(|(a, b, c)| menger_curvature(a, b, c))
            .collect();

        for (i, wp) in path.iter_mut().enumerate() {
            // endpoints borrow the curvature of their neighbouring triple
            let k = if curvatures.is_empty() {
                0.0
            } else {
                curvatures[i.saturating_sub(1).min(curvatures.len() - 1)]
            };
            wp.v = if k < STRAIGHT_CURVATURE {
                max_speed
            } else {
                max_speed.min((profile_factor / k).sqrt())
            };
        }
    }

    fn smooth_speed_profile(
        &self,
        path: &mut Path,
        data_weight: f64,
        smooth_weight: f64,
        tolerance: f64,
    ) {
        if path.len() < 3 {
            return;
        }

        let original: Vec<f64> = path.iter().map(|wp| wp.v).collect();
        let mut smoothed = original.clone();
        let mut change = tolerance;
        let mut iterations = 0;
        while change >= tolerance && iterations < MAX_SMOOTHING_ITERATIONS {
            change = 0.0;
            for i in 1..smoothed.len() - 1 {
                let before = smoothed[i];
                smoothed[i] += data_weight * (original[i] - smoothed[i])
                    + smooth_weight * (smoothed[i - 1] + smoothed[i + 1] - 2.0 * smoothed[i]);
                change += (before - smoothed[i]).abs();
            }
            iterations += 1;
        }

        for (wp, v) in path.iter_mut().zip(smoothed) {
            wp.v = v.max(0.0);
        }
    }
}
