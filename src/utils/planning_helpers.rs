//! Geometry and path helpers shared by the planner components

use ordered_float::OrderedFloat;
use std::f64::consts::PI;

use crate::common::Waypoint;

/// Normalize angle to [-PI, PI]
pub fn normalize_angle(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a < -PI {
        a += 2.0 * PI;
    }
    a
}

/// Map an angle into [0, 2PI)
pub fn fix_negative_angle(angle: f64) -> f64 {
    let a = angle.sin().atan2(angle.cos());
    if a < 0.0 {
        // -0.0 and tiny negatives can round up to exactly 2PI
        let fixed = a + 2.0 * PI;
        if fixed >= 2.0 * PI {
            0.0
        } else {
            fixed
        }
    } else {
        a
    }
}

/// Absolute difference between two headings, in [0, PI]
pub fn angle_between_two_angles_positive(a1: f64, a2: f64) -> f64 {
    normalize_angle(a1 - a2).abs()
}

/// How strongly the vehicle's momentum resists steering, in [0, 0.9]
pub fn momentum_scale_factor(speed: f64) -> f64 {
    let v = speed.abs();
    if v < 0.3 {
        0.0
    } else if v < 6.4 {
        0.3
    } else if v < 20.0 {
        0.3 + 0.6 * (v - 6.4) / (20.0 - 6.4)
    } else {
        0.9
    }
}

/// Index of the path waypoint nearest to `pose`; 0 for an empty path
pub fn closest_point_index(path: &[Waypoint], pose: &Waypoint) -> usize {
    path.iter()
        .enumerate()
        .min_by_key(|(_, wp)| OrderedFloat(wp.distance(pose)))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Slowest target velocity within `distance` ahead of `pose` on `path`
///
/// Returns 0 when the path ends before the look-ahead is covered, so the
/// vehicle slows toward the end of its tracked path.
pub fn velocity_ahead(path: &[Waypoint], pose: &Waypoint, distance: f64) -> f64 {
    if path.is_empty() {
        return 0.0;
    }

    let start = closest_point_index(path, pose);
    let mut travelled = 0.0;
    let mut min_v = f64::MAX;
    let mut previous = pose;
    for wp in &path[start..] {
        travelled += previous.distance(wp);
        min_v = min_v.min(wp.v);
        if travelled > distance {
            return min_v;
        }
        previous = wp;
    }
    0.0
}
