//! Obstacle trajectory prediction
//!
//! Projects every detected obstacle along the lanes around it, stamps the
//! projected waypoints with the time the obstacle needs to reach them, and
//! compares them with the time-stamped ego path. Ego waypoints that would be
//! occupied at about the same time get their target velocity lowered.
//!
//! This runs on demand only; the per-cycle planner step does not call it.

use log::debug;
use std::f64::consts::PI;

use crate::common::{DetectedObject, Path, RoadNetwork, VehicleInfo, Waypoint};
use crate::utils::{angle_between_two_angles_positive, closest_point_index};

/// How far ahead obstacles are projected [s]
pub const PREDICTION_HORIZON: f64 = 10.0;

/// Radius around an obstacle searched for lanes [m]
pub const OBSTACLE_LANE_SEARCH_RADIUS: f64 = 1.5;

/// Two waypoints reached within this many seconds of each other collide [s]
pub const COLLISION_TIME_WINDOW: f64 = 4.0;

/// Below this heading difference the obstacle moves along with the ego path
pub const SAME_DIRECTION_ANGLE: f64 = PI / 8.0;

/// Speeds and travelled distances at or below this yield no time estimate
const MIN_TIME_COST_INPUT: f64 = 0.1;

/// Outcome of a prediction pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollisionPrediction {
    pub collision_detected: bool,
    /// Projected paths of every obstacle, time-stamped
    pub predicted_paths: Vec<Path>,
}

/// Time to cover `distance` at `speed`, `None` when either is too small
fn time_to_cover(distance: f64, speed: f64) -> Option<f64> {
    if speed > MIN_TIME_COST_INPUT && distance > MIN_TIME_COST_INPUT {
        Some(distance / speed)
    } else {
        None
    }
}

/// Possible paths of an obstacle over `horizon` seconds
///
/// Paths of later lanes come first. A stationary obstacle has no paths.
pub fn predict_obstacle_trajectory<M>(map: &M, center: &Waypoint, horizon: f64) -> Vec<Path>
where
    M: RoadNetwork + ?Sized,
{
    let distance = horizon * center.v;
    if distance <= 0.0 {
        return Vec::new();
    }

    let mut paths: Vec<Path> = Vec::new();
    for lane in map.closest_lanes(center, OBSTACLE_LANE_SEARCH_RADIUS) {
        let lane_paths = map.predict_lane_paths(lane, center, distance);
        paths.splice(0..0, lane_paths);
    }

    for path in paths.iter_mut() {
        assign_obstacle_time_costs(path, center.v);
    }
    paths
}

/// Stamp an obstacle path with speed, heading and arrival time
pub fn assign_obstacle_time_costs(path: &mut [Waypoint], speed: f64) {
    let Some(first) = path.first_mut() else {
        return;
    };
    first.time_cost = 0.0;
    first.v = speed;

    let mut total_distance = 0.0;
    let mut time_cost = 0.0;
    for i in 1..path.len() {
        let (dx, dy) = (
            path[i].pose.x - path[i - 1].pose.x,
            path[i].pose.y - path[i - 1].pose.y,
        );
        total_distance += dx.hypot(dy);
        if let Some(t) = time_to_cover(total_distance, speed) {
            time_cost = t;
        }

        let wp = &mut path[i];
        wp.v = speed;
        wp.pose.yaw = dy.atan2(dx);
        wp.time_cost = time_cost;
    }
}

/// Stamp the ego path with arrival times from the waypoint closest to `pose`
///
/// Waypoints behind the vehicle keep a zero time cost. Collision marks are
/// cleared. Returns the arrival time at the end of the path.
pub fn assign_ego_time_costs(path: &mut [Waypoint], pose: &Waypoint, velocity: f64) -> f64 {
    if path.is_empty() {
        return 0.0;
    }
    for wp in path.iter_mut() {
        wp.time_cost = 0.0;
        wp.collision_cost = 0.0;
    }

    let start = closest_point_index(path, pose);
    let mut total_distance = 0.0;
    let mut time_cost = 0.0;
    for i in (start + 1)..path.len() {
        total_distance += path[i].distance(&path[i - 1]);
        if let Some(t) = time_to_cover(total_distance, velocity) {
            time_cost = t;
        }
        path[i].time_cost = time_cost;
    }
    time_cost
}

/// Mark ego and obstacle waypoints occupied at about the same time
///
/// For every predicted waypoint only the first matching ego waypoint is
/// marked, and each predicted path stops at its first collision. Returns
/// whether any collision was found.
pub fn calculate_intersection_velocities(
    ego_path: &mut [Waypoint],
    predicted: &mut [Path],
    obstacle: &DetectedObject,
    vehicle: &VehicleInfo,
) -> bool {
    let contact_distance = vehicle.half_width();
    let mut collision_detected = false;

    for path in predicted.iter_mut() {
        'predicted: for other in path.iter_mut() {
            for ego in ego_path.iter_mut().filter(|wp| wp.time_cost > 0.0) {
                let separation = ego.position().distance(&other.position());
                if separation <= contact_distance
                    && (ego.time_cost - other.time_cost).abs() < COLLISION_TIME_WINDOW
                {
                    ego.collision_cost = 1.0;
                    let heading_diff = angle_between_two_angles_positive(ego.pose.yaw, other.pose.yaw);
                    ego.v = if heading_diff < SAME_DIRECTION_ANGLE {
                        obstacle.center.v
                    } else {
                        0.0
                    };
                    other.collision_cost = 1.0;
                    collision_detected = true;
                    break 'predicted;
                }
            }
        }
    }
    collision_detected
}

/// Full prediction pass over all obstacles
pub fn calculate_obstacle_costs<M>(
    map: &M,
    ego_path: &mut Path,
    pose: &Waypoint,
    velocity: f64,
    obstacles: &[DetectedObject],
    vehicle: &VehicleInfo,
) -> CollisionPrediction
where
    M: RoadNetwork + ?Sized,
{
    let arrival = assign_ego_time_costs(ego_path, pose, velocity);
    let mut prediction = CollisionPrediction::default();

    for obstacle in obstacles {
        let mut paths = predict_obstacle_trajectory(map, &obstacle.center, PREDICTION_HORIZON);
        if calculate_intersection_velocities(ego_path, &mut paths, obstacle, vehicle) {
            debug!("predicted collision with obstacle {}", obstacle.id);
            prediction.collision_detected = true;
        }
        prediction.predicted_paths.extend(paths);
    }

    debug!(
        "predicted {} obstacle paths, ego arrival {:.1}s",
        prediction.predicted_paths.len(),
        arrival
    );
    prediction
}
