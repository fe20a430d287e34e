//! Common types used throughout behavior_planner

use nalgebra::{Isometry2, Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Identifier of a lane in the road network
pub type LaneId = i32;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// 2D pose (position + heading)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self { x, y, yaw }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0, yaw: 0.0 }
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn distance(&self, other: &Pose2D) -> f64 {
        self.position().distance(&other.position())
    }

    /// Normalize yaw to [-pi, pi]
    pub fn normalize_yaw(&mut self) {
        while self.yaw > PI {
            self.yaw -= 2.0 * PI;
        }
        while self.yaw < -PI {
            self.yaw += 2.0 * PI;
        }
    }

    /// Yaw expressed in [0, 2pi)
    pub fn fixed_yaw(&self) -> f64 {
        crate::utils::fix_negative_angle(self.yaw)
    }

    /// Rigid transform from this pose's frame into the world frame
    pub fn to_isometry(&self) -> Isometry2<f64> {
        Isometry2::new(Vector2::new(self.x, self.y), self.yaw)
    }
}

/// A single point of a planned path
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Waypoint {
    pub pose: Pose2D,
    /// Target velocity at this point [m/s]
    pub v: f64,
    pub lane_id: Option<LaneId>,
    /// Estimated time to reach this point from the path start [s]
    pub time_cost: f64,
    /// Non-zero when a predicted collision touches this point
    pub collision_cost: f64,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, yaw: f64, v: f64) -> Self {
        Self {
            pose: Pose2D::new(x, y, yaw),
            v,
            ..Default::default()
        }
    }

    pub fn with_lane(mut self, lane_id: LaneId) -> Self {
        self.lane_id = Some(lane_id);
        self
    }

    pub fn position(&self) -> Point2D {
        self.pose.position()
    }

    pub fn distance(&self, other: &Waypoint) -> f64 {
        self.pose.distance(&other.pose)
    }
}

/// Ordered sequence of waypoints; one drivable alternative
pub type Path = Vec<Waypoint>;

/// Parallel lateral alternatives generated from one reference path
pub type RolloutSet = Vec<Path>;

/// Transmission position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Shift {
    Drive,
    Reverse,
    #[default]
    Neutral,
    Park,
}

impl Shift {
    /// Sign applied to longitudinal motion
    pub fn direction(&self) -> f64 {
        match self {
            Shift::Drive => 1.0,
            Shift::Reverse => -1.0,
            Shift::Neutral | Shift::Park => 0.0,
        }
    }
}

/// Actuation state of the ego vehicle
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VehicleState {
    /// Speed [m/s]
    pub speed: f64,
    /// Steering angle [rad]
    pub steer: f64,
    pub shift: Shift,
}

impl VehicleState {
    pub fn new(speed: f64, steer: f64, shift: Shift) -> Self {
        Self { speed, steer, shift }
    }

    pub fn stopped() -> Self {
        Self::new(0.0, 0.0, Shift::Drive)
    }
}

/// Static geometry and limits of the ego vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleInfo {
    /// Overall length [m]
    pub length: f64,
    /// Overall width [m]
    pub width: f64,
    /// Wheel base [m]
    pub wheel_base: f64,
    /// Maximum deceleration magnitude [m/s^2]
    pub max_deceleration: f64,
    /// Maximum forward speed [m/s]
    pub max_speed_forward: f64,
    /// Maximum steering angle [rad]
    pub max_steer_angle: f64,
}

impl Default for VehicleInfo {
    fn default() -> Self {
        Self {
            length: 4.5,
            width: 1.85,
            wheel_base: 2.7,
            max_deceleration: 3.0,
            max_speed_forward: 6.0,
            max_steer_angle: 0.45,
        }
    }
}

impl VehicleInfo {
    pub fn half_length(&self) -> f64 {
        self.length / 2.0
    }

    pub fn half_width(&self) -> f64 {
        self.width / 2.0
    }

    /// Rectangular outline in the vehicle frame (x forward, y left)
    pub fn footprint(&self) -> Vec<Point2D> {
        let l2 = self.half_length();
        let w2 = self.half_width();
        vec![
            Point2D::new(-l2, -w2),
            Point2D::new(l2, -w2),
            Point2D::new(l2, w2),
            Point2D::new(-l2, w2),
        ]
    }

    /// Outline placed at `pose` in the world frame
    pub fn footprint_at(&self, pose: &Pose2D) -> Vec<Point2D> {
        self.footprint()
            .into_iter()
            .map(|p| transform_point(pose, p))
            .collect()
    }
}

/// A detected obstacle, refreshed every cycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DetectedObject {
    pub id: i32,
    /// Center pose; `v` carries the obstacle speed
    pub center: Waypoint,
    pub contour: Vec<Point2D>,
}

impl DetectedObject {
    pub fn new(id: i32, center: Waypoint, contour: Vec<Point2D>) -> Self {
        Self { id, center, contour }
    }

    /// Contour points followed by the center point
    pub fn contour_points(&self) -> Vec<Point2D> {
        let mut points = self.contour.clone();
        points.push(self.center.position());
        points
    }
}

/// Traffic light known to the map
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrafficLight {
    pub id: i32,
    /// Position and the heading a vehicle faces when the light applies to it
    pub pose: Pose2D,
    /// Range within which the light becomes relevant [m]
    pub stopping_distance: f64,
}

/// Result of a stop line query along a path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLineInfo {
    /// Distance from the vehicle to the stop line along the path [m]
    pub distance: f64,
    pub stop_line_id: i32,
    pub stop_sign_id: Option<i32>,
    pub traffic_light_id: Option<i32>,
}

/// Best trajectory reported by the external cost scorer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryCost {
    /// `None` when no rollout is viable
    pub best_index: Option<usize>,
    pub closest_obstacle_distance: f64,
    pub closest_obstacle_velocity: f64,
}

impl TrajectoryCost {
    pub fn new(best_index: Option<usize>, distance: f64, velocity: f64) -> Self {
        Self {
            best_index,
            closest_obstacle_distance: distance,
            closest_obstacle_velocity: velocity,
        }
    }
}

/// Map a point expressed in `reference`'s frame into the world frame
pub fn transform_point(reference: &Pose2D, p: Point2D) -> Point2D {
    let world = reference.to_isometry() * Point2::new(p.x, p.y);
    Point2D::new(world.x, world.y)
}
