//! Per-cycle decision parameters
//!
//! Derived quantities the behavior state machine decides on. The record is
//! recomputed every cycle; only the safe-trajectory indices and the
//! bookkeeping of consumed traffic lights, stop signs and state entry time
//! survive from one cycle to the next.

use crate::common::{
    PlanningParams, Point2D, Pose2D, StopLineInfo, TrafficLight, TrajectoryCost, VehicleInfo,
    Waypoint,
};
use crate::utils::angle_between_two_angles_positive;
use std::f64::consts::FRAC_PI_2;

/// Distance to the goal at which the mission is complete [m]
pub const GOAL_REACHED_DISTANCE: f64 = 3.5;

/// Added to the stopping distance once an obstacle or stop point is known [m]
pub const STOPPING_DISTANCE_MARGIN: f64 = 0.5;

/// Obstacle distance reported while an emergency stop is asserted [m]
pub const EMERGENCY_STOP_DISTANCE: f64 = 1.0;

/// Speeds at or below this count as standing still [m/s]
pub const ZERO_VELOCITY: f64 = 0.1;

/// Everything the computation reads from the outside world this cycle
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    pub pose: &'a Waypoint,
    pub speed: f64,
    pub goal: Point2D,
    pub emergency_stop: bool,
    pub green_light: bool,
    pub best_trajectory: &'a TrajectoryCost,
    /// `None` when there is no reference path or no current lane
    pub stop_line: Option<StopLineInfo>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionParameters {
    pub current_velocity: f64,
    pub min_stopping_distance: f64,
    /// Distance to the closest relevant obstacle ahead [m]
    pub distance_to_next: f64,
    pub velocity_of_next: f64,
    pub curr_safe_trajectory: Option<usize>,
    pub prev_safe_trajectory: Option<usize>,
    pub central_trajectory: usize,
    pub current_traffic_light: Option<i32>,
    /// Last traffic light already handled
    pub prev_traffic_light: Option<i32>,
    pub traffic_is_red: bool,
    pub current_stop_sign: Option<i32>,
    /// Last stop sign already handled
    pub prev_stop_sign: Option<i32>,
    /// Traffic light the vehicle is currently stopping or waiting for
    pub pending_traffic_light: Option<i32>,
    /// Stop sign the vehicle is currently stopping or waiting at
    pub pending_stop_sign: Option<i32>,
    pub stopping_distances: Vec<f64>,
    pub goal_reached: bool,
    pub fully_blocked: bool,
    pub replan: bool,
    pub upcoming_left: bool,
    pub upcoming_right: bool,
    /// Planner clock value when the active behavior was entered [s]
    pub state_entered_at: f64,
}

impl DecisionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nearest pending stop point, 0 when there is none
    pub fn distance_to_stop(&self) -> f64 {
        self.stopping_distances
            .iter()
            .copied()
            .fold(None, |min: Option<f64>, d| Some(min.map_or(d, |m| m.min(d))))
            .unwrap_or(0.0)
    }

    /// A red light ahead that has not been handled yet
    pub fn red_light_ahead(&self, params: &PlanningParams) -> bool {
        params.enable_traffic_light_behavior
            && self.traffic_is_red
            && self.current_traffic_light.is_some()
            && self.current_traffic_light != self.prev_traffic_light
    }

    /// A stop sign ahead that has not been handled yet
    pub fn stop_sign_ahead(&self, params: &PlanningParams) -> bool {
        params.enable_stop_sign_behavior
            && self.current_stop_sign.is_some()
            && self.current_stop_sign != self.prev_stop_sign
    }

    /// Re-derive every per-cycle quantity
    pub fn compute(
        &mut self,
        inputs: &DecisionInputs<'_>,
        vehicle: &VehicleInfo,
        params: &PlanningParams,
    ) {
        self.goal_reached = is_goal_reached(&inputs.pose.position(), &inputs.goal);

        // margin keys off what the previous cycle knew
        self.min_stopping_distance = min_stopping_distance(inputs.speed, vehicle);
        if self.distance_to_next > 0.0 || self.distance_to_stop() > 0.0 {
            self.min_stopping_distance += STOPPING_DISTANCE_MARGIN;
        }

        self.central_trajectory = params.central_trajectory();
        if self.curr_safe_trajectory.is_none() {
            self.curr_safe_trajectory = Some(self.central_trajectory);
        }
        if self.prev_safe_trajectory.is_none() {
            self.prev_safe_trajectory = Some(self.central_trajectory);
        }

        self.stopping_distances.clear();
        self.current_velocity = inputs.speed;
        self.traffic_is_red = false;
        self.current_traffic_light = None;
        self.current_stop_sign = None;
        self.replan = false;
        self.fully_blocked = false;

        let best = inputs.best_trajectory;
        self.distance_to_next = best.closest_obstacle_distance;
        self.velocity_of_next = best.closest_obstacle_velocity;
        match best.best_index {
            Some(index) => self.curr_safe_trajectory = Some(index),
            None => {
                if self.distance_to_next < params.min_following_distance {
                    self.fully_blocked = true;
                }
            }
        }

        if let Some(stop_line) = inputs.stop_line {
            let distance = stop_line.distance - vehicle.half_length();
            if distance > 0.0
                && distance < self.min_stopping_distance
                && params.enable_traffic_light_behavior
            {
                self.current_traffic_light = stop_line.traffic_light_id;
                self.current_stop_sign = stop_line.stop_sign_id;
                self.stopping_distances.push(distance);
            }
        }

        self.traffic_is_red = !inputs.green_light;

        self.upcoming_left = false;
        self.upcoming_right = false;
        if let Some(safe) = self.curr_safe_trajectory {
            self.upcoming_left = safe > self.central_trajectory;
            self.upcoming_right = safe < self.central_trajectory;
        }

        if inputs.emergency_stop {
            self.fully_blocked = true;
            self.distance_to_next = EMERGENCY_STOP_DISTANCE;
            self.velocity_of_next = 0.0;
        }
    }
}

/// True within `GOAL_REACHED_DISTANCE` of the goal, boundary included
pub fn is_goal_reached(position: &Point2D, goal: &Point2D) -> bool {
    position.distance(goal) <= GOAL_REACHED_DISTANCE
}

/// Braking distance from `speed` plus half the vehicle length
pub fn min_stopping_distance(speed: f64, vehicle: &VehicleInfo) -> f64 {
    speed * speed / (2.0 * vehicle.max_deceleration.abs()) + vehicle.half_length()
}

/// First light in range, facing the vehicle's direction, and not yet handled
pub fn next_traffic_light<'a>(
    pose: &Pose2D,
    prev_traffic_light: Option<i32>,
    lights: &'a [TrafficLight],
) -> Option<&'a TrafficLight> {
    lights.iter().find(|light| {
        let d = light.pose.distance(pose);
        let heading_diff =
            angle_between_two_angles_positive(light.pose.fixed_yaw(), pose.fixed_yaw());
        d <= light.stopping_distance
            && heading_diff < FRAC_PI_2
            && Some(light.id) != prev_traffic_light
    })
}
