//! Planner configuration
//!
//! Every section deserializes with `#[serde(default)]`, so a YAML file only
//! needs to name the values it overrides.

use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;

use crate::common::error::{PlannerError, PlannerResult};
use crate::common::types::VehicleInfo;

/// Tunable parameters owned by each behavior state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanningParams {
    /// Maximum planned speed [m/s]
    pub max_speed: f64,
    /// Minimum planned speed [m/s]
    pub min_speed: f64,
    /// Length of the locally planned path [m]
    pub plan_distance: f64,
    /// Distance over which rollouts fan out from the vehicle [m]
    pub car_tip_margin: f64,
    /// Distance over which rollouts rejoin their lateral offset [m]
    pub roll_in_margin: f64,
    pub roll_in_speed_factor: f64,
    /// Waypoint spacing [m]
    pub path_density: f64,
    /// Lateral spacing between rollouts [m]
    pub rollout_density: f64,
    /// Number of lateral alternatives
    pub rollout_count: usize,
    pub smoothing_data_weight: f64,
    pub smoothing_smooth_weight: f64,
    pub smoothing_tolerance_error: f64,
    pub speed_profile_factor: f64,
    /// Obstacle distance below which a blocked path means fully blocked [m]
    pub min_following_distance: f64,
    /// Obstacle distance below which swerving is considered [m]
    pub min_distance_to_avoid: f64,
    /// Dwell time at a stop sign [s]
    pub stop_sign_stop_time: f64,
    pub enable_lane_change: bool,
    pub enable_swerving: bool,
    pub enable_following: bool,
    pub enable_heading_smoothing: bool,
    pub enable_traffic_light_behavior: bool,
    pub enable_stop_sign_behavior: bool,
}

impl Default for PlanningParams {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            min_speed: 0.0,
            plan_distance: 35.0,
            car_tip_margin: 4.0,
            roll_in_margin: 12.0,
            roll_in_speed_factor: 0.25,
            path_density: 0.5,
            rollout_density: 0.5,
            rollout_count: 4,
            smoothing_data_weight: 0.45,
            smoothing_smooth_weight: 0.4,
            smoothing_tolerance_error: 0.1,
            speed_profile_factor: 1.2,
            min_following_distance: 20.0,
            min_distance_to_avoid: 15.0,
            stop_sign_stop_time: 5.0,
            enable_lane_change: false,
            enable_swerving: true,
            enable_following: true,
            enable_heading_smoothing: false,
            enable_traffic_light_behavior: true,
            enable_stop_sign_behavior: true,
        }
    }
}

impl PlanningParams {
    /// Index of the straight-ahead rollout
    pub fn central_trajectory(&self) -> usize {
        self.rollout_count / 2
    }
}

/// Top-level planner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub vehicle: VehicleInfo,
    pub planning: PlanningParams,
    /// Base interval between simulated one-degree steering steps [s]
    pub steering_delay_factor: f64,
    /// Search radius used when the vehicle is not on the tracked path [m]
    pub lane_search_radius: f64,
    /// Minimum dwell time of the Wait behavior [s]
    pub wait_time: f64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            vehicle: VehicleInfo::default(),
            planning: PlanningParams::default(),
            steering_delay_factor: 0.1,
            lane_search_radius: 3.0,
            wait_time: 1.0,
        }
    }
}

impl PlannerConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> PlannerResult<Self> {
        let config: PlannerConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_yaml_file<P: AsRef<FsPath>>(path: P) -> PlannerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn to_yaml_string(&self) -> PlannerResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> PlannerResult<()> {
        let positive = [
            ("vehicle.length", self.vehicle.length),
            ("vehicle.width", self.vehicle.width),
            ("vehicle.wheel_base", self.vehicle.wheel_base),
            ("vehicle.max_speed_forward", self.vehicle.max_speed_forward),
            ("planning.plan_distance", self.planning.plan_distance),
            ("lane_search_radius", self.lane_search_radius),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(PlannerError::InvalidParameter(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        if self.vehicle.max_deceleration == 0.0 || !self.vehicle.max_deceleration.is_finite() {
            return Err(PlannerError::InvalidParameter(
                "vehicle.max_deceleration must be non-zero".to_string(),
            ));
        }
        if self.planning.rollout_count == 0 {
            return Err(PlannerError::InvalidParameter(
                "planning.rollout_count must be at least 1".to_string(),
            ));
        }
        if self.planning.min_speed > self.planning.max_speed {
            return Err(PlannerError::InvalidParameter(format!(
                "planning.min_speed ({}) exceeds planning.max_speed ({})",
                self.planning.min_speed, self.planning.max_speed
            )));
        }
        if self.steering_delay_factor < 0.0
            || self.wait_time < 0.0
            || self.planning.stop_sign_stop_time < 0.0
        {
            return Err(PlannerError::InvalidParameter(
                "delays and dwell times must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}
