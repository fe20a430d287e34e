//! Interfaces of the collaborators the planner consumes
//!
//! Rollout geometry, per-rollout cost scoring, map queries and speed shaping
//! live outside this crate; the planner only talks to them through these
//! traits.

use crate::common::config::PlanningParams;
use crate::common::types::*;

/// Scores the current rollouts against the detected obstacles
pub trait TrajectoryScorer {
    /// Return the best rollout together with the closest obstacle ahead on it
    #[allow(clippy::too_many_arguments)]
    fn score(
        &mut self,
        rollouts: &[RolloutSet],
        reference_paths: &[Path],
        pose: &Waypoint,
        current_safe: Option<usize>,
        params: &PlanningParams,
        vehicle: &VehicleInfo,
        obstacles: &[DetectedObject],
    ) -> TrajectoryCost;
}

/// Produces lateral alternatives around a reference path
///
/// Rollouts are ordered from the rightmost (index 0) to the leftmost, so the
/// central one sits at `rollout_count / 2`.
pub trait RolloutGenerator {
    fn generate(
        &self,
        reference: &[Waypoint],
        pose: &Waypoint,
        speed: f64,
        params: &PlanningParams,
    ) -> RolloutSet;
}

/// Road network queries
pub trait RoadNetwork {
    /// Closest lane within `search_radius` of `pose`
    fn closest_lane(&self, pose: &Waypoint, search_radius: f64) -> Option<LaneId>;

    /// Lane of the path waypoint the vehicle is currently on
    fn lane_from_path(&self, pose: &Waypoint, path: &[Waypoint]) -> Option<LaneId>;

    /// Every lane within `search_radius` of `pose`
    fn closest_lanes(&self, pose: &Waypoint, search_radius: f64) -> Vec<LaneId>;

    /// Paths an agent at `pose` could follow along `lane` for `distance`
    fn predict_lane_paths(&self, lane: LaneId, pose: &Waypoint, distance: f64) -> Vec<Path>;

    /// Nearest stop line ahead on `path`
    fn distance_to_closest_stop_line(&self, path: &[Waypoint], pose: &Waypoint)
        -> Option<StopLineInfo>;
}

/// Shapes the velocity profile of a selected path
pub trait SpeedProfiler {
    /// Assign a target speed to each waypoint
    fn generate_recommended_speed(&self, path: &mut Path, max_speed: f64, profile_factor: f64);

    /// Smooth the assigned speeds
    fn smooth_speed_profile(
        &self,
        path: &mut Path,
        data_weight: f64,
        smooth_weight: f64,
        tolerance: f64,
    );
}
