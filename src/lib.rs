//! behavior_planner - local behavior planning core for autonomous vehicles
//!
//! Decides each control cycle which driving behavior to execute and which
//! rollout to track, given the vehicle pose, a road network, a goal and the
//! detected obstacles.

// Core modules
pub mod common;
pub mod utils;

// Planner modules
pub mod localization;
pub mod mission_planning;
pub mod path_planning;

// Re-export common types for convenience
pub use common::{DetectedObject, Path, Point2D, Pose2D, VehicleInfo, VehicleState, Waypoint};
pub use common::{RoadNetwork, RolloutGenerator, SpeedProfiler, TrajectoryScorer};
pub use common::{PlannerConfig, PlannerError, PlannerResult, PlanningParams};
pub use mission_planning::{BehaviorResult, BehaviorTag, Indicator, LocalPlanner};
