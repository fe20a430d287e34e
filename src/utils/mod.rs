//! Utility modules for behavior_planner

pub mod planning_helpers;
pub mod visualization;

pub use planning_helpers::*;
pub use visualization::{Visualizer, PathStyle, PointStyle, colors};
