// Path planning: tracked path selection, speed shaping and obstacle prediction

pub mod obstacle_prediction;
pub mod speed_profile;
pub mod trajectory_selector;

pub use obstacle_prediction::{
    calculate_intersection_velocities, calculate_obstacle_costs, predict_obstacle_trajectory,
    CollisionPrediction,
};
pub use speed_profile::CurvatureSpeedProfiler;
pub use trajectory_selector::{SelectionContext, TrajectorySelector};
