// Localization module

pub mod kinematic_estimator;

pub use kinematic_estimator::KinematicEstimator;
