//! Kinematic pose estimator
//!
//! Dead-reckons the vehicle pose with a bicycle model while no live
//! localization feed is available. The model integrates the axle point
//! half a wheel base ahead of the vehicle center and converts back to the
//! center after every step. Steering actuation lag can be simulated: the
//! applied steering angle walks toward the commanded one a degree at a time,
//! more slowly the faster the vehicle moves.

use crate::common::{Pose2D, VehicleState};
use crate::utils::{fix_negative_angle, momentum_scale_factor};

/// Bicycle-model dead reckoning with simulated steering lag
#[derive(Debug, Clone)]
pub struct KinematicEstimator {
    wheel_base: f64,
    steering_delay_factor: f64,
    /// Vehicle center pose
    pose: Pose2D,
    /// Integrated axle point
    odometry: Pose2D,
    current: VehicleState,
    desired: VehicleState,
    last_steer_step: f64,
}

impl KinematicEstimator {
    pub fn new(wheel_base: f64, steering_delay_factor: f64) -> Self {
        Self {
            wheel_base,
            steering_delay_factor,
            pose: Pose2D::origin(),
            odometry: Pose2D::new(wheel_base / 2.0, 0.0, 0.0),
            current: VehicleState::default(),
            desired: VehicleState::default(),
            last_steer_step: 0.0,
        }
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    /// Steering, speed and gear currently applied
    pub fn current_state(&self) -> VehicleState {
        self.current
    }

    /// Seed the estimate with a known pose
    pub fn first_localize(&mut self, pose: Pose2D) {
        let yaw = fix_negative_angle(pose.yaw);
        self.pose = Pose2D::new(pose.x, pose.y, yaw);
        self.odometry = Pose2D::new(
            pose.x + self.wheel_base / 2.0 * yaw.cos(),
            pose.y + self.wheel_base / 2.0 * yaw.sin(),
            yaw,
        );
    }

    /// Command the speed, steering and gear the vehicle should reach
    pub fn set_target(&mut self, target: &VehicleState) {
        self.desired = *target;
    }

    /// Apply the commanded state, optionally lagging the steering
    ///
    /// `now` is the planner clock in seconds.
    pub fn update_state(&mut self, use_delay: bool, now: f64) {
        if !use_delay || self.steering_delay_factor == 0.0 {
            self.current.steer = self.desired.steer;
        } else {
            let current_deg = self.current.steer.to_degrees();
            let desired_deg = self.desired.steer.to_degrees();
            let diff = desired_deg - current_deg;
            let step = if diff.abs() < 1.0 { diff } else { diff.signum() };

            let interval =
                self.steering_delay_factor / (1.0 - momentum_scale_factor(self.desired.speed));
            let mut next_deg = current_deg;
            if now - self.last_steer_step > interval {
                self.last_steer_step = now;
                next_deg += step;
            }
            self.current.steer = next_deg.to_radians();
        }

        self.current.shift = self.desired.shift;
        self.current.speed = self.desired.speed;
    }

    /// Integrate the bicycle model over `dt` seconds
    pub fn localize(&mut self, dt: f64) -> Pose2D {
        let ds = self.current.shift.direction() * self.current.speed * dt;
        let heading = self.pose.yaw;

        self.odometry.x += ds * heading.cos();
        self.odometry.y += ds * heading.sin();
        self.odometry.yaw += ds * self.current.steer.tan() / self.wheel_base;
        self.odometry.yaw = fix_negative_angle(self.odometry.yaw);

        let yaw = self.odometry.yaw;
        self.pose = Pose2D::new(
            self.odometry.x - self.wheel_base / 2.0 * yaw.cos(),
            self.odometry.y - self.wheel_base / 2.0 * yaw.sin(),
            yaw,
        );
        self.pose
    }

    /// One simulated odometry step: command, actuate with lag, integrate
    pub fn simulate(&mut self, dt: f64, target: &VehicleState, now: f64) -> Pose2D {
        self.set_target(target);
        self.update_state(true, now);
        self.localize(dt)
    }
}
