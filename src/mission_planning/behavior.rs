//! Behavior tags and the per-cycle behavior result

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete driving intent selected each cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BehaviorTag {
    Init,
    Forward,
    Stop,
    Wait,
    MissionAccomplished,
    Swerve,
    TrafficLightStop,
    TrafficLightWait,
    StopSignStop,
    StopSignWait,
    Follow,
}

impl BehaviorTag {
    pub const ALL: [BehaviorTag; 11] = [
        BehaviorTag::Init,
        BehaviorTag::Forward,
        BehaviorTag::Stop,
        BehaviorTag::Wait,
        BehaviorTag::MissionAccomplished,
        BehaviorTag::Swerve,
        BehaviorTag::TrafficLightStop,
        BehaviorTag::TrafficLightWait,
        BehaviorTag::StopSignStop,
        BehaviorTag::StopSignWait,
        BehaviorTag::Follow,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BehaviorTag::Init => "init",
            BehaviorTag::Forward => "forward",
            BehaviorTag::Stop => "stop",
            BehaviorTag::Wait => "wait",
            BehaviorTag::MissionAccomplished => "mission_accomplished",
            BehaviorTag::Swerve => "swerve",
            BehaviorTag::TrafficLightStop => "traffic_light_stop",
            BehaviorTag::TrafficLightWait => "traffic_light_wait",
            BehaviorTag::StopSignStop => "stop_sign_stop",
            BehaviorTag::StopSignWait => "stop_sign_wait",
            BehaviorTag::Follow => "follow",
        }
    }

    /// Obstacle avoidance selects the safe rollout instead of the central one
    pub fn is_obstacle_avoidance(&self) -> bool {
        matches!(self, BehaviorTag::Swerve)
    }
}

impl fmt::Display for BehaviorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Turn indicator request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Indicator {
    #[default]
    None,
    Left,
    Right,
}

/// What the vehicle should do this cycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorResult {
    pub state: BehaviorTag,
    pub indicator: Indicator,
    /// Upper bound on target speed [m/s]
    pub max_velocity: f64,
    pub min_velocity: f64,
    /// Distance to the nearest pending stop point, 0 when none [m]
    pub stop_distance: f64,
    /// Distance to the followed obstacle, 0 unless following [m]
    pub follow_distance: f64,
    pub follow_velocity: f64,
    /// A new trajectory was selected this cycle
    pub new_plan: bool,
}
