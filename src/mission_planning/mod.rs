// Mission planning: behavior decisions and the per-cycle planner

pub mod behavior;
pub mod decision;
pub mod local_planner;
pub mod state_machine;

pub use behavior::{BehaviorResult, BehaviorTag, Indicator};
pub use decision::{next_traffic_light, DecisionInputs, DecisionParameters};
pub use local_planner::{CycleTimings, LocalPlanner};
pub use state_machine::{BehaviorState, BehaviorStateMachine, BehaviorTransition};
