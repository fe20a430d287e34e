/*!
 * Behavior state machine for the local planner
 *
 * Every behavior is a registered state keyed by its tag, holding its own
 * planning parameters and a minimum dwell time. Allowed moves are kept in an
 * explicit adjacency table. Choosing the next behavior is a pure function of
 * the active state and the decision parameters; the machine validates the
 * choice against the table, then runs the exit and enter bookkeeping.
 */

use log::{debug, info, warn};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;

use crate::common::PlanningParams;
use crate::mission_planning::behavior::BehaviorTag;
use crate::mission_planning::decision::{DecisionParameters, ZERO_VELOCITY};

/// Transitions kept for diagnostics
pub const MAX_TRANSITION_HISTORY: usize = 128;

/// A node of the behavior graph
#[derive(Debug, Clone, PartialEq)]
pub struct BehaviorState {
    pub tag: BehaviorTag,
    pub params: PlanningParams,
    /// Minimum time spent in the state before a timed exit [s]
    pub decision_time: f64,
}

impl BehaviorState {
    pub fn new(tag: BehaviorTag, params: PlanningParams) -> Self {
        BehaviorState {
            tag,
            params,
            decision_time: 0.0,
        }
    }

    pub fn with_decision_time(mut self, decision_time: f64) -> Self {
        self.decision_time = decision_time;
        self
    }

    /// Bookkeeping when the state becomes active
    fn enter(&self, decision: &mut DecisionParameters, now: f64) {
        decision.state_entered_at = now;
        match self.tag {
            BehaviorTag::TrafficLightStop => {
                if decision.current_traffic_light.is_some() {
                    decision.pending_traffic_light = decision.current_traffic_light;
                }
            }
            BehaviorTag::StopSignStop => {
                if decision.current_stop_sign.is_some() {
                    decision.pending_stop_sign = decision.current_stop_sign;
                }
            }
            BehaviorTag::MissionAccomplished => info!("mission accomplished"),
            _ => {}
        }
    }

    /// Bookkeeping when the state is left for `next`
    fn exit(&self, next: BehaviorTag, decision: &mut DecisionParameters) {
        match (self.tag, next) {
            (BehaviorTag::TrafficLightStop, BehaviorTag::Forward)
            | (BehaviorTag::TrafficLightWait, BehaviorTag::Forward) => {
                if let Some(id) = decision.pending_traffic_light.take() {
                    decision.prev_traffic_light = Some(id);
                }
            }
            (BehaviorTag::StopSignWait, BehaviorTag::Forward) => {
                if let Some(id) = decision.pending_stop_sign.take() {
                    decision.prev_stop_sign = Some(id);
                }
            }
            (BehaviorTag::Swerve, _) => decision.replan = true,
            _ => {}
        }
    }
}

impl fmt::Display for BehaviorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

/// A recorded change of behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BehaviorTransition {
    pub from: BehaviorTag,
    pub to: BehaviorTag,
    /// Planner clock at the transition [s]
    pub at: f64,
}

/// The behavior graph and its single active state
#[derive(Debug, Clone)]
pub struct BehaviorStateMachine {
    states: HashMap<BehaviorTag, BehaviorState>,
    transitions: HashMap<BehaviorTag, BTreeSet<BehaviorTag>>,
    current: BehaviorTag,
    history: VecDeque<BehaviorTransition>,
}

impl BehaviorStateMachine {
    /// Build the full behavior graph, starting in `Init`
    ///
    /// `wait_time` is the dwell of the `Wait` behavior; the stop sign dwell
    /// comes from `params.stop_sign_stop_time`.
    pub fn new(params: &PlanningParams, wait_time: f64) -> Self {
        let mut machine = BehaviorStateMachine {
            states: HashMap::new(),
            transitions: HashMap::new(),
            current: BehaviorTag::Init,
            history: VecDeque::new(),
        };

        for tag in BehaviorTag::ALL {
            machine.register_state(BehaviorState::new(tag, params.clone()));
        }
        machine.set_behaviors_params(params, wait_time);

        use BehaviorTag::*;
        machine.add_transitions(Init, &[Forward]);
        machine.add_transitions(
            Forward,
            &[
                MissionAccomplished,
                Stop,
                Wait,
                Follow,
                Swerve,
                TrafficLightStop,
                StopSignStop,
            ],
        );
        machine.add_transitions(
            Follow,
            &[Forward, Stop, Wait, Swerve, TrafficLightStop, StopSignStop],
        );
        machine.add_transitions(Swerve, &[Forward, Stop, Wait, Follow, TrafficLightStop]);
        machine.add_transitions(Stop, &[Forward]);
        machine.add_transitions(Wait, &[Forward]);
        machine.add_transitions(TrafficLightStop, &[Forward, TrafficLightWait]);
        machine.add_transitions(TrafficLightWait, &[Forward, TrafficLightStop]);
        machine.add_transitions(StopSignStop, &[StopSignWait, Follow]);
        machine.add_transitions(StopSignWait, &[Forward, StopSignStop]);

        machine
    }

    pub fn register_state(&mut self, state: BehaviorState) {
        self.transitions.entry(state.tag).or_default();
        self.states.insert(state.tag, state);
    }

    /// Allow a move from `src` to `dst`
    pub fn add_transition(&mut self, src: BehaviorTag, dst: BehaviorTag) {
        self.transitions.entry(src).or_default().insert(dst);
    }

    fn add_transitions(&mut self, src: BehaviorTag, dsts: &[BehaviorTag]) {
        for &dst in dsts {
            self.add_transition(src, dst);
        }
    }

    /// Staying put is always allowed
    pub fn is_allowed(&self, src: BehaviorTag, dst: BehaviorTag) -> bool {
        src == dst
            || self
                .transitions
                .get(&src)
                .map_or(false, |successors| successors.contains(&dst))
    }

    pub fn successors(&self, src: BehaviorTag) -> Vec<BehaviorTag> {
        self.transitions
            .get(&src)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Push a new parameter set into every state
    pub fn set_behaviors_params(&mut self, params: &PlanningParams, wait_time: f64) {
        for state in self.states.values_mut() {
            state.params = params.clone();
            state.decision_time = match state.tag {
                BehaviorTag::Wait => wait_time,
                BehaviorTag::StopSignWait => params.stop_sign_stop_time,
                _ => 0.0,
            };
        }
    }

    pub fn current(&self) -> BehaviorTag {
        self.current
    }

    pub fn current_state(&self) -> Option<&BehaviorState> {
        self.states.get(&self.current)
    }

    pub fn state(&self, tag: BehaviorTag) -> Option<&BehaviorState> {
        self.states.get(&tag)
    }

    /// Planning parameters of the active behavior
    pub fn current_params(&self) -> Option<&PlanningParams> {
        self.current_state().map(|s| &s.params)
    }

    pub fn history(&self) -> &VecDeque<BehaviorTransition> {
        &self.history
    }

    /// Evaluate the active state once and move along a permitted edge
    pub fn advance(&mut self, decision: &mut DecisionParameters, now: f64) -> BehaviorTag {
        let from = self.current;
        let Some(state) = self.states.get(&from) else {
            warn!("behavior <{}> is not registered", from);
            return from;
        };

        let mut to = next_behavior(state, decision, now);
        if !self.is_allowed(from, to) {
            warn!("rejected transition <{}> -> <{}>", from, to);
            to = from;
        }
        if to == from {
            return from;
        }

        state.exit(to, decision);
        if let Some(next) = self.states.get(&to) {
            next.enter(decision, now);
        }
        debug!("behavior <{}> -> <{}> at {:.2}", from, to, now);

        if self.history.len() == MAX_TRANSITION_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(BehaviorTransition { from, to, at: now });
        self.current = to;
        to
    }

    /// Text listing of states and edges
    pub fn generate_diagram(&self) -> String {
        let mut diagram = vec![format!("Current State: {}", self.current), String::new()];
        diagram.push("Transitions:".to_string());
        for tag in BehaviorTag::ALL {
            let successors = self.successors(tag);
            let marker = if tag == self.current { " [CURRENT]" } else { "" };
            if successors.is_empty() {
                diagram.push(format!("  {}{} (terminal)", tag, marker));
            } else {
                let names: Vec<&str> = successors.iter().map(|s| s.name()).collect();
                diagram.push(format!("  {}{} --> {}", tag, marker, names.join(", ")));
            }
        }
        diagram.join("\n")
    }
}

/// Transition function of every behavior
///
/// Pure: reads the decision parameters and the planner clock `now`, returns
/// the behavior wanted for this cycle. Validation against the adjacency
/// table happens in the machine.
pub fn next_behavior(
    state: &BehaviorState,
    decision: &DecisionParameters,
    now: f64,
) -> BehaviorTag {
    let params = &state.params;
    let dwell = now - decision.state_entered_at;

    match state.tag {
        BehaviorTag::Init => BehaviorTag::Forward,
        BehaviorTag::Forward => cruise_decision(decision, params),
        BehaviorTag::Follow => match cruise_decision(decision, params) {
            BehaviorTag::MissionAccomplished => BehaviorTag::Forward,
            next => next,
        },
        BehaviorTag::Swerve => match cruise_decision(decision, params) {
            BehaviorTag::Forward if should_keep_swerving(decision, params) => BehaviorTag::Swerve,
            BehaviorTag::MissionAccomplished | BehaviorTag::StopSignStop => BehaviorTag::Forward,
            next => next,
        },
        BehaviorTag::Stop => {
            if decision.fully_blocked {
                BehaviorTag::Stop
            } else {
                BehaviorTag::Forward
            }
        }
        BehaviorTag::Wait => {
            if dwell < state.decision_time {
                BehaviorTag::Wait
            } else {
                BehaviorTag::Forward
            }
        }
        BehaviorTag::TrafficLightStop => {
            if !decision.traffic_is_red {
                BehaviorTag::Forward
            } else if decision.current_velocity <= ZERO_VELOCITY {
                BehaviorTag::TrafficLightWait
            } else {
                BehaviorTag::TrafficLightStop
            }
        }
        BehaviorTag::TrafficLightWait => {
            if !decision.traffic_is_red && dwell >= state.decision_time {
                BehaviorTag::Forward
            } else if decision.current_velocity > ZERO_VELOCITY {
                BehaviorTag::TrafficLightStop
            } else {
                BehaviorTag::TrafficLightWait
            }
        }
        // a lead vehicle is handled by the stop distance until standstill
        BehaviorTag::StopSignStop => {
            if decision.current_velocity <= ZERO_VELOCITY {
                BehaviorTag::StopSignWait
            } else {
                BehaviorTag::StopSignStop
            }
        }
        BehaviorTag::StopSignWait => {
            if dwell < state.decision_time {
                BehaviorTag::StopSignWait
            } else if decision.current_velocity > ZERO_VELOCITY {
                BehaviorTag::StopSignStop
            } else {
                BehaviorTag::Forward
            }
        }
        BehaviorTag::MissionAccomplished => BehaviorTag::MissionAccomplished,
    }
}

/// Priority ladder evaluated while driving
fn cruise_decision(decision: &DecisionParameters, params: &PlanningParams) -> BehaviorTag {
    if decision.goal_reached {
        BehaviorTag::MissionAccomplished
    } else if decision.fully_blocked {
        if decision.velocity_of_next <= ZERO_VELOCITY {
            BehaviorTag::Stop
        } else {
            BehaviorTag::Wait
        }
    } else if decision.red_light_ahead(params) {
        BehaviorTag::TrafficLightStop
    } else if decision.stop_sign_ahead(params) {
        BehaviorTag::StopSignStop
    } else if should_follow(decision, params) {
        BehaviorTag::Follow
    } else if should_swerve(decision, params) {
        BehaviorTag::Swerve
    } else {
        BehaviorTag::Forward
    }
}

/// Moving obstacle close ahead on a passable path
fn should_follow(decision: &DecisionParameters, params: &PlanningParams) -> bool {
    params.enable_following
        && !decision.fully_blocked
        && decision.velocity_of_next > ZERO_VELOCITY
        && decision.distance_to_next > 0.0
        && decision.distance_to_next <= params.min_following_distance
}

/// Obstacle close enough to avoid and the scorer moved to another rollout
fn should_swerve(decision: &DecisionParameters, params: &PlanningParams) -> bool {
    params.enable_swerving
        && !decision.fully_blocked
        && decision.distance_to_next <= params.min_distance_to_avoid
        && decision.curr_safe_trajectory != decision.prev_safe_trajectory
}

/// Obstacle still close and the safe rollout still off the central one
fn should_keep_swerving(decision: &DecisionParameters, params: &PlanningParams) -> bool {
    params.enable_swerving
        && !decision.fully_blocked
        && decision.distance_to_next <= params.min_distance_to_avoid
        && decision.curr_safe_trajectory != Some(decision.central_trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> BehaviorStateMachine {
        BehaviorStateMachine::new(&PlanningParams::default(), 1.0)
    }

    fn clear_road() -> DecisionParameters {
        DecisionParameters {
            distance_to_next: 100.0,
            curr_safe_trajectory: Some(2),
            prev_safe_trajectory: Some(2),
            central_trajectory: 2,
            current_velocity: 3.0,
            ..Default::default()
        }
    }

    fn forward_machine() -> BehaviorStateMachine {
        let mut m = machine();
        let mut d = clear_road();
        assert_eq!(m.advance(&mut d, 0.0), BehaviorTag::Forward);
        m
    }

    #[test]
    fn test_starts_in_init_and_moves_to_forward() {
        let mut m = machine();
        assert_eq!(m.current(), BehaviorTag::Init);
        let mut d = DecisionParameters::default();
        d.fully_blocked = true;
        assert_eq!(m.advance(&mut d, 0.0), BehaviorTag::Forward);
        assert_eq!(m.history().len(), 1);
    }

    #[test]
    fn test_every_state_registered() {
        let m = machine();
        for tag in BehaviorTag::ALL {
            assert!(m.state(tag).is_some());
            assert!(m.is_allowed(tag, tag));
        }
        assert!(m.successors(BehaviorTag::MissionAccomplished).is_empty());
        assert_eq!(m.successors(BehaviorTag::Stop), vec![BehaviorTag::Forward]);
    }

    #[test]
    fn test_decision_times() {
        let m = BehaviorStateMachine::new(&PlanningParams::default(), 2.5);
        assert_eq!(m.state(BehaviorTag::Wait).map(|s| s.decision_time), Some(2.5));
        assert_eq!(
            m.state(BehaviorTag::StopSignWait).map(|s| s.decision_time),
            Some(5.0)
        );
    }

    #[test]
    fn test_goal_reached_wins_over_everything() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.goal_reached = true;
        d.fully_blocked = true;
        d.traffic_is_red = true;
        d.current_traffic_light = Some(1);
        assert_eq!(m.advance(&mut d, 0.1), BehaviorTag::MissionAccomplished);
    }

    #[test]
    fn test_mission_accomplished_is_terminal() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.goal_reached = true;
        m.advance(&mut d, 0.1);
        let mut other = clear_road();
        other.fully_blocked = true;
        for i in 0..20 {
            assert_eq!(
                m.advance(&mut other, 0.2 + i as f64),
                BehaviorTag::MissionAccomplished
            );
        }
    }

    #[test]
    fn test_static_block_stops_until_clear() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.fully_blocked = true;
        d.distance_to_next = 5.0;
        assert_eq!(m.advance(&mut d, 0.1), BehaviorTag::Stop);
        assert_eq!(m.advance(&mut d, 0.2), BehaviorTag::Stop);
        d.fully_blocked = false;
        assert_eq!(m.advance(&mut d, 0.3), BehaviorTag::Forward);
    }

    #[test]
    fn test_moving_block_waits_for_dwell() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.fully_blocked = true;
        d.velocity_of_next = 2.0;
        assert_eq!(m.advance(&mut d, 1.0), BehaviorTag::Wait);
        d.fully_blocked = false;
        assert_eq!(m.advance(&mut d, 1.5), BehaviorTag::Wait);
        assert_eq!(m.advance(&mut d, 2.0), BehaviorTag::Forward);
    }

    #[test]
    fn test_traffic_light_cycle_consumes_light() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.traffic_is_red = true;
        d.current_traffic_light = Some(7);
        assert_eq!(m.advance(&mut d, 1.0), BehaviorTag::TrafficLightStop);
        assert_eq!(d.pending_traffic_light, Some(7));

        d.current_velocity = 0.0;
        assert_eq!(m.advance(&mut d, 2.0), BehaviorTag::TrafficLightWait);
        assert_eq!(m.advance(&mut d, 3.0), BehaviorTag::TrafficLightWait);

        d.traffic_is_red = false;
        assert_eq!(m.advance(&mut d, 4.0), BehaviorTag::Forward);
        assert_eq!(d.prev_traffic_light, Some(7));
        assert_eq!(d.pending_traffic_light, None);

        // same light red again is ignored
        d.traffic_is_red = true;
        d.current_velocity = 3.0;
        assert_eq!(m.advance(&mut d, 5.0), BehaviorTag::Forward);
    }

    #[test]
    fn test_traffic_light_wait_restarts_stop_when_rolling() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.traffic_is_red = true;
        d.current_traffic_light = Some(7);
        m.advance(&mut d, 1.0);
        d.current_velocity = 0.0;
        m.advance(&mut d, 2.0);
        d.current_velocity = 1.0;
        assert_eq!(m.advance(&mut d, 3.0), BehaviorTag::TrafficLightStop);
    }

    #[test]
    fn test_stop_sign_dwell_is_enforced() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.current_stop_sign = Some(3);
        assert_eq!(m.advance(&mut d, 10.0), BehaviorTag::StopSignStop);
        d.current_velocity = 0.0;
        assert_eq!(m.advance(&mut d, 11.0), BehaviorTag::StopSignWait);
        for t in [12.0, 14.0, 15.9] {
            assert_eq!(m.advance(&mut d, t), BehaviorTag::StopSignWait);
        }
        assert_eq!(m.advance(&mut d, 16.0), BehaviorTag::Forward);
        assert_eq!(d.prev_stop_sign, Some(3));
        assert_eq!(m.advance(&mut d, 16.1), BehaviorTag::Forward);
    }

    #[test]
    fn test_follow_moving_obstacle() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.distance_to_next = 12.0;
        d.velocity_of_next = 2.0;
        assert_eq!(m.advance(&mut d, 0.1), BehaviorTag::Follow);
        d.distance_to_next = 40.0;
        assert_eq!(m.advance(&mut d, 0.2), BehaviorTag::Forward);
    }

    #[test]
    fn test_follow_disabled_does_not_follow() {
        let mut params = PlanningParams::default();
        params.enable_following = false;
        let state = BehaviorState::new(BehaviorTag::Forward, params);
        let mut d = clear_road();
        d.distance_to_next = 12.0;
        d.velocity_of_next = 2.0;
        assert_eq!(next_behavior(&state, &d, 0.0), BehaviorTag::Forward);
    }

    #[test]
    fn test_swerve_requests_replan_on_exit() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.distance_to_next = 10.0;
        d.curr_safe_trajectory = Some(3);
        assert_eq!(m.advance(&mut d, 0.1), BehaviorTag::Swerve);
        assert!(!d.replan);
        d.prev_safe_trajectory = Some(3);
        d.distance_to_next = 40.0;
        assert_eq!(m.advance(&mut d, 0.2), BehaviorTag::Forward);
        assert!(d.replan);
    }

    #[test]
    fn test_swerve_holds_while_obstacle_is_close() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.distance_to_next = 10.0;
        d.curr_safe_trajectory = Some(3);
        assert_eq!(m.advance(&mut d, 0.1), BehaviorTag::Swerve);

        // the selector now tracks the safe rollout
        d.prev_safe_trajectory = Some(3);
        for i in 0..10 {
            assert_eq!(m.advance(&mut d, 0.2 + i as f64 * 0.1), BehaviorTag::Swerve);
            assert!(!d.replan);
        }

        // back on the central rollout ends the manoeuvre
        d.curr_safe_trajectory = Some(2);
        assert_eq!(m.advance(&mut d, 2.0), BehaviorTag::Swerve);
        d.prev_safe_trajectory = Some(2);
        assert_eq!(m.advance(&mut d, 2.1), BehaviorTag::Forward);
    }

    #[test]
    fn test_stop_sign_stop_holds_behind_lead_vehicle() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.current_stop_sign = Some(5);
        d.distance_to_next = 12.0;
        d.velocity_of_next = 2.0;
        assert_eq!(m.advance(&mut d, 1.0), BehaviorTag::StopSignStop);
        for i in 0..8 {
            assert_eq!(m.advance(&mut d, 1.5 + i as f64), BehaviorTag::StopSignStop);
        }
        d.current_velocity = 0.0;
        assert_eq!(m.advance(&mut d, 10.0), BehaviorTag::StopSignWait);
    }

    #[test]
    fn test_goal_from_follow_routes_through_forward() {
        let mut m = forward_machine();
        let mut d = clear_road();
        d.distance_to_next = 12.0;
        d.velocity_of_next = 2.0;
        m.advance(&mut d, 0.1);
        d.goal_reached = true;
        assert_eq!(m.advance(&mut d, 0.2), BehaviorTag::Forward);
        assert_eq!(m.advance(&mut d, 0.3), BehaviorTag::MissionAccomplished);
    }

    #[test]
    fn test_adjacency_never_violated() {
        let mut m = machine();
        let mut d = clear_road();
        let mut now = 0.0;
        for i in 0..400 {
            d.goal_reached = i == 399;
            d.fully_blocked = i % 7 == 0;
            d.velocity_of_next = (i % 3) as f64;
            d.traffic_is_red = i % 5 < 2;
            d.current_traffic_light = if i % 11 < 6 { Some(i / 40) } else { None };
            d.current_stop_sign = if i % 13 < 4 { Some(100 + i / 50) } else { None };
            d.current_velocity = if i % 4 == 0 { 0.0 } else { 2.0 };
            d.distance_to_next = (i % 30) as f64;
            d.curr_safe_trajectory = Some((i % 4) as usize);
            now += 0.5;
            let from = m.current();
            let to = m.advance(&mut d, now);
            assert!(m.is_allowed(from, to), "{} -> {}", from, to);
        }
    }

    #[test]
    fn test_rejected_transition_keeps_state() {
        let mut m = machine();
        m.transitions.clear();
        let mut d = clear_road();
        assert_eq!(m.advance(&mut d, 0.0), BehaviorTag::Init);
        assert!(m.history().is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut m = forward_machine();
        let mut d = clear_road();
        for i in 0..(MAX_TRANSITION_HISTORY * 2) {
            d.fully_blocked = i % 2 == 0;
            m.advance(&mut d, i as f64);
        }
        assert_eq!(m.history().len(), MAX_TRANSITION_HISTORY);
    }

    #[test]
    fn test_generate_diagram_marks_current() {
        let m = forward_machine();
        let diagram = m.generate_diagram();
        assert!(diagram.contains("Current State: forward"));
        assert!(diagram.contains("mission_accomplished (terminal)"));
    }
}
