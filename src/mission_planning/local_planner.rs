/*!
 * Local behavior planner
 *
 * One call to `do_one_step` per control tick:
 * localize, refresh the current lane, score the rollouts, compute the
 * decision parameters, advance the behavior state machine, emit the
 * behavior, then select the tracked path.
 *
 * The planner keeps its own clock, advanced by the `dt` of every cycle, so
 * dwell times and steering lag are reproducible.
 */

use log::{debug, info, trace};
use std::time::{Duration, Instant};

use crate::common::{
    DetectedObject, LaneId, Path, PlannerConfig, PlannerResult, PlanningParams, Point2D, Pose2D,
    RoadNetwork, RolloutGenerator, RolloutSet, SpeedProfiler, TrajectoryScorer, VehicleState,
    Waypoint,
};
use crate::localization::KinematicEstimator;
use crate::mission_planning::behavior::{BehaviorResult, BehaviorTag, Indicator};
use crate::mission_planning::decision::{DecisionInputs, DecisionParameters};
use crate::mission_planning::state_machine::BehaviorStateMachine;
use crate::path_planning::obstacle_prediction::{calculate_obstacle_costs, CollisionPrediction};
use crate::path_planning::speed_profile::CurvatureSpeedProfiler;
use crate::path_planning::trajectory_selector::{SelectionContext, TrajectorySelector};
use crate::utils::{fix_negative_angle, velocity_ahead};

/// Look-ahead on the tracked path per unit of speed, as for km/h [m per m/s]
pub const VELOCITY_LOOK_AHEAD_FACTOR: f64 = 3.6;

/// Wall time spent in the stages of the last cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleTimings {
    pub cost_calculation: Duration,
    pub behavior_generation: Duration,
    pub rollout_generation: Duration,
}

pub struct LocalPlanner<S, G, P = CurvatureSpeedProfiler> {
    config: PlannerConfig,
    scorer: S,
    generator: G,
    profiler: P,
    estimator: KinematicEstimator,
    state_machine: BehaviorStateMachine,
    decision: DecisionParameters,
    selector: TrajectorySelector,
    reference_paths: Vec<Path>,
    pose: Waypoint,
    current_lane: Option<LaneId>,
    clock: f64,
    timings: CycleTimings,
}

impl<S, G> LocalPlanner<S, G, CurvatureSpeedProfiler>
where
    S: TrajectoryScorer,
    G: RolloutGenerator,
{
    /// Validate the configuration and build a planner in the `Init` behavior
    pub fn new(config: PlannerConfig, scorer: S, generator: G) -> PlannerResult<Self> {
        config.validate()?;
        let estimator =
            KinematicEstimator::new(config.vehicle.wheel_base, config.steering_delay_factor);
        let state_machine = BehaviorStateMachine::new(&config.planning, config.wait_time);

        Ok(LocalPlanner {
            config,
            scorer,
            generator,
            profiler: CurvatureSpeedProfiler,
            estimator,
            state_machine,
            decision: DecisionParameters::new(),
            selector: TrajectorySelector::new(),
            reference_paths: Vec::new(),
            pose: Waypoint::default(),
            current_lane: None,
            clock: 0.0,
            timings: CycleTimings::default(),
        })
    }
}

impl<S, G, P> LocalPlanner<S, G, P>
where
    S: TrajectoryScorer,
    G: RolloutGenerator,
    P: SpeedProfiler,
{
    /// Replace the speed profiler
    pub fn with_speed_profiler<Q: SpeedProfiler>(self, profiler: Q) -> LocalPlanner<S, G, Q> {
        LocalPlanner {
            config: self.config,
            scorer: self.scorer,
            generator: self.generator,
            profiler,
            estimator: self.estimator,
            state_machine: self.state_machine,
            decision: self.decision,
            selector: self.selector,
            reference_paths: self.reference_paths,
            pose: self.pose,
            current_lane: self.current_lane,
            clock: self.clock,
            timings: self.timings,
        }
    }

    /// Seed the pose estimate
    pub fn first_localize(&mut self, pose: Pose2D, lane: Option<LaneId>) {
        self.estimator.first_localize(pose);
        self.pose.pose = self.estimator.pose();
        self.pose.lane_id = lane;
        self.current_lane = lane;
    }

    /// Pose from a live localization feed, heading mapped into [0, 2PI)
    pub fn update_pose(&mut self, pose: Pose2D) {
        self.pose.pose = Pose2D::new(pose.x, pose.y, fix_negative_angle(pose.yaw));
    }

    /// Global paths the rollouts are generated around; the first is active
    pub fn set_reference_paths(&mut self, paths: Vec<Path>) {
        self.reference_paths = paths;
    }

    /// Swap in new planning parameters for every behavior
    pub fn set_planning_params(&mut self, params: PlanningParams) -> PlannerResult<()> {
        let mut config = self.config.clone();
        config.planning = params;
        config.validate()?;
        self.state_machine
            .set_behaviors_params(&config.planning, config.wait_time);
        self.config = config;
        Ok(())
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn pose(&self) -> &Waypoint {
        &self.pose
    }

    pub fn current_lane(&self) -> Option<LaneId> {
        self.current_lane
    }

    pub fn current_behavior(&self) -> BehaviorTag {
        self.state_machine.current()
    }

    pub fn state_machine(&self) -> &BehaviorStateMachine {
        &self.state_machine
    }

    pub fn decision_parameters(&self) -> &DecisionParameters {
        &self.decision
    }

    pub fn tracked_path(&self) -> &Path {
        self.selector.path()
    }

    pub fn rollouts(&self) -> &[RolloutSet] {
        self.selector.rollouts()
    }

    pub fn reference_paths(&self) -> &[Path] {
        &self.reference_paths
    }

    pub fn timings(&self) -> CycleTimings {
        self.timings
    }

    /// Planner clock [s]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Run one planning cycle
    ///
    /// Without a live feed (`live == false`) the pose is dead-reckoned from
    /// `vehicle_state` over `dt`; otherwise the pose set by `update_pose` is
    /// used as is.
    #[allow(clippy::too_many_arguments)]
    pub fn do_one_step<M>(
        &mut self,
        dt: f64,
        vehicle_state: &VehicleState,
        obstacles: &[DetectedObject],
        goal: Point2D,
        map: &M,
        emergency_stop: bool,
        green_light: bool,
        live: bool,
    ) -> BehaviorResult
    where
        M: RoadNetwork + ?Sized,
    {
        self.clock += dt;

        if !live {
            self.pose.pose = self.estimator.simulate(dt, vehicle_state, self.clock);
        }

        self.update_current_lane(map);

        let params = self.active_params();

        let timer = Instant::now();
        let best = self.scorer.score(
            self.selector.rollouts(),
            &self.reference_paths,
            &self.pose,
            self.decision.curr_safe_trajectory,
            &params,
            &self.config.vehicle,
            obstacles,
        );
        self.timings.cost_calculation = timer.elapsed();

        let timer = Instant::now();
        let stop_line = match (self.reference_paths.first(), self.current_lane) {
            (Some(reference), Some(_)) => map.distance_to_closest_stop_line(reference, &self.pose),
            _ => None,
        };
        let inputs = DecisionInputs {
            pose: &self.pose,
            speed: vehicle_state.speed,
            goal,
            emergency_stop,
            green_light,
            best_trajectory: &best,
            stop_line,
        };
        self.decision.compute(&inputs, &self.config.vehicle, &params);
        let mut behavior = self.generate_behavior(vehicle_state);
        self.timings.behavior_generation = timer.elapsed();

        let timer = Instant::now();
        behavior.new_plan = self.select_trajectory(vehicle_state);
        self.timings.rollout_generation = timer.elapsed();

        if behavior.new_plan {
            info!(
                "new plan in <{}>: {} waypoints",
                behavior.state,
                self.selector.path().len()
            );
        }
        trace!(
            "cycle timings: cost {:?}, behavior {:?}, rollouts {:?}",
            self.timings.cost_calculation,
            self.timings.behavior_generation,
            self.timings.rollout_generation
        );
        behavior
    }

    /// Run obstacle prediction against the tracked path
    ///
    /// Stamps the tracked path with time and collision costs and lowers the
    /// target velocity of waypoints an obstacle is predicted to occupy.
    pub fn predict_collisions<M>(&mut self, map: &M, obstacles: &[DetectedObject]) -> CollisionPrediction
    where
        M: RoadNetwork + ?Sized,
    {
        let mut path = self.selector.path().clone();
        let prediction = calculate_obstacle_costs(
            map,
            &mut path,
            &self.pose,
            self.decision.current_velocity,
            obstacles,
            &self.config.vehicle,
        );
        self.selector.replace_path(path);
        prediction
    }

    fn active_params(&self) -> PlanningParams {
        self.state_machine
            .current_params()
            .cloned()
            .unwrap_or_else(|| self.config.planning.clone())
    }

    /// Lane of the tracked path, else the closest lane on the map
    fn update_current_lane<M>(&mut self, map: &M)
    where
        M: RoadNetwork + ?Sized,
    {
        let lane = map
            .lane_from_path(&self.pose, self.selector.path())
            .or_else(|| map.closest_lane(&self.pose, self.config.lane_search_radius));
        if lane != self.current_lane {
            debug!("current lane {:?} -> {:?}", self.current_lane, lane);
        }
        self.current_lane = lane;
        self.pose.lane_id = lane;
    }

    fn generate_behavior(&mut self, vehicle_state: &VehicleState) -> BehaviorResult {
        let max_velocity = velocity_ahead(
            self.selector.path(),
            &self.pose,
            vehicle_state.speed * VELOCITY_LOOK_AHEAD_FACTOR,
        );
        let state = self.state_machine.advance(&mut self.decision, self.clock);

        let indicator = if self.decision.upcoming_right {
            Indicator::Right
        } else if self.decision.upcoming_left {
            Indicator::Left
        } else {
            Indicator::None
        };

        BehaviorResult {
            state,
            indicator,
            max_velocity,
            min_velocity: 0.0,
            stop_distance: self.decision.distance_to_stop(),
            follow_distance: if state == BehaviorTag::Follow {
                self.decision.distance_to_next
            } else {
                0.0
            },
            follow_velocity: self.decision.velocity_of_next,
            new_plan: false,
        }
    }

    fn select_trajectory(&mut self, vehicle_state: &VehicleState) -> bool {
        let params = self.active_params();
        let Some(reference) = self.reference_paths.first() else {
            return false;
        };
        let ctx = SelectionContext {
            reference,
            pose: &self.pose,
            speed: vehicle_state.speed,
            behavior: self.state_machine.current(),
            params: &params,
        };
        self.selector
            .select(&ctx, &mut self.decision, &self.generator, &self.profiler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Shift, StopLineInfo, TrajectoryCost};
    use std::f64::consts::{FRAC_PI_2, PI};

    struct ClearScorer;

    impl TrajectoryScorer for ClearScorer {
        fn score(
            &mut self,
            _rollouts: &[RolloutSet],
            _reference_paths: &[Path],
            _pose: &Waypoint,
            current_safe: Option<usize>,
            _params: &PlanningParams,
            _vehicle: &crate::common::VehicleInfo,
            _obstacles: &[DetectedObject],
        ) -> TrajectoryCost {
            TrajectoryCost::new(current_safe, 100.0, 0.0)
        }
    }

    struct CopyGenerator;

    impl RolloutGenerator for CopyGenerator {
        fn generate(
            &self,
            reference: &[Waypoint],
            _pose: &Waypoint,
            _speed: f64,
            params: &PlanningParams,
        ) -> RolloutSet {
            vec![reference.to_vec(); params.rollout_count]
        }
    }

    struct EmptyMap;

    impl RoadNetwork for EmptyMap {
        fn closest_lane(&self, _pose: &Waypoint, _search_radius: f64) -> Option<LaneId> {
            None
        }
        fn lane_from_path(&self, _pose: &Waypoint, _path: &[Waypoint]) -> Option<LaneId> {
            None
        }
        fn closest_lanes(&self, _pose: &Waypoint, _search_radius: f64) -> Vec<LaneId> {
            Vec::new()
        }
        fn predict_lane_paths(&self, _lane: LaneId, _pose: &Waypoint, _distance: f64) -> Vec<Path> {
            Vec::new()
        }
        fn distance_to_closest_stop_line(
            &self,
            _path: &[Waypoint],
            _pose: &Waypoint,
        ) -> Option<StopLineInfo> {
            Some(StopLineInfo {
                distance: 3.0,
                stop_line_id: 1,
                stop_sign_id: Some(1),
                traffic_light_id: None,
            })
        }
    }

    fn planner() -> LocalPlanner<ClearScorer, CopyGenerator> {
        let mut planner =
            LocalPlanner::new(PlannerConfig::default(), ClearScorer, CopyGenerator).unwrap();
        let reference = (0..100).map(|i| Waypoint::new(i as f64, 0.0, 0.0, 0.0)).collect();
        planner.set_reference_paths(vec![reference]);
        planner
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = PlannerConfig::default();
        config.vehicle.wheel_base = 0.0;
        assert!(LocalPlanner::new(config, ClearScorer, CopyGenerator).is_err());
    }

    #[test]
    fn test_first_cycle_moves_to_forward_and_plans() {
        let mut planner = planner();
        planner.first_localize(Pose2D::origin(), None);
        let result = planner.do_one_step(
            0.1,
            &VehicleState::stopped(),
            &[],
            Point2D::new(90.0, 0.0),
            &EmptyMap,
            false,
            true,
            false,
        );
        assert_eq!(result.state, BehaviorTag::Forward);
        assert!(result.new_plan);
        assert_eq!(result.indicator, Indicator::None);
        assert_eq!(planner.tracked_path().len(), 100);
        assert!((planner.clock() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_absent_lane_skips_stop_line() {
        let mut planner = planner();
        planner.first_localize(Pose2D::origin(), None);
        for _ in 0..3 {
            planner.do_one_step(
                0.1,
                &VehicleState::new(5.0, 0.0, Shift::Drive),
                &[],
                Point2D::new(90.0, 0.0),
                &EmptyMap,
                false,
                true,
                false,
            );
        }
        assert_eq!(planner.current_lane(), None);
        assert!(planner.decision_parameters().stopping_distances.is_empty());
        assert_eq!(planner.current_behavior(), BehaviorTag::Forward);
    }

    #[test]
    fn test_live_mode_keeps_external_pose() {
        let mut planner = planner();
        planner.update_pose(Pose2D::new(10.0, 0.0, 0.0));
        planner.do_one_step(
            0.5,
            &VehicleState::new(5.0, 0.0, Shift::Drive),
            &[],
            Point2D::new(90.0, 0.0),
            &EmptyMap,
            false,
            true,
            true,
        );
        assert_eq!(planner.pose().pose, Pose2D::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_live_pose_heading_is_normalized() {
        let mut planner = planner();
        planner.update_pose(Pose2D::new(1.0, 2.0, -FRAC_PI_2));
        let yaw = planner.pose().pose.yaw;
        assert!((yaw - 3.0 * FRAC_PI_2).abs() < 1e-12);

        planner.update_pose(Pose2D::new(1.0, 2.0, 5.0 * PI));
        let yaw = planner.pose().pose.yaw;
        assert!((yaw - PI).abs() < 1e-9);
        assert!((0.0..2.0 * PI).contains(&yaw));
    }

    #[test]
    fn test_simulated_mode_dead_reckons() {
        let mut planner = planner();
        planner.first_localize(Pose2D::origin(), None);
        planner.do_one_step(
            0.5,
            &VehicleState::new(2.0, 0.0, Shift::Drive),
            &[],
            Point2D::new(90.0, 0.0),
            &EmptyMap,
            false,
            true,
            false,
        );
        assert!((planner.pose().pose.x - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_set_planning_params_validates() {
        let mut planner = planner();
        let mut params = PlanningParams::default();
        params.rollout_count = 0;
        assert!(planner.set_planning_params(params).is_err());

        let mut params = PlanningParams::default();
        params.max_speed = 5.0;
        assert!(planner.set_planning_params(params).is_ok());
        assert_eq!(
            planner.state_machine().current_params().map(|p| p.max_speed),
            Some(5.0)
        );
    }
}
