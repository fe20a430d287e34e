// Local behavior planner simulation on a straight road
// with a slow vehicle ahead, a parked car and a traffic light.
//
// usage: behavior_sim [config.yaml]
// RUST_LOG=debug shows behavior transitions.

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use behavior_planner::common::{LaneId, RolloutSet, Shift, StopLineInfo, TrafficLight, TrajectoryCost};
use behavior_planner::mission_planning::next_traffic_light;
use behavior_planner::utils::{closest_point_index, colors, PathStyle, PointStyle, Visualizer};
use behavior_planner::{
    BehaviorTag, DetectedObject, LocalPlanner, Path, PlannerConfig, PlannerError, PlannerResult,
    PlanningParams, Point2D, Pose2D, RoadNetwork, RolloutGenerator, TrajectoryScorer, VehicleInfo,
    VehicleState, Waypoint,
};

const ROAD_LENGTH: f64 = 200.0;
const LANE_ID: LaneId = 1;
const STOP_LINE_X: f64 = 120.0;
const TRAFFIC_LIGHT_ID: i32 = 1;
const RED_UNTIL: f64 = 70.0;
const SIM_TIME: f64 = 200.0;
const DT: f64 = 0.1;
const LOOK_AHEAD: f64 = 5.0;
const ROLLOUT_SPACING: f64 = 3.0;

/// Single straight lane along the x axis with one stop line
struct StraightRoad;

impl RoadNetwork for StraightRoad {
    fn closest_lane(&self, pose: &Waypoint, search_radius: f64) -> Option<LaneId> {
        self.closest_lanes(pose, search_radius).first().copied()
    }

    fn lane_from_path(&self, pose: &Waypoint, path: &[Waypoint]) -> Option<LaneId> {
        if path.is_empty() {
            return None;
        }
        let wp = &path[closest_point_index(path, pose)];
        if wp.distance(pose) < 1.0 {
            wp.lane_id
        } else {
            None
        }
    }

    fn closest_lanes(&self, pose: &Waypoint, search_radius: f64) -> Vec<LaneId> {
        if pose.pose.y.abs() <= search_radius && (0.0..=ROAD_LENGTH).contains(&pose.pose.x) {
            vec![LANE_ID]
        } else {
            Vec::new()
        }
    }

    fn predict_lane_paths(&self, lane: LaneId, pose: &Waypoint, distance: f64) -> Vec<Path> {
        let end = (pose.pose.x + distance).min(ROAD_LENGTH);
        let n = ((end - pose.pose.x) / 0.5).max(0.0) as usize;
        vec![(0..=n)
            .map(|i| Waypoint::new(pose.pose.x + i as f64 * 0.5, 0.0, 0.0, 0.0).with_lane(lane))
            .collect()]
    }

    fn distance_to_closest_stop_line(
        &self,
        _path: &[Waypoint],
        pose: &Waypoint,
    ) -> Option<StopLineInfo> {
        let distance = STOP_LINE_X - pose.pose.x;
        (distance > 0.0).then_some(StopLineInfo {
            distance,
            stop_line_id: 1,
            stop_sign_id: None,
            traffic_light_id: Some(TRAFFIC_LIGHT_ID),
        })
    }
}

/// Rollouts shifted sideways from the reference, rightmost first
struct LateralOffsetGenerator;

impl RolloutGenerator for LateralOffsetGenerator {
    fn generate(
        &self,
        reference: &[Waypoint],
        pose: &Waypoint,
        _speed: f64,
        params: &PlanningParams,
    ) -> RolloutSet {
        let start = closest_point_index(reference, pose);
        let count = (params.plan_distance / params.path_density) as usize;
        let central = params.central_trajectory() as f64;
        (0..params.rollout_count)
            .map(|k| {
                let offset = (k as f64 - central) * ROLLOUT_SPACING;
                reference
                    .iter()
                    .skip(start)
                    .take(count)
                    .map(|wp| {
                        // fan out over the tip margin
                        let along = wp.pose.x - pose.pose.x;
                        let blend = (along / params.car_tip_margin).clamp(0.0, 1.0);
                        let y = pose.pose.y + (offset - pose.pose.y) * blend;
                        Waypoint::new(wp.pose.x, y, 0.0, 0.0).with_lane(LANE_ID)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Marks rollouts blocked by obstacles and prefers the current one
struct CorridorScorer;

impl TrajectoryScorer for CorridorScorer {
    fn score(
        &mut self,
        rollouts: &[RolloutSet],
        _reference_paths: &[Path],
        pose: &Waypoint,
        current_safe: Option<usize>,
        params: &PlanningParams,
        vehicle: &VehicleInfo,
        obstacles: &[DetectedObject],
    ) -> TrajectoryCost {
        let Some(set) = rollouts.first().filter(|s| !s.is_empty()) else {
            return TrajectoryCost::new(current_safe, params.plan_distance, 0.0);
        };

        let clearance = vehicle.half_width() + 0.5;
        let blocking: Vec<Option<(f64, f64)>> = set
            .iter()
            .map(|rollout| {
                obstacles
                    .iter()
                    .filter(|o| {
                        let ahead = o.center.pose.x - pose.pose.x;
                        ahead > 0.0
                            && ahead < params.plan_distance
                            && o.contour_points().iter().any(|p| {
                                rollout.iter().any(|wp| wp.position().distance(p) < clearance)
                            })
                    })
                    .map(|o| (o.center.pose.x - pose.pose.x - vehicle.half_length(), o.center.v))
                    .min_by(|a, b| a.0.total_cmp(&b.0))
            })
            .collect();

        let preferred = current_safe.unwrap_or(params.central_trajectory());
        let best = (0..set.len())
            .filter(|&i| blocking[i].is_none())
            .min_by_key(|&i| (i as i64 - preferred as i64).abs());
        let closest = blocking
            .iter()
            .flatten()
            .copied()
            .min_by(|a, b| a.0.total_cmp(&b.0));

        match closest {
            Some((distance, velocity)) => TrajectoryCost::new(best, distance.max(0.0), velocity),
            None => TrajectoryCost::new(best, params.plan_distance, 0.0),
        }
    }
}

fn box_contour(x: f64, y: f64, vehicle: &VehicleInfo) -> Vec<Point2D> {
    vehicle.footprint_at(&Pose2D::new(x, y, 0.0))
}

/// Pure pursuit on the tracked path
fn steering_toward(path: &[Waypoint], pose: &Pose2D, wheel_base: f64) -> f64 {
    let Some(target) = path
        .iter()
        .find(|wp| wp.pose.x - pose.x > LOOK_AHEAD)
        .or(path.last())
    else {
        return 0.0;
    };
    let alpha = (target.pose.y - pose.y).atan2(target.pose.x - pose.x) - pose.yaw;
    let ld = target.pose.distance(pose).max(1e-3);
    (2.0 * wheel_base * alpha.sin()).atan2(ld)
}

fn target_speed(state: BehaviorTag, max_velocity: f64, follow_velocity: f64) -> f64 {
    match state {
        BehaviorTag::Forward | BehaviorTag::Swerve => max_velocity,
        BehaviorTag::Follow => follow_velocity.min(max_velocity),
        _ => 0.0,
    }
}

fn main() -> PlannerResult<()> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PlannerConfig::from_yaml_file(path)?,
        None => PlannerConfig::default(),
    };
    let vehicle = config.vehicle.clone();
    let max_steer = vehicle.max_steer_angle;
    let max_decel = vehicle.max_deceleration.abs();

    let mut planner = LocalPlanner::new(config, CorridorScorer, LateralOffsetGenerator)?;
    let reference: Path = (0..=(ROAD_LENGTH / 0.5) as usize)
        .map(|i| Waypoint::new(i as f64 * 0.5, 0.0, 0.0, 0.0).with_lane(LANE_ID))
        .collect();
    planner.set_reference_paths(vec![reference.clone()]);
    planner.first_localize(Pose2D::origin(), Some(LANE_ID));

    let goal = Point2D::new(190.0, 0.0);
    let lights = [TrafficLight {
        id: TRAFFIC_LIGHT_ID,
        pose: Pose2D::new(STOP_LINE_X, 0.0, 0.0),
        stopping_distance: 40.0,
    }];

    // slow car ahead, parked car further down
    let mut slow_x = 30.0;
    let slow_v = 1.5;
    let parked_x = 90.0;

    let mut rng = StdRng::seed_from_u64(42);
    let noise =
        Normal::new(0.0, 0.05).map_err(|e| PlannerError::InvalidParameter(e.to_string()))?;

    let mut command = VehicleState::new(0.0, 0.0, Shift::Drive);
    let mut driven: Vec<Point2D> = Vec::new();
    let mut last_state = BehaviorTag::Init;
    let mut time = 0.0;
    let mut obstacles = Vec::new();
    let mut predicted: Vec<Path> = Vec::new();

    while time < SIM_TIME {
        time += DT;
        slow_x += slow_v * DT;

        obstacles = vec![
            DetectedObject::new(
                1,
                Waypoint::new(slow_x + noise.sample(&mut rng), noise.sample(&mut rng), 0.0, slow_v),
                box_contour(slow_x, 0.0, &vehicle),
            ),
            DetectedObject::new(
                2,
                Waypoint::new(parked_x + noise.sample(&mut rng), 0.0, 0.0, 0.0),
                box_contour(parked_x, 0.0, &vehicle),
            ),
        ];
        // the slow car turns off the road
        if slow_x > 80.0 {
            obstacles.remove(0);
        }

        let pose = planner.pose().pose;
        let consumed = planner.decision_parameters().prev_traffic_light;
        let green = next_traffic_light(&pose, consumed, &lights).is_none() || time > RED_UNTIL;

        let behavior =
            planner.do_one_step(DT, &command, &obstacles, goal, &StraightRoad, false, green, false);

        if behavior.new_plan {
            let prediction = planner.predict_collisions(&StraightRoad, &obstacles);
            if prediction.collision_detected {
                info!("t={:.1} predicted conflict on the new plan", time);
            }
            predicted = prediction.predicted_paths;
        }

        if behavior.state != last_state {
            info!(
                "t={:.1} x={:.1} {} -> {} (stop {:.1}, follow {:.1})",
                time, pose.x, last_state, behavior.state, behavior.stop_distance, behavior.follow_distance
            );
            last_state = behavior.state;
        }

        let target = target_speed(behavior.state, behavior.max_velocity, behavior.follow_velocity);
        let dv = (target - command.speed).clamp(-max_decel * DT, 1.0 * DT);
        command.speed = (command.speed + dv).max(0.0);
        command.steer = steering_toward(planner.tracked_path(), &pose, vehicle.wheel_base)
            .clamp(-max_steer, max_steer);

        driven.push(pose.position());
        if behavior.state == BehaviorTag::MissionAccomplished {
            break;
        }
    }

    info!("finished in <{}> after {:.1}s", planner.current_behavior(), time);
    for transition in planner.state_machine().history() {
        info!("  {:.1}s {} -> {}", transition.at, transition.from, transition.to);
    }

    std::fs::create_dir_all("img")?;
    let mut vis = Visualizer::new();
    vis.set_title("Local behavior planner")
        .set_aspect_ratio(None)
        .plot_path(&reference, &PathStyle::new(colors::REFERENCE, "Reference"));
    if let Some(set) = planner.rollouts().first() {
        vis.plot_rollouts(set);
    }
    vis.plot_path(planner.tracked_path(), &PathStyle::default())
        .plot_points(&driven, &PointStyle::new(colors::BLUE, "Driven").with_size(0.3))
        .plot_obstacles(&obstacles)
        .plot_predictions(&predicted)
        .plot_goal(goal)
        .plot_vehicle(&planner.pose().pose, &vehicle);
    vis.save_png("img/behavior_sim.png", 1200, 400)?;
    info!("plot saved to img/behavior_sim.png");

    Ok(())
}
