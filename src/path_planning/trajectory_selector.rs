//! Tracked path selection
//!
//! Keeps the latest rollout sets and the path the vehicle currently tracks.
//! Rollouts are regenerated when none exist, when the vehicle has passed the
//! middle of the tracked path, when a replan is requested, or while swerving.
//! A regeneration builds the whole new state first and replaces the old one
//! in a single step.

use log::{debug, warn};

use crate::common::{Path, PlanningParams, RolloutGenerator, RolloutSet, SpeedProfiler, Waypoint};
use crate::mission_planning::behavior::BehaviorTag;
use crate::mission_planning::decision::DecisionParameters;
use crate::utils::closest_point_index;

/// Data weight of the speed smoothing pass
pub const SPEED_SMOOTH_DATA_WEIGHT: f64 = 0.15;
/// Smooth weight of the speed smoothing pass
pub const SPEED_SMOOTH_WEIGHT: f64 = 0.35;
/// Convergence tolerance of the speed smoothing pass
pub const SPEED_SMOOTH_TOLERANCE: f64 = 0.1;

/// Inputs of one selection pass
#[derive(Debug, Clone, Copy)]
pub struct SelectionContext<'a> {
    /// Reference path the rollouts are generated around
    pub reference: &'a [Waypoint],
    pub pose: &'a Waypoint,
    pub speed: f64,
    pub behavior: BehaviorTag,
    /// Parameters of the active behavior
    pub params: &'a PlanningParams,
}

#[derive(Debug, Clone, Default)]
pub struct TrajectorySelector {
    /// One rollout set per lane considered; only the first is produced
    rollouts: Vec<RolloutSet>,
    path: Path,
}

impl TrajectorySelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rollouts(&self) -> &[RolloutSet] {
        &self.rollouts
    }

    /// Path currently tracked, empty before the first selection
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the tracked path, keeping the rollouts
    pub fn replace_path(&mut self, path: Path) {
        self.path = path;
    }

    /// Whether this cycle must produce fresh rollouts
    pub fn needs_regeneration(&self, pose: &Waypoint, behavior: BehaviorTag, replan: bool) -> bool {
        let has_rollouts = self.rollouts.first().map_or(false, |set| !set.is_empty());
        let index_limit = self.path.len() / 2;
        let current_index = closest_point_index(&self.path, pose);

        !has_rollouts || current_index > index_limit || replan || behavior.is_obstacle_avoidance()
    }

    /// Regenerate and pick the tracked path when a trigger fires
    ///
    /// Returns true when a new path was selected. The chosen index is stored
    /// as the previous safe trajectory and the replan request is cleared.
    pub fn select<G, P>(
        &mut self,
        ctx: &SelectionContext<'_>,
        decision: &mut DecisionParameters,
        generator: &G,
        profiler: &P,
    ) -> bool
    where
        G: RolloutGenerator + ?Sized,
        P: SpeedProfiler + ?Sized,
    {
        if ctx.reference.is_empty() {
            return false;
        }
        if !self.needs_regeneration(ctx.pose, ctx.behavior, decision.replan) {
            return false;
        }

        let fresh = generator.generate(ctx.reference, ctx.pose, ctx.speed, ctx.params);
        if fresh.is_empty() {
            warn!("rollout generator returned no rollouts, keeping the current path");
            return false;
        }

        let index = select_index(&fresh, decision, ctx.behavior);
        decision.replan = false;
        decision.prev_safe_trajectory = Some(index);

        let mut path = fresh[index].clone();
        profiler.generate_recommended_speed(&mut path, ctx.params.max_speed, ctx.params.speed_profile_factor);
        profiler.smooth_speed_profile(
            &mut path,
            SPEED_SMOOTH_DATA_WEIGHT,
            SPEED_SMOOTH_WEIGHT,
            SPEED_SMOOTH_TOLERANCE,
        );

        debug!(
            "selected rollout {} of {} ({} waypoints)",
            index,
            fresh.len(),
            path.len()
        );
        self.commit(fresh, path);
        true
    }

    fn commit(&mut self, rollouts: RolloutSet, path: Path) {
        match self.rollouts.first_mut() {
            Some(first) => *first = rollouts,
            None => self.rollouts.push(rollouts),
        }
        self.path = path;
    }
}

/// Safe rollout while avoiding and in range, the central one otherwise
///
/// A central index outside a small set falls back to the set's middle.
pub fn select_index(rollouts: &RolloutSet, decision: &DecisionParameters, behavior: BehaviorTag) -> usize {
    let count = rollouts.len();
    let central = if decision.central_trajectory < count {
        decision.central_trajectory
    } else {
        count / 2
    };

    match decision.curr_safe_trajectory {
        Some(safe) if safe < count && behavior.is_obstacle_avoidance() => safe,
        _ => central,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_planning::speed_profile::CurvatureSpeedProfiler;
    use std::cell::Cell;

    struct OffsetGenerator {
        count: usize,
        calls: Cell<usize>,
    }

    impl OffsetGenerator {
        fn new(count: usize) -> Self {
            Self { count, calls: Cell::new(0) }
        }
    }

    impl RolloutGenerator for OffsetGenerator {
        fn generate(
            &self,
            reference: &[Waypoint],
            _pose: &Waypoint,
            _speed: f64,
            _params: &PlanningParams,
        ) -> RolloutSet {
            self.calls.set(self.calls.get() + 1);
            (0..self.count)
                .map(|k| {
                    reference
                        .iter()
                        .map(|wp| Waypoint::new(wp.pose.x, wp.pose.y + k as f64, wp.pose.yaw, wp.v))
                        .collect()
                })
                .collect()
        }
    }

    fn reference() -> Path {
        (0..40).map(|i| Waypoint::new(i as f64, 0.0, 0.0, 0.0)).collect()
    }

    fn decision(central: usize, safe: usize) -> DecisionParameters {
        DecisionParameters {
            central_trajectory: central,
            curr_safe_trajectory: Some(safe),
            prev_safe_trajectory: Some(central),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_selection_uses_central() {
        let reference = reference();
        let pose = Waypoint::new(0.0, 0.0, 0.0, 0.0);
        let params = PlanningParams::default();
        let generator = OffsetGenerator::new(4);
        let mut selector = TrajectorySelector::new();
        let mut d = decision(2, 3);
        let ctx = SelectionContext {
            reference: &reference,
            pose: &pose,
            speed: 0.0,
            behavior: BehaviorTag::Forward,
            params: &params,
        };
        assert!(selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler));
        assert_eq!(selector.rollouts().len(), 1);
        assert_eq!(selector.rollouts()[0].len(), 4);
        assert!(selector.path().iter().all(|wp| wp.pose.y == 2.0));
        assert!(selector.path().iter().all(|wp| wp.v == params.max_speed));
        assert_eq!(d.prev_safe_trajectory, Some(2));

        // nothing triggers on the next cycle
        assert!(!selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler));
        assert_eq!(generator.calls.get(), 1);
    }

    #[test]
    fn test_swerve_uses_safe_index() {
        let reference = reference();
        let pose = Waypoint::new(0.0, 0.0, 0.0, 0.0);
        let params = PlanningParams::default();
        let generator = OffsetGenerator::new(4);
        let mut selector = TrajectorySelector::new();
        let mut d = decision(2, 3);
        let ctx = SelectionContext {
            reference: &reference,
            pose: &pose,
            speed: 1.0,
            behavior: BehaviorTag::Swerve,
            params: &params,
        };
        assert!(selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler));
        assert!(selector.path().iter().all(|wp| wp.pose.y == 3.0));
        assert_eq!(d.prev_safe_trajectory, Some(3));

        // swerving regenerates every cycle
        assert!(selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler));
        assert_eq!(generator.calls.get(), 2);
    }

    #[test]
    fn test_out_of_range_safe_index_falls_back_to_central() {
        let mut d = decision(1, 5);
        let set: RolloutSet = vec![reference(); 3];
        assert_eq!(select_index(&set, &d, BehaviorTag::Swerve), 1);

        // central beyond a tiny set
        d.central_trajectory = 4;
        let small: RolloutSet = vec![reference(); 2];
        assert_eq!(select_index(&small, &d, BehaviorTag::Swerve), 1);
        let single: RolloutSet = vec![reference()];
        assert_eq!(select_index(&single, &d, BehaviorTag::Forward), 0);
    }

    #[test]
    fn test_replan_and_drift_trigger_regeneration() {
        let reference = reference();
        let params = PlanningParams::default();
        let generator = OffsetGenerator::new(4);
        let mut selector = TrajectorySelector::new();
        let mut d = decision(2, 2);
        let start = Waypoint::new(0.0, 0.0, 0.0, 0.0);
        let ctx = SelectionContext {
            reference: &reference,
            pose: &start,
            speed: 0.0,
            behavior: BehaviorTag::Forward,
            params: &params,
        };
        selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler);

        d.replan = true;
        assert!(selector.select(&ctx, &mut d, &generator, &CurvatureSpeedProfiler));
        assert!(!d.replan);

        // past the middle of a 40 point path
        let ahead = Waypoint::new(21.0, 2.0, 0.0, 0.0);
        assert!(selector.needs_regeneration(&ahead, BehaviorTag::Forward, false));
        let middle = Waypoint::new(20.0, 2.0, 0.0, 0.0);
        assert!(!selector.needs_regeneration(&middle, BehaviorTag::Forward, false));
    }

    #[test]
    fn test_empty_inputs_are_skipped() {
        let params = PlanningParams::default();
        let pose = Waypoint::new(0.0, 0.0, 0.0, 0.0);
        let mut selector = TrajectorySelector::new();
        let mut d = decision(2, 2);

        let empty: Path = Vec::new();
        let ctx = SelectionContext {
            reference: &empty,
            pose: &pose,
            speed: 0.0,
            behavior: BehaviorTag::Forward,
            params: &params,
        };
        assert!(!selector.select(&ctx, &mut d, &OffsetGenerator::new(4), &CurvatureSpeedProfiler));

        let reference = reference();
        let ctx = SelectionContext { reference: &reference, ..ctx };
        assert!(!selector.select(&ctx, &mut d, &OffsetGenerator::new(0), &CurvatureSpeedProfiler));
        assert!(selector.path().is_empty());
        assert!(selector.rollouts().is_empty());
    }
}
