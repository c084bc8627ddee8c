//! The configuration space a planner run operates in
//!
//! Owns the bounds and wrap spec, the current obstacle set, and the two work
//! stacks the engine drains every slice: nodes whose incident edges must be
//! re-checked against the obstacles, and deleted nodes whose position became
//! free again and should be re-sampled.

use rand::Rng;

use crate::common::{NodeId, Position, RrtxResult};
use crate::path_planning::rrtx::config::{DistanceKind, PlannerConfig};
use crate::path_planning::rrtx::distance::{euclidean, r3s, wrapped_euclidean, DistanceFn, Wrapping};
use crate::path_planning::rrtx::neighbor_list::NeighborList;
use crate::path_planning::rrtx::obstacle::ObstacleSet;

pub struct ConfigSpace {
    dims: usize,
    lower_bounds: Position,
    upper_bounds: Position,
    wrapping: Wrapping,
    distance: DistanceFn,
    start: Position,
    goal: Position,
    delta: f64,
    ball_constant: f64,
    pub robot_radius: f64,
    pub p_goal: f64,
    pub obstacles: ObstacleSet,
    /// Nodes whose incident edges need re-checking
    pub obstacle_stack: NeighborList<NodeId>,
    /// Deleted nodes to retry before fresh sampling
    pub sample_stack: NeighborList<NodeId>,
    /// Node the robot is currently steering toward
    pub move_goal: Option<NodeId>,
}

impl ConfigSpace {
    pub fn from_config(config: &PlannerConfig) -> RrtxResult<Self> {
        config.validate()?;
        let lower_bounds = Position::from_row_slice(&config.lower_bounds);
        let upper_bounds = Position::from_row_slice(&config.upper_bounds);
        let wrapping = Wrapping::new(&config.wraps, &lower_bounds);
        let distance = match config.distance {
            DistanceKind::Euclidean => euclidean(),
            DistanceKind::WrappedEuclidean => wrapped_euclidean(wrapping.clone()),
            DistanceKind::R3s => r3s(),
        };
        let start = wrapping.normalized(&Position::from_row_slice(&config.start));
        let goal = wrapping.normalized(&Position::from_row_slice(&config.goal));

        Ok(ConfigSpace {
            dims: config.dims(),
            lower_bounds,
            upper_bounds,
            wrapping,
            distance,
            start,
            goal,
            delta: config.delta,
            ball_constant: config.ball_constant,
            robot_radius: config.robot_radius,
            p_goal: config.p_goal,
            obstacles: ObstacleSet::new(),
            obstacle_stack: NeighborList::new(),
            sample_stack: NeighborList::new(),
            move_goal: None,
        })
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn lower_bounds(&self) -> &Position {
        &self.lower_bounds
    }

    pub fn upper_bounds(&self) -> &Position {
        &self.upper_bounds
    }

    pub fn wrapping(&self) -> &Wrapping {
        &self.wrapping
    }

    pub fn distance_fn(&self) -> DistanceFn {
        self.distance.clone()
    }

    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        (self.distance)(a, b)
    }

    /// Robot start configuration
    pub fn start(&self) -> &Position {
        &self.start
    }

    /// Robot destination, root of the search tree
    pub fn goal(&self) -> &Position {
        &self.goal
    }

    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Rewiring ball radius for a tree of `n` nodes:
    /// `min(delta, ball_constant * (ln(1 + n) / n)^(1/d))`
    pub fn ball_radius(&self, n: usize) -> f64 {
        if n == 0 {
            return self.delta;
        }
        let n = n as f64;
        let shrinking = self.ball_constant * ((1.0 + n).ln() / n).powf(1.0 / self.dims as f64);
        self.delta.min(shrinking)
    }

    /// Uniform sample over the bounds, wrapped coordinates normalised
    pub fn random_position<R: Rng>(&self, rng: &mut R) -> Position {
        let mut p = Position::from_fn(self.dims, |i, _| rng.gen_range(self.lower_bounds[i]..self.upper_bounds[i]));
        self.wrapping.normalize(&mut p);
        p
    }

    pub fn normalize(&self, position: &mut Position) {
        self.wrapping.normalize(position);
    }

    /// Whether a robot at `position` clears every obstacle
    pub fn point_free(&self, position: &Position) -> bool {
        self.obstacles.point_free(position, self.robot_radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleId};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::f64::consts::PI;

    #[test]
    fn test_start_and_goal_normalised() {
        let space = ConfigSpace::from_config(&PlannerConfig::default()).unwrap();
        // -3pi/4 lands in [0, 2pi)
        assert!((space.start()[2] - 5.0 * PI / 4.0).abs() < 1e-12);
        assert!((space.goal()[2] - 5.0 * PI / 4.0).abs() < 1e-12);
        assert_eq!(space.dims(), 3);
    }

    #[test]
    fn test_ball_radius_shrinks_and_is_capped() {
        let space = ConfigSpace::from_config(&PlannerConfig::default()).unwrap();
        assert_eq!(space.ball_radius(0), 10.0);
        assert_eq!(space.ball_radius(1), 10.0);
        let r_large = space.ball_radius(10_000_000);
        assert!(r_large < 10.0);
        assert!(space.ball_radius(100_000_000) < r_large);
    }

    #[test]
    fn test_random_positions_within_bounds() {
        let space = ConfigSpace::from_config(&PlannerConfig::default()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..200 {
            let p = space.random_position(&mut rng);
            for i in 0..3 {
                assert!(p[i] >= space.lower_bounds()[i] && p[i] < space.upper_bounds()[i]);
            }
        }
    }

    #[test]
    fn test_point_free_uses_robot_radius() {
        let mut space = ConfigSpace::from_config(&PlannerConfig::default()).unwrap();
        space.obstacles.insert(ObstacleId(0), CircleObstacle::new(0.0, 0.0, 1.0));
        assert!(!space.point_free(&Position::from_row_slice(&[1.4, 0.0, 0.0])));
        assert!(space.point_free(&Position::from_row_slice(&[1.6, 0.0, 0.0])));
    }
}
