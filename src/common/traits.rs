//! Common traits defining the pluggable collaborators of the planner

use std::fmt::Debug;

use crate::common::types::Position;
use crate::path_planning::rrtx::obstacle::ObstacleSet;

/// A directed trajectory between two configurations
///
/// Implementations must be deterministic: the same endpoints and the same
/// obstacle state always give the same answers.
pub trait Trajectory: Debug {
    /// Configuration the trajectory leaves from
    fn start(&self) -> &Position;

    /// Configuration the trajectory arrives at
    fn end(&self) -> &Position;

    /// Arc length of the trajectory
    fn length(&self) -> f64;

    /// Cost of traversing the trajectory
    fn cost(&self) -> f64 {
        self.length()
    }

    /// Whether the robot can follow the trajectory without touching an obstacle
    fn feasible(&self, obstacles: &ObstacleSet, robot_radius: f64) -> bool;

    /// Same trajectory truncated to at most `max_length`, direction preserved
    fn saturate(&self, max_length: f64) -> Self
    where
        Self: Sized;

    /// Configuration reached after travelling `distance` along the trajectory
    fn pose_at_distance(&self, distance: f64) -> Position;

    /// Configuration reached after travelling for `time` seconds
    fn pose_at_time(&self, time: f64) -> Position;
}

/// Factory for the trajectories of one vehicle model
pub trait EdgeModel {
    type Edge: Trajectory;

    /// Build the trajectory from `from` to `to`
    fn connect(&self, from: &Position, to: &Position) -> Self::Edge;

    /// Farthest planar distance an edge of a ball of size `delta` can stray
    /// from its start node
    fn reach(&self, delta: f64) -> f64 {
        delta
    }
}
