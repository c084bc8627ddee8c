//! Straight-line edges
//!
//! Interpolation follows the short way around every wrapped dimension, so an
//! edge between headings 0.1 and 2*pi - 0.1 is 0.2 long rather than 2*pi - 0.2.

use std::sync::Arc;

use crate::common::{EdgeModel, Point2D, Position, Trajectory};
use crate::path_planning::rrtx::distance::{DistanceFn, Wrapping};
use crate::path_planning::rrtx::obstacle::ObstacleSet;

/// Builds [`StraightEdge`]s under one metric and wrapping
#[derive(Clone)]
pub struct StraightLineModel {
    wrapping: Arc<Wrapping>,
    distance: DistanceFn,
    velocity: f64,
}

impl StraightLineModel {
    pub fn new(wrapping: Wrapping, distance: DistanceFn, velocity: f64) -> Self {
        Self {
            wrapping: Arc::new(wrapping),
            distance,
            velocity,
        }
    }
}

impl EdgeModel for StraightLineModel {
    type Edge = StraightEdge;

    fn connect(&self, from: &Position, to: &Position) -> StraightEdge {
        StraightEdge {
            start: from.clone(),
            end: to.clone(),
            direction: self.wrapping.difference(from, to),
            length: (self.distance)(from, to),
            velocity: self.velocity,
            wrapping: Arc::clone(&self.wrapping),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StraightEdge {
    start: Position,
    end: Position,
    // unwrapped displacement start -> end
    direction: Position,
    length: f64,
    velocity: f64,
    wrapping: Arc<Wrapping>,
}

impl Trajectory for StraightEdge {
    fn start(&self) -> &Position {
        &self.start
    }

    fn end(&self) -> &Position {
        &self.end
    }

    fn length(&self) -> f64 {
        self.length
    }

    fn feasible(&self, obstacles: &ObstacleSet, robot_radius: f64) -> bool {
        if obstacles.is_empty() {
            return true;
        }
        // the sweep is checked from both endpoints so that an edge crossing a
        // wrap seam is tested against both images of the plane
        let from_start = (
            Point2D::from_position(&self.start),
            Point2D::from_position(&(&self.start + &self.direction)),
        );
        let into_end = (
            Point2D::from_position(&(&self.end - &self.direction)),
            Point2D::from_position(&self.end),
        );
        obstacles.segment_free(from_start.0, from_start.1, robot_radius)
            && (from_start == into_end || obstacles.segment_free(into_end.0, into_end.1, robot_radius))
    }

    fn saturate(&self, max_length: f64) -> Self {
        if self.length <= max_length {
            return self.clone();
        }
        let ratio = max_length / self.length;
        let direction = &self.direction * ratio;
        let end = self.wrapping.normalized(&(&self.start + &direction));
        StraightEdge {
            start: self.start.clone(),
            end,
            direction,
            length: max_length,
            velocity: self.velocity,
            wrapping: Arc::clone(&self.wrapping),
        }
    }

    fn pose_at_distance(&self, distance: f64) -> Position {
        if self.length <= 0.0 || distance >= self.length {
            return self.end.clone();
        }
        if distance <= 0.0 {
            return self.start.clone();
        }
        let ratio = distance / self.length;
        self.wrapping.normalized(&(&self.start + &self.direction * ratio))
    }

    fn pose_at_time(&self, time: f64) -> Position {
        self.pose_at_distance(time * self.velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::WrapSpec;
    use crate::path_planning::rrtx::distance::{euclidean, wrapped_euclidean};
    use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleId};
    use nalgebra::DVector;
    use std::f64::consts::PI;

    fn pos(v: &[f64]) -> Position {
        DVector::from_row_slice(v)
    }

    fn plain_model() -> StraightLineModel {
        StraightLineModel::new(Wrapping::none(), euclidean(), 2.0)
    }

    #[test]
    fn test_length_and_interpolation() {
        let edge = plain_model().connect(&pos(&[0.0, 0.0]), &pos(&[3.0, 4.0]));
        assert!((edge.length() - 5.0).abs() < 1e-12);
        assert!((edge.cost() - 5.0).abs() < 1e-12);
        let mid = edge.pose_at_distance(2.5);
        assert!((mid[0] - 1.5).abs() < 1e-12 && (mid[1] - 2.0).abs() < 1e-12);
        // 2 m/s for 1 s
        let p = edge.pose_at_time(1.0);
        assert!((p[0] - 1.2).abs() < 1e-12 && (p[1] - 1.6).abs() < 1e-12);
        assert_eq!(edge.pose_at_distance(10.0), pos(&[3.0, 4.0]));
    }

    #[test]
    fn test_saturation_law() {
        let from = pos(&[1.0, 1.0]);
        let edge = plain_model().connect(&from, &pos(&[31.0, -39.0]));
        let short = edge.saturate(10.0);
        let d = euclidean();
        assert!((d(&from, short.end()) - 10.0).abs() < 1e-9);
        assert!((short.length() - 10.0).abs() < 1e-12);
        // direction preserved
        let dir = (short.end() - &from) / 10.0;
        let full = (edge.end() - &from) / edge.length();
        assert!((dir - full).norm() < 1e-9);
        // short edges are unchanged
        assert_eq!(short.saturate(20.0).end(), short.end());
    }

    #[test]
    fn test_wrapped_interpolation() {
        let lower = pos(&[0.0, 0.0]);
        let wrapping = Wrapping::new(&[WrapSpec::new(1, 2.0 * PI)], &lower);
        let model = StraightLineModel::new(wrapping.clone(), wrapped_euclidean(wrapping), 1.0);
        let edge = model.connect(&pos(&[0.0, 0.1]), &pos(&[0.0, 2.0 * PI - 0.1]));
        assert!((edge.length() - 0.2).abs() < 1e-9);
        let mid = edge.pose_at_distance(0.15);
        assert!((mid[1] - (2.0 * PI - 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_feasibility_against_circles() {
        let model = plain_model();
        let mut obstacles = ObstacleSet::new();
        obstacles.insert(ObstacleId(0), CircleObstacle::new(5.0, 0.0, 1.0));

        let blocked = model.connect(&pos(&[0.0, 0.0]), &pos(&[10.0, 0.0]));
        assert!(!blocked.feasible(&obstacles, 0.5));

        let clear = model.connect(&pos(&[0.0, 2.0]), &pos(&[10.0, 2.0]));
        assert!(clear.feasible(&obstacles, 0.5));
        // robot radius inflates the obstacle
        assert!(!clear.feasible(&obstacles, 1.5));
        assert!(blocked.feasible(&ObstacleSet::new(), 0.5));
    }
}
