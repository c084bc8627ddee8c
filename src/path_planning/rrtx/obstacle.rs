//! Circular obstacles in the (x, y) plane and the events that change them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::common::{Point2D, Position};

/// Caller-chosen obstacle identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObstacleId(pub usize);

/// Circular obstacle (x, y, radius)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircleObstacle {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
}

impl CircleObstacle {
    pub fn new(x: f64, y: f64, radius: f64) -> Self {
        Self { x, y, radius }
    }

    pub fn center(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    /// Whether a robot of radius `inflation` at `position` overlaps the obstacle
    pub fn collides_point(&self, position: &Position, inflation: f64) -> bool {
        Point2D::from_position(position).distance(&self.center()) <= self.radius + inflation
    }

    /// Whether a robot of radius `inflation` sweeping the segment `a -> b` overlaps the obstacle
    pub fn collides_segment(&self, a: Point2D, b: Point2D, inflation: f64) -> bool {
        let (dx, dy) = (b.x - a.x, b.y - a.y);
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq > 0.0 {
            (((self.x - a.x) * dx + (self.y - a.y) * dy) / len_sq).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let closest = Point2D::new(a.x + t * dx, a.y + t * dy);
        closest.distance(&self.center()) <= self.radius + inflation
    }
}

/// Change to the obstacle set, fed to the planner between slices
#[derive(Debug, Clone, PartialEq)]
pub enum ObstacleEvent {
    Added(ObstacleId, CircleObstacle),
    Removed(ObstacleId),
}

#[derive(Debug, Clone, Default)]
pub struct ObstacleSet {
    obstacles: BTreeMap<ObstacleId, CircleObstacle>,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an obstacle, returning the replaced one
    pub fn insert(&mut self, id: ObstacleId, obstacle: CircleObstacle) -> Option<CircleObstacle> {
        self.obstacles.insert(id, obstacle)
    }

    pub fn remove(&mut self, id: ObstacleId) -> Option<CircleObstacle> {
        self.obstacles.remove(&id)
    }

    pub fn get(&self, id: ObstacleId) -> Option<&CircleObstacle> {
        self.obstacles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObstacleId, &CircleObstacle)> + '_ {
        self.obstacles.iter().map(|(id, o)| (*id, o))
    }

    pub fn point_free(&self, position: &Position, inflation: f64) -> bool {
        self.obstacles.values().all(|o| !o.collides_point(position, inflation))
    }

    pub fn segment_free(&self, a: Point2D, b: Point2D, inflation: f64) -> bool {
        self.obstacles.values().all(|o| !o.collides_segment(a, b, inflation))
    }
}
