//! Common types used throughout rust_rrtx

use std::fmt;

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// A configuration in the planning space
pub type Position = DVector<f64>;

/// Handle of a graph node inside the spatial index arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A periodic coordinate axis, e.g. a heading angle wrapping at 2*pi
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WrapSpec {
    pub dim: usize,
    pub period: f64,
}

impl WrapSpec {
    pub fn new(dim: usize, period: f64) -> Self {
        Self { dim, period }
    }
}

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Planar projection of a configuration (first two coordinates)
    pub fn from_position(position: &Position) -> Self {
        let y = if position.len() > 1 { position[1] } else { 0.0 };
        Self { x: position[0], y }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point2d_distance() {
        let p1 = Point2D::new(0.0, 0.0);
        let p2 = Point2D::new(3.0, 4.0);
        assert!((p1.distance(&p2) - 5.0).abs() < 1e-10);
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId(3).to_string(), "#3");
    }
}
