//! Distance functions and wrapped-coordinate helpers
//!
//! The planner never hard-codes a metric: a [`DistanceFn`] is injected at
//! setup and shared by the spatial index and the configuration space.

use std::f64::consts::PI;
use std::sync::Arc;

use crate::common::{Position, WrapSpec};

/// Injected metric over configurations
pub type DistanceFn = Arc<dyn Fn(&Position, &Position) -> f64 + Send + Sync>;

/// Shortest signed difference `to - from` on a circle of length `period`,
/// in `(-period/2, period/2]`
pub fn wrapped_difference(from: f64, to: f64, period: f64) -> f64 {
    let d = (to - from).rem_euclid(period);
    if d > period / 2.0 {
        d - period
    } else {
        d
    }
}

/// Wrapped dimensions of a space together with the origin of each period window
#[derive(Debug, Clone, Default)]
pub struct Wrapping {
    // (dim, period, origin)
    specs: Vec<(usize, f64, f64)>,
}

impl Wrapping {
    /// Period windows start at the lower bound of each wrapped dimension
    pub fn new(wraps: &[WrapSpec], lower_bounds: &Position) -> Self {
        let specs = wraps
            .iter()
            .map(|w| (w.dim, w.period, lower_bounds[w.dim]))
            .collect();
        Self { specs }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn specs(&self) -> Vec<WrapSpec> {
        self.specs.iter().map(|&(dim, period, _)| WrapSpec::new(dim, period)).collect()
    }

    /// `to - from`, taking the short way around every wrapped dimension
    pub fn difference(&self, from: &Position, to: &Position) -> Position {
        let mut diff = to - from;
        for &(dim, period, _) in &self.specs {
            diff[dim] = wrapped_difference(from[dim], to[dim], period);
        }
        diff
    }

    /// Bring every wrapped coordinate into its period window
    pub fn normalize(&self, position: &mut Position) {
        for &(dim, period, origin) in &self.specs {
            position[dim] = origin + (position[dim] - origin).rem_euclid(period);
        }
    }

    pub fn normalized(&self, position: &Position) -> Position {
        let mut p = position.clone();
        self.normalize(&mut p);
        p
    }
}

/// Plain Euclidean distance
pub fn euclidean() -> DistanceFn {
    Arc::new(|a: &Position, b: &Position| (a - b).norm())
}

/// Euclidean distance where wrapped coordinates are measured the short way round
pub fn wrapped_euclidean(wrapping: Wrapping) -> DistanceFn {
    Arc::new(move |a: &Position, b: &Position| wrapping.difference(a, b).norm())
}

/// Planar distance plus heading difference, heading at dimension 2 wrapping at 2*pi
pub fn r3s() -> DistanceFn {
    Arc::new(|a: &Position, b: &Position| {
        let dx = a[0] - b[0];
        let dy = a[1] - b[1];
        let dtheta = wrapped_difference(a[2], b[2], 2.0 * PI);
        (dx * dx + dy * dy + dtheta * dtheta).sqrt()
    })
}
