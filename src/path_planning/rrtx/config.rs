//! Planner parameters, loaded from TOML
//!
//! Every field has a default, so a config file only needs the keys it changes.
//! The defaults describe a Dubins car in a 100 x 100 field with a heading that
//! wraps at 2*pi, travelling from (50, 50) to the origin.

use std::f64::consts::PI;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{RrtxError, RrtxResult, WrapSpec};
use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub lower_bounds: Vec<f64>,
    pub upper_bounds: Vec<f64>,
    pub wraps: Vec<WrapSpec>,
    /// Where the robot starts; the search tree grows toward it
    pub start: Vec<f64>,
    /// Where the robot is headed; root of the search tree
    pub goal: Vec<f64>,
    /// Maximum edge length when saturating samples
    pub delta: f64,
    pub ball_constant: f64,
    /// Minimum `g - lmc` gap before a node is rewired
    pub change_threshold: f64,
    pub goal_threshold: f64,
    /// Seconds of logical time per slice
    pub slice_time: f64,
    pub total_planning_time: f64,
    /// Warm-up before the robot starts moving
    pub planning_only_time: f64,
    pub move_robot: bool,
    pub robot_radius: f64,
    pub robot_velocity: f64,
    pub p_goal: f64,
    pub samples_per_slice: usize,
    /// Largest plausible displacement per slice; defaults to `delta`
    pub max_move_per_slice: Option<f64>,
    /// Sleep until the wall-clock end of every slice
    pub realtime: bool,
    pub seed: Option<u64>,
    pub edge_model: EdgeModelConfig,
    pub distance: DistanceKind,
    pub obstacles: Vec<ObstacleConfig>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let heading = -3.0 * PI / 4.0;
        Self {
            lower_bounds: vec![-50.0, -50.0, 0.0],
            upper_bounds: vec![50.0, 50.0, 2.0 * PI],
            wraps: vec![WrapSpec::new(2, 2.0 * PI)],
            start: vec![50.0, 50.0, heading],
            goal: vec![0.0, 0.0, heading],
            delta: 10.0,
            ball_constant: 100.0,
            change_threshold: 1.0,
            goal_threshold: 0.5,
            slice_time: 0.01,
            total_planning_time: 60.0,
            planning_only_time: 5.0,
            move_robot: true,
            robot_radius: 0.5,
            robot_velocity: 10.0,
            p_goal: 0.01,
            samples_per_slice: 1,
            max_move_per_slice: None,
            realtime: false,
            seed: None,
            edge_model: EdgeModelConfig::default(),
            distance: DistanceKind::R3s,
            obstacles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EdgeModelConfig {
    Straight,
    Dubins {
        #[serde(default = "default_turning_radius")]
        min_turning_radius: f64,
        #[serde(default = "default_resolution")]
        resolution: f64,
    },
}

fn default_turning_radius() -> f64 {
    1.0
}

fn default_resolution() -> f64 {
    0.25
}

impl Default for EdgeModelConfig {
    fn default() -> Self {
        EdgeModelConfig::Dubins {
            min_turning_radius: default_turning_radius(),
            resolution: default_resolution(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceKind {
    Euclidean,
    WrappedEuclidean,
    /// Planar distance plus wrapped heading at dimension 2
    R3s,
}

/// Obstacle known up front, optionally appearing or vanishing at a set time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    #[serde(default)]
    pub appear_at: f64,
    #[serde(default)]
    pub vanish_at: Option<f64>,
}

impl ObstacleConfig {
    pub fn circle(&self) -> CircleObstacle {
        CircleObstacle::new(self.x, self.y, self.radius)
    }
}

/// Obstacle change scheduled at a logical time
#[derive(Debug, Clone, PartialEq)]
pub struct TimedObstacle {
    pub at: f64,
    pub id: ObstacleId,
    pub obstacle: CircleObstacle,
    pub appear: bool,
}

impl PlannerConfig {
    pub fn from_toml_str(s: &str) -> RrtxResult<Self> {
        let config: PlannerConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> RrtxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn dims(&self) -> usize {
        self.lower_bounds.len()
    }

    pub fn max_move(&self) -> f64 {
        self.max_move_per_slice.unwrap_or(self.delta)
    }

    /// Appear and vanish events of the configured obstacles, in time order
    pub fn obstacle_schedule(&self) -> Vec<TimedObstacle> {
        let mut schedule = Vec::new();
        for (i, o) in self.obstacles.iter().enumerate() {
            let id = ObstacleId(i);
            schedule.push(TimedObstacle {
                at: o.appear_at,
                id,
                obstacle: o.circle(),
                appear: true,
            });
            if let Some(vanish) = o.vanish_at {
                schedule.push(TimedObstacle {
                    at: vanish,
                    id,
                    obstacle: o.circle(),
                    appear: false,
                });
            }
        }
        schedule.sort_by(|a, b| a.at.total_cmp(&b.at).then(a.id.cmp(&b.id)));
        schedule
    }

    pub fn validate(&self) -> RrtxResult<()> {
        let d = self.dims();
        let invalid = |msg: String| Err(RrtxError::InvalidParameter(msg));

        if d == 0 {
            return invalid("lower_bounds must not be empty".into());
        }
        for (name, v) in [("upper_bounds", &self.upper_bounds), ("start", &self.start), ("goal", &self.goal)] {
            if v.len() != d {
                return invalid(format!("{name} has {} entries, expected {d}", v.len()));
            }
        }
        if let Some(i) = (0..d).find(|&i| self.lower_bounds[i] >= self.upper_bounds[i]) {
            return invalid(format!("bounds of dimension {i} are empty"));
        }
        for w in &self.wraps {
            if w.dim >= d {
                return invalid(format!("wrapped dimension {} out of range", w.dim));
            }
            if w.period <= 0.0 {
                return invalid(format!("wrap period of dimension {} must be positive", w.dim));
            }
        }
        for (name, value) in [
            ("delta", self.delta),
            ("ball_constant", self.ball_constant),
            ("slice_time", self.slice_time),
            ("goal_threshold", self.goal_threshold),
            ("robot_velocity", self.robot_velocity),
        ] {
            if !(value > 0.0) || !value.is_finite() {
                return invalid(format!("{name} must be positive, got {value}"));
            }
        }
        if self.change_threshold < 0.0 || self.robot_radius < 0.0 || self.planning_only_time < 0.0 {
            return invalid("change_threshold, robot_radius and planning_only_time must be non-negative".into());
        }
        if !(0.0..=1.0).contains(&self.p_goal) {
            return invalid(format!("p_goal must lie in [0, 1], got {}", self.p_goal));
        }
        if self.samples_per_slice == 0 {
            return invalid("samples_per_slice must be at least 1".into());
        }
        if matches!(self.max_move_per_slice, Some(m) if m <= 0.0) {
            return invalid("max_move_per_slice must be positive".into());
        }
        if let EdgeModelConfig::Dubins { min_turning_radius, resolution } = self.edge_model {
            if d < 3 {
                return invalid("dubins edges need [x, y, theta]".into());
            }
            if min_turning_radius <= 0.0 || resolution <= 0.0 {
                return invalid("dubins turning radius and resolution must be positive".into());
            }
        }
        match self.distance {
            DistanceKind::R3s => {
                if d < 3 {
                    return invalid("r3s distance needs [x, y, theta]".into());
                }
                let heading_wraps = self
                    .wraps
                    .iter()
                    .any(|w| w.dim == 2 && (w.period - 2.0 * PI).abs() < 1e-9);
                if !heading_wraps {
                    return invalid("r3s distance needs the heading (dimension 2) wrapped at 2*pi".into());
                }
            }
            DistanceKind::Euclidean if !self.wraps.is_empty() => {
                return invalid("euclidean distance ignores wraps, use wrapped_euclidean".into());
            }
            _ => {}
        }
        if let Some(o) = self.obstacles.iter().find(|o| o.radius < 0.0) {
            return invalid(format!("obstacle at ({}, {}) has a negative radius", o.x, o.y));
        }
        Ok(())
    }
}
