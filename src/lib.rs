//! rust_rrtx - incremental real-time motion planning with RRTx
//!
//! This crate provides the RRTx planning engine together with the pieces
//! needed to run it end to end: straight-line and Dubins edge models,
//! circular obstacles that appear and vanish at run time, TOML problem
//! loading, result export and plotting.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod path_planning;

// Re-export common types for convenience
pub use common::{EdgeModel, NodeId, Point2D, Position, Trajectory, WrapSpec};
pub use common::{RrtxError, RrtxResult};
pub use path_planning::rrtx::{Planner, PlannerConfig, RunReport, Termination};
