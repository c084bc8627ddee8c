//! Utility modules for rust_rrtx

pub mod export;
pub mod visualization;

pub use export::{export_run, write_edges, write_positions};
pub use visualization::{colors, plot_planner, PathStyle, PointStyle, Visualizer};
