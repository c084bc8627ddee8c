//! Error types for rust_rrtx

use thiserror::Error;

use crate::common::types::NodeId;

/// Main error type for the planning engine
#[derive(Debug, Error)]
pub enum RrtxError {
    /// Query on a spatial index with no live nodes
    #[error("Spatial index is empty")]
    EmptyIndex,
    /// Pop on an empty rewiring queue
    #[error("Rewiring queue is empty")]
    EmptyQueue,
    /// A node was indexed twice
    #[error("Node {0} is already indexed")]
    DuplicateInsert(NodeId),
    /// The robot moved further in one slice than the vehicle model allows
    #[error("Impossible move: robot displaced {distance:.3} in one slice (bound {bound:.3})")]
    ImpossibleMove { distance: f64, bound: f64 },
    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    /// Problem file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Visualization error
    #[error("Visualization error: {0}")]
    Visualization(String),
}

/// Result type alias for planner operations
pub type RrtxResult<T> = Result<T, RrtxError>;
