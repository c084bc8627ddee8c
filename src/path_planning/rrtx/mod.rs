//! RRTx: incremental, real-time replanning over a dynamic obstacle field
//!
//! Reference: M. Otte and E. Frazzoli, "RRTX: Asymptotically optimal
//! single-query sampling-based motion planning with quick replanning",
//! IJRR 2016.

pub mod config;
pub mod config_space;
pub mod distance;
pub mod dubins;
pub mod edge;
pub mod kd_tree;
pub mod neighbor_list;
pub mod node;
pub mod obstacle;
pub mod planner;
pub mod rewire;
pub mod rewire_queue;
pub mod robot;

pub use config::{DistanceKind, EdgeModelConfig, ObstacleConfig, PlannerConfig};
pub use config_space::ConfigSpace;
pub use distance::{euclidean, r3s, wrapped_euclidean, DistanceFn, Wrapping};
pub use dubins::{DubinsEdge, DubinsModel, DubinsWord};
pub use edge::{StraightEdge, StraightLineModel};
pub use kd_tree::KdTree;
pub use neighbor_list::{ListHandle, NeighborList};
pub use node::GraphNode;
pub use obstacle::{CircleObstacle, ObstacleEvent, ObstacleId, ObstacleSet};
pub use planner::{Planner, RunReport, SliceReport, SliceStatus, StopHandle, Termination};
pub use rewire_queue::{QueueKey, RewireQueue};
pub use robot::Robot;
