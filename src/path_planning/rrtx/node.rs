//! Per-node planner state stored in the spatial index arena

use std::rc::Rc;

use crate::common::NodeId;
use crate::path_planning::rrtx::neighbor_list::{ListHandle, NeighborList};
use crate::path_planning::rrtx::rewire_queue::QueueKey;

/// Parent of a node and the edge `node -> parent`
#[derive(Debug)]
pub struct ParentLink<E> {
    pub node: NodeId,
    pub edge: Rc<E>,
}

/// One end of a directed neighbor edge
///
/// The edge `a -> b` is recorded twice: in `a.out_neighbors` (with `node = b`)
/// and in `b.in_neighbors` (with `node = a`). Each entry holds the handle of
/// the other so either side can drop both in O(1).
#[derive(Debug)]
pub struct NeighborEntry<E> {
    pub node: NodeId,
    pub edge: Rc<E>,
    pub twin: Option<ListHandle>,
}

#[derive(Debug)]
pub struct GraphNode<E> {
    pub(crate) tree_cost: f64,
    pub(crate) lookahead_cost: f64,
    pub(crate) parent: Option<ParentLink<E>>,
    // our entry in the parent's successor list
    pub(crate) successor_handle: Option<ListHandle>,
    pub(crate) successors: NeighborList<NodeId>,
    pub(crate) out_neighbors: NeighborList<NeighborEntry<E>>,
    pub(crate) in_neighbors: NeighborList<NeighborEntry<E>>,
    pub(crate) in_tree: bool,
    pub(crate) is_move_goal: bool,
    pub(crate) orphan: bool,
    pub(crate) obstacle_handle: Option<ListHandle>,
    pub(crate) sample_handle: Option<ListHandle>,
    pub(crate) needs_reconnect: bool,
    /// Deleted because it sat inside an obstacle
    pub(crate) freed: bool,
}

impl<E> GraphNode<E> {
    /// Node not yet connected to the tree, both costs infinite
    pub fn new() -> Self {
        GraphNode {
            tree_cost: f64::INFINITY,
            lookahead_cost: f64::INFINITY,
            parent: None,
            successor_handle: None,
            successors: NeighborList::new(),
            out_neighbors: NeighborList::new(),
            in_neighbors: NeighborList::new(),
            in_tree: false,
            is_move_goal: false,
            orphan: false,
            obstacle_handle: None,
            sample_handle: None,
            needs_reconnect: false,
            freed: false,
        }
    }

    /// Tree root, zero cost to itself
    pub fn root() -> Self {
        GraphNode {
            tree_cost: 0.0,
            lookahead_cost: 0.0,
            in_tree: true,
            ..Self::new()
        }
    }

    pub fn tree_cost(&self) -> f64 {
        self.tree_cost
    }

    pub fn lookahead_cost(&self) -> f64 {
        self.lookahead_cost
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent.as_ref().map(|p| p.node)
    }

    pub fn parent_edge(&self) -> Option<&E> {
        self.parent.as_ref().map(|p| p.edge.as_ref())
    }

    pub fn in_tree(&self) -> bool {
        self.in_tree
    }

    pub fn is_move_goal(&self) -> bool {
        self.is_move_goal
    }

    pub fn successors(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.successors.iter().map(|(_, id, _)| *id)
    }

    /// Targets of the edges leaving this node, with their costs
    pub fn out_neighbors(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.out_neighbors.iter().map(|(_, e, cost)| (e.node, cost))
    }

    /// Sources of the edges entering this node, with their costs
    pub fn in_neighbors(&self) -> impl Iterator<Item = (NodeId, f64)> + '_ {
        self.in_neighbors.iter().map(|(_, e, cost)| (e.node, cost))
    }

    pub fn queue_key(&self) -> QueueKey {
        QueueKey::new(self.tree_cost, self.lookahead_cost)
    }

    /// `g - lmc` exceeds `threshold`; false while both costs are infinite
    pub fn needs_rewire(&self, threshold: f64) -> bool {
        self.tree_cost - self.lookahead_cost > threshold
    }

    pub fn is_consistent(&self, threshold: f64) -> bool {
        !((self.tree_cost - self.lookahead_cost).abs() > threshold)
    }
}

impl<E> Default for GraphNode<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_node_is_unconnected() {
        let node: GraphNode<()> = GraphNode::new();
        assert!(node.tree_cost().is_infinite());
        assert!(node.parent().is_none());
        assert!(!node.in_tree());
        // inf - inf is not an inconsistency
        assert!(!node.needs_rewire(1.0));
        assert!(node.is_consistent(1.0));
    }

    #[test]
    fn test_root_costs() {
        let root: GraphNode<()> = GraphNode::root();
        assert_eq!(root.tree_cost(), 0.0);
        assert_eq!(root.lookahead_cost(), 0.0);
        assert!(root.in_tree());
    }

    #[test]
    fn test_rewire_threshold() {
        let mut node: GraphNode<()> = GraphNode::new();
        node.tree_cost = 5.0;
        node.lookahead_cost = 4.5;
        assert!(!node.needs_rewire(1.0));
        assert!(node.needs_rewire(0.0));
        node.tree_cost = f64::INFINITY;
        assert!(node.needs_rewire(1.0));
        assert!(!node.is_consistent(1.0));
    }
}
