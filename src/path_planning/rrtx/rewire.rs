//! Graph maintenance: parent links, neighbor edges, the rewiring cascade and
//! the repair of the graph after obstacle changes
//!
//! `g` is the tree cost and `lmc` the look-ahead cost of a node. A node whose
//! `g` exceeds its `lmc` by more than the change threshold has found a better
//! route that its neighbors have not heard about yet; it sits in the rewiring
//! queue until [`Planner::reduce_inconsistency`] passes the news on.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::common::{EdgeModel, NodeId, RrtxResult, Trajectory};
use crate::path_planning::rrtx::node::{NeighborEntry, ParentLink};
use crate::path_planning::rrtx::planner::Planner;

impl<M: EdgeModel> Planner<M> {
    /// Make `parent` the parent of `child` through `edge` (`child -> parent`)
    pub(crate) fn make_parent_of(&mut self, child: NodeId, parent: NodeId, edge: Rc<M::Edge>) {
        self.detach_parent(child);
        self.longest_edge = self.longest_edge.max(edge.length());
        let handle = self.tree.get_mut(parent).successors.push_back(child, 0.0);
        let node = self.tree.get_mut(child);
        node.parent = Some(ParentLink { node: parent, edge });
        node.successor_handle = Some(handle);
    }

    pub(crate) fn detach_parent(&mut self, child: NodeId) {
        let node = self.tree.get_mut(child);
        let old = node.parent.take();
        let handle = node.successor_handle.take();
        if let (Some(old), Some(handle)) = (old, handle) {
            self.tree.get_mut(old.node).successors.remove(handle);
        }
    }

    /// Record the directed edge `from -> to` on both endpoints
    pub(crate) fn link(&mut self, from: NodeId, to: NodeId, edge: Rc<M::Edge>) {
        let cost = edge.cost();
        self.longest_edge = self.longest_edge.max(edge.length());
        let out_handle = self.tree.get_mut(from).out_neighbors.push_back(
            NeighborEntry {
                node: to,
                edge: Rc::clone(&edge),
                twin: None,
            },
            cost,
        );
        let in_handle = self.tree.get_mut(to).in_neighbors.push_back(
            NeighborEntry {
                node: from,
                edge,
                twin: Some(out_handle),
            },
            cost,
        );
        if let Some(entry) = self.tree.get_mut(from).out_neighbors.get_mut(out_handle) {
            entry.twin = Some(in_handle);
        }
    }

    fn has_out_neighbor(&self, from: NodeId, to: NodeId) -> bool {
        self.tree.get(from).out_neighbors.iter().any(|(_, e, _)| e.node == to)
    }

    /// Push `v` or refresh its key if already queued
    pub(crate) fn verify_queue(&mut self, v: NodeId) {
        let key = self.tree.get(v).queue_key();
        self.queue.insert(v, key);
    }

    fn queue_if_inconsistent(&mut self, v: NodeId) {
        if self.tree.get(v).needs_rewire(self.config.change_threshold) {
            self.verify_queue(v);
        }
    }

    /// Pick the out-neighbor that gives `v` the lowest cost-to-go, if it beats the current one
    pub(crate) fn update_lmc(&mut self, v: NodeId) {
        if v == self.root {
            return;
        }
        let node = self.tree.get(v);
        let mut best_cost = node.lookahead_cost;
        let mut best = None;
        for (_, entry, cost) in node.out_neighbors.iter() {
            let u = entry.node;
            let neighbor = self.tree.get(u);
            if neighbor.orphan || !self.tree.is_live(u) || neighbor.parent() == Some(v) {
                continue;
            }
            let through = cost + neighbor.lookahead_cost;
            if through < best_cost {
                best_cost = through;
                best = Some((u, Rc::clone(&entry.edge)));
            }
        }
        if let Some((u, edge)) = best {
            self.make_parent_of(v, u, edge);
            self.tree.get_mut(v).lookahead_cost = best_cost;
        }
    }

    /// Offer `v` as a parent to every in-neighbor it would improve
    pub(crate) fn rewire_neighbors(&mut self, v: NodeId) -> RrtxResult<()> {
        let threshold = self.config.change_threshold;
        let node = self.tree.get(v);
        if !node.needs_rewire(threshold) {
            return Ok(());
        }
        let lmc = node.lookahead_cost;
        let parent = node.parent();
        let incoming: Vec<(NodeId, Rc<M::Edge>, f64)> = node
            .in_neighbors
            .iter()
            .map(|(_, e, cost)| (e.node, Rc::clone(&e.edge), cost))
            .collect();

        for (u, edge, cost) in incoming {
            if Some(u) == parent || u == self.root || self.tree.get(u).orphan {
                continue;
            }
            let through = cost + lmc;
            if self.tree.get(u).lookahead_cost > through {
                self.tree.get_mut(u).lookahead_cost = through;
                self.make_parent_of(u, v, edge);
                self.queue_if_inconsistent(u);
            }
        }
        Ok(())
    }

    fn process_top(&mut self) -> RrtxResult<()> {
        let v = self.queue.pop_min()?;
        if self.tree.get(v).needs_rewire(self.config.change_threshold) {
            self.update_lmc(v);
            self.rewire_neighbors(v)?;
        }
        let node = self.tree.get_mut(v);
        node.tree_cost = node.lookahead_cost;
        Ok(())
    }

    /// Propagate queued cost changes until the robot's move goal is settled
    pub fn reduce_inconsistency(&mut self) -> RrtxResult<()> {
        let threshold = self.config.change_threshold;
        let goal = self.move_goal();
        while let Some((_, top)) = self.queue.peek() {
            let goal_node = self.tree.get(goal);
            let keep_going = top < goal_node.queue_key()
                || !goal_node.is_consistent(threshold)
                || goal_node.tree_cost.is_infinite()
                || self.queue.contains(goal);
            if !keep_going {
                break;
            }
            self.process_top()?;
        }
        Ok(())
    }

    /// Empty the rewiring queue completely
    pub fn drain(&mut self) -> RrtxResult<()> {
        while !self.queue.is_empty() {
            self.process_top()?;
        }
        Ok(())
    }

    /// Re-check the edges of every node on the obstacle stack
    pub fn process_obstacle_stack(&mut self) -> RrtxResult<()> {
        if self.space.obstacle_stack.is_empty() {
            return Ok(());
        }
        let mut processed = 0usize;
        while let Some((v, _)) = self.space.obstacle_stack.pop_front() {
            processed += 1;
            self.tree.get_mut(v).obstacle_handle = None;
            if self.tree.is_deleted(v) {
                self.unlink_deleted(v);
                continue;
            }
            self.remove_infeasible_edges(v);
            if self.tree.get(v).needs_reconnect {
                self.reconnect(v);
            }
        }
        let orphans = self.propagate_descendants();
        debug!(processed, orphans, "obstacle stack drained");

        let goal = self.move_goal();
        if self.tree.is_live(goal) {
            self.verify_queue(goal);
        }
        Ok(())
    }

    fn mark_orphan(&mut self, v: NodeId) {
        if v == self.root {
            return;
        }
        let node = self.tree.get_mut(v);
        if !node.orphan {
            node.orphan = true;
            self.orphans.push(v);
        }
    }

    /// Drop neighbor edges of `v` that now cross an obstacle, orphaning any
    /// node whose parent edge is lost
    fn remove_infeasible_edges(&mut self, v: NodeId) {
        let robot_radius = self.space.robot_radius;
        let obstacles = &self.space.obstacles;
        let node = self.tree.get(v);

        let blocked_out: Vec<_> = node
            .out_neighbors
            .iter()
            .filter(|(_, e, _)| !e.edge.feasible(obstacles, robot_radius))
            .map(|(h, _, _)| h)
            .collect();
        let blocked_in: Vec<_> = node
            .in_neighbors
            .iter()
            .filter(|(_, e, _)| !e.edge.feasible(obstacles, robot_radius))
            .map(|(h, _, _)| h)
            .collect();
        let parent_blocked = node
            .parent
            .as_ref()
            .map_or(false, |p| !p.edge.feasible(obstacles, robot_radius));

        for h in blocked_out {
            if let Some((entry, _)) = self.tree.get_mut(v).out_neighbors.remove(h) {
                if let Some(twin) = entry.twin {
                    self.tree.get_mut(entry.node).in_neighbors.remove(twin);
                }
            }
        }
        for h in blocked_in {
            if let Some((entry, _)) = self.tree.get_mut(v).in_neighbors.remove(h) {
                if let Some(twin) = entry.twin {
                    self.tree.get_mut(entry.node).out_neighbors.remove(twin);
                }
                if self.tree.get(entry.node).parent() == Some(v) {
                    self.mark_orphan(entry.node);
                }
            }
        }
        if parent_blocked {
            trace!(node = %v, "parent edge blocked");
            self.mark_orphan(v);
        }
    }

    /// Fully disconnect a node that was deleted from the index
    fn unlink_deleted(&mut self, v: NodeId) {
        let children: Vec<NodeId> = self.tree.get(v).successors().collect();
        for child in children {
            self.mark_orphan(child);
        }

        let node = self.tree.get_mut(v);
        let mut outgoing = Vec::new();
        while let Some((entry, _)) = node.out_neighbors.pop_front() {
            outgoing.push(entry);
        }
        let mut incoming = Vec::new();
        while let Some((entry, _)) = node.in_neighbors.pop_front() {
            incoming.push(entry);
        }
        for entry in outgoing {
            if let Some(twin) = entry.twin {
                self.tree.get_mut(entry.node).in_neighbors.remove(twin);
            }
        }
        for entry in incoming {
            if let Some(twin) = entry.twin {
                self.tree.get_mut(entry.node).out_neighbors.remove(twin);
            }
        }

        self.queue.remove(v);
        self.detach_parent(v);
        let node = self.tree.get_mut(v);
        node.successors.clear();
        node.tree_cost = f64::INFINITY;
        node.lookahead_cost = f64::INFINITY;
        node.in_tree = false;
        node.orphan = false;
        node.needs_reconnect = false;
        trace!(node = %v, "deleted node unlinked");
    }

    /// Restore edges to ball neighbors that an obstacle had blocked
    fn reconnect(&mut self, v: NodeId) {
        self.tree.get_mut(v).needs_reconnect = false;
        let position = self.tree.position(v).clone();
        let radius = self.space.ball_radius(self.tree.len());
        let robot_radius = self.space.robot_radius;

        let linked_out: HashSet<NodeId> = self.tree.get(v).out_neighbors().map(|(u, _)| u).collect();
        let linked_in: HashSet<NodeId> = self.tree.get(v).in_neighbors().map(|(u, _)| u).collect();

        for (u, _) in self.tree.near(&position, radius) {
            if u == v {
                continue;
            }
            let other = self.tree.position(u).clone();
            if !linked_out.contains(&u) {
                let edge = self.model.connect(&position, &other);
                if edge.cost() > 0.0 && edge.feasible(&self.space.obstacles, robot_radius) {
                    self.link(v, u, Rc::new(edge));
                }
            }
            if !linked_in.contains(&u) && !self.has_out_neighbor(u, v) {
                let edge = self.model.connect(&other, &position);
                if edge.cost() > 0.0 && edge.feasible(&self.space.obstacles, robot_radius) {
                    self.link(u, v, Rc::new(edge));
                }
            }
        }

        self.update_lmc(v);
        self.queue_if_inconsistent(v);
    }

    /// Cut every orphan and its descendants loose from the tree
    ///
    /// Neighbors that lead into an orphaned subtree get `g = inf` so that the
    /// next cascade offers them to the orphans again. Returns the number of
    /// nodes cut loose.
    fn propagate_descendants(&mut self) -> usize {
        let mut orphans = std::mem::take(&mut self.orphans);
        let mut i = 0;
        while i < orphans.len() {
            let v = orphans[i];
            let children: Vec<NodeId> = self.tree.get(v).successors().collect();
            for child in children {
                let node = self.tree.get_mut(child);
                if !node.orphan {
                    node.orphan = true;
                    orphans.push(child);
                }
            }
            i += 1;
        }

        for &v in &orphans {
            let node = self.tree.get(v);
            let mut touched: Vec<NodeId> = node.out_neighbors().map(|(u, _)| u).collect();
            touched.extend(node.parent());
            for u in touched {
                if !self.tree.get(u).orphan && self.tree.is_live(u) {
                    self.tree.get_mut(u).tree_cost = f64::INFINITY;
                    self.verify_queue(u);
                }
            }
        }

        for &v in &orphans {
            self.queue.remove(v);
            self.detach_parent(v);
            let node = self.tree.get_mut(v);
            node.tree_cost = f64::INFINITY;
            node.lookahead_cost = f64::INFINITY;
            node.orphan = false;
        }
        for &v in &orphans {
            if self.tree.is_live(v) {
                self.verify_queue(v);
            }
        }
        orphans.len()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use crate::common::{EdgeModel, Position, RrtxResult};
    use crate::path_planning::rrtx::config::{DistanceKind, EdgeModelConfig, PlannerConfig};
    use crate::path_planning::rrtx::edge::StraightLineModel;
    use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleId};
    use crate::path_planning::rrtx::planner::Planner;
    use nalgebra::DVector;

    fn pos(v: &[f64]) -> Position {
        DVector::from_row_slice(v)
    }

    /// root (0,0) -> A (5,0) -> B (9,3), with a ball of 6 so that B only sees A
    fn chain() -> RrtxResult<(Planner<StraightLineModel>, crate::common::NodeId, crate::common::NodeId)> {
        let config = PlannerConfig {
            lower_bounds: vec![-20.0, -20.0],
            upper_bounds: vec![20.0, 20.0],
            wraps: vec![],
            start: vec![-15.0, -15.0],
            goal: vec![0.0, 0.0],
            delta: 6.0,
            robot_radius: 0.1,
            distance: DistanceKind::Euclidean,
            edge_model: EdgeModelConfig::Straight,
            seed: Some(1),
            ..PlannerConfig::default()
        };
        let mut planner = Planner::straight(config)?;
        let a = planner.insert_sample(pos(&[5.0, 0.0]))?.expect("A connects");
        let b = planner.insert_sample(pos(&[9.0, 3.0]))?.expect("B connects");
        Ok((planner, a, b))
    }

    #[test]
    fn test_chain_setup() {
        let (planner, a, b) = chain().unwrap();
        assert_eq!(planner.node(a).parent(), Some(planner.root()));
        assert_eq!(planner.node(b).parent(), Some(a));
        assert!((planner.node(b).lookahead_cost() - 10.0).abs() < 1e-9);
        assert_eq!(planner.node(b).out_neighbors().count(), 1);
        assert!(planner.node(a).successors().any(|s| s == b));
    }

    #[test]
    fn test_obstacle_orphans_cut_off_node() {
        let (mut planner, a, b) = chain().unwrap();
        // sits on the segment A-B, clear of root-A
        planner
            .add_obstacle(ObstacleId(0), CircleObstacle::new(7.0, 1.5, 0.5))
            .unwrap();
        planner.process_obstacle_stack().unwrap();

        assert!(planner.node(b).lookahead_cost().is_infinite());
        assert!(planner.node(b).parent().is_none());
        assert!(planner.is_queued(b));
        assert_eq!(planner.node(b).out_neighbors().count(), 0);
        assert!(!planner.node(a).successors().any(|s| s == b));
        assert!(!planner.node(a).in_neighbors().any(|(u, _)| u == b));

        planner.reduce_inconsistency().unwrap();
        assert!(planner.node(b).lookahead_cost().is_infinite());
        assert!((planner.node(a).tree_cost() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_node_reconnects_orphan() {
        let (mut planner, a, b) = chain().unwrap();
        planner
            .add_obstacle(ObstacleId(0), CircleObstacle::new(7.0, 1.5, 0.5))
            .unwrap();
        planner.process_obstacle_stack().unwrap();
        planner.reduce_inconsistency().unwrap();

        // C hangs off A and offers B a detour around the obstacle
        let c = planner.insert_sample(pos(&[4.5, 4.5])).unwrap().unwrap();
        assert_eq!(planner.node(c).parent(), Some(a));
        planner.drain().unwrap();
        assert_eq!(planner.node(b).parent(), Some(c));
        let expected = planner.node(c).lookahead_cost() + (pos(&[9.0, 3.0]) - pos(&[4.5, 4.5])).norm();
        assert!((planner.node(b).lookahead_cost() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_direct_root_edge_takes_over_cut_off_node() {
        let (mut planner, a, b) = chain().unwrap();
        let root = planner.root();
        let to_root = planner.model.connect(&pos(&[9.0, 3.0]), &pos(&[0.0, 0.0]));
        let from_root = planner.model.connect(&pos(&[0.0, 0.0]), &pos(&[9.0, 3.0]));
        planner.link(b, root, Rc::new(to_root));
        planner.link(root, b, Rc::new(from_root));
        assert_eq!(planner.node(b).parent(), Some(a));

        planner
            .add_obstacle(ObstacleId(0), CircleObstacle::new(7.0, 1.5, 0.5))
            .unwrap();
        planner.process_obstacle_stack().unwrap();

        // B lost A; the root, B's surviving out-neighbor, is pushed back for rewiring
        assert!(planner.node(b).lookahead_cost().is_infinite());
        assert!(planner.node(b).parent().is_none());
        assert!(planner.is_queued(b));
        assert!(planner.node(root).tree_cost().is_infinite());
        assert!(planner.is_queued(root));
        assert!(planner.node(b).out_neighbors().all(|(u, _)| u == root));

        planner.drain().unwrap();
        let direct = 90f64.sqrt();
        assert_eq!(planner.node(b).parent(), Some(root));
        assert!((planner.node(b).lookahead_cost() - direct).abs() < 1e-9);
        assert!((planner.node(b).tree_cost() - direct).abs() < 1e-9);
        assert_eq!(planner.node(root).tree_cost(), 0.0);
        assert!((planner.node(a).tree_cost() - 5.0).abs() < 1e-9);
        assert!(planner.node(root).successors().any(|s| s == b));
    }

    #[test]
    fn test_removed_obstacle_restores_edge() {
        let (mut planner, a, b) = chain().unwrap();
        planner
            .add_obstacle(ObstacleId(0), CircleObstacle::new(7.0, 1.5, 0.5))
            .unwrap();
        planner.process_obstacle_stack().unwrap();
        planner.drain().unwrap();
        assert!(planner.node(b).lookahead_cost().is_infinite());

        assert!(planner.remove_obstacle(ObstacleId(0)).unwrap());
        assert!(!planner.remove_obstacle(ObstacleId(0)).unwrap());
        planner.process_obstacle_stack().unwrap();
        planner.drain().unwrap();
        assert_eq!(planner.node(b).parent(), Some(a));
        assert!((planner.node(b).lookahead_cost() - 10.0).abs() < 1e-9);
        assert!((planner.node(b).tree_cost() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_inside_obstacle_is_deleted_and_resampled() {
        let (mut planner, a, b) = chain().unwrap();
        planner
            .add_obstacle(ObstacleId(3), CircleObstacle::new(5.0, 0.5, 1.0))
            .unwrap();
        planner.process_obstacle_stack().unwrap();
        planner.drain().unwrap();

        assert!(planner.is_deleted(a));
        assert!(planner.node(a).lookahead_cost().is_infinite());
        // B hung off A
        assert!(planner.node(b).lookahead_cost().is_infinite());
        assert!(planner.nodes().all(|(id, _, _)| id != a));
        assert_eq!(planner.node(planner.root()).in_neighbors().count(), 0);

        planner.remove_obstacle(ObstacleId(3)).unwrap();
        assert_eq!(planner.space().sample_stack.len(), 1);
        planner.process_obstacle_stack().unwrap();
        // the freed position is retried before anything else
        let revived = planner.sample_and_extend().unwrap().unwrap();
        assert_eq!(planner.position(revived), &pos(&[5.0, 0.0]));
        planner.drain().unwrap();
        assert_eq!(planner.node(b).parent(), Some(revived));
        assert!((planner.node(b).lookahead_cost() - 10.0).abs() < 1e-9);
    }
}
