//! RRTx planning engine
//!
//! The engine is a state machine advanced one time slice at a time by
//! [`Planner::step`]. Time is logical: slice `k` starts at `k * slice_time`,
//! so a run is reproducible for a given seed regardless of how fast the host
//! is. With `realtime` set, [`Planner::run`] additionally sleeps out the rest
//! of every slice.
//!
//! The search tree is rooted at the robot's destination and grows toward the
//! robot. Every node reached by the tree knows its cost-to-go, so the robot
//! only ever has to follow parent edges.

use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::common::{EdgeModel, NodeId, Position, RrtxError, RrtxResult, Trajectory};
use crate::path_planning::rrtx::config::{PlannerConfig, TimedObstacle};
use crate::path_planning::rrtx::config_space::ConfigSpace;
use crate::path_planning::rrtx::dubins::DubinsModel;
use crate::path_planning::rrtx::edge::StraightLineModel;
use crate::path_planning::rrtx::kd_tree::KdTree;
use crate::path_planning::rrtx::node::GraphNode;
use crate::path_planning::rrtx::obstacle::{CircleObstacle, ObstacleEvent, ObstacleId, ObstacleSet};
use crate::path_planning::rrtx::rewire_queue::RewireQueue;
use crate::path_planning::rrtx::robot::Robot;

/// Why a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    ReachedGoal,
    ImpossibleMove { distance: f64, bound: f64 },
    Stopped,
    TimeExhausted,
}

#[derive(Debug, Clone)]
pub struct SliceReport {
    pub slice: usize,
    pub elapsed: f64,
    pub robot_pose: Position,
    pub distance_to_goal: f64,
    pub tree_size: usize,
    pub moved: bool,
}

#[derive(Debug, Clone)]
pub enum SliceStatus {
    Running(SliceReport),
    Finished(Termination),
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub termination: Termination,
    pub slices: usize,
    pub robot_path: Vec<Position>,
    pub distance_travelled: f64,
    pub tree_size: usize,
}

impl RunReport {
    /// Turn an impossible move into an error, pass every other outcome through
    pub fn into_result(self) -> RrtxResult<Self> {
        match self.termination {
            Termination::ImpossibleMove { distance, bound } => Err(RrtxError::ImpossibleMove { distance, bound }),
            _ => Ok(self),
        }
    }
}

/// Cooperative cancellation flag, checked once per slice
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Planner<M: EdgeModel> {
    pub(crate) config: PlannerConfig,
    pub(crate) space: ConfigSpace,
    pub(crate) model: M,
    pub(crate) tree: KdTree<GraphNode<M::Edge>>,
    pub(crate) queue: RewireQueue,
    pub(crate) root: NodeId,
    pub(crate) start_node: NodeId,
    pub(crate) robot: Robot<M::Edge>,
    // nodes flagged during the current obstacle pass
    pub(crate) orphans: Vec<NodeId>,
    // longest edge ever linked into the graph
    pub(crate) longest_edge: f64,
    rng: StdRng,
    slice_index: usize,
    prev_pose: Position,
    stop: StopHandle,
    events: Receiver<ObstacleEvent>,
    event_sender: Sender<ObstacleEvent>,
    schedule: VecDeque<TimedObstacle>,
    termination: Option<Termination>,
}

impl Planner<StraightLineModel> {
    pub fn straight(config: PlannerConfig) -> RrtxResult<Self> {
        let space = ConfigSpace::from_config(&config)?;
        let model = StraightLineModel::new(space.wrapping().clone(), space.distance_fn(), config.robot_velocity);
        Self::from_parts(config, space, model)
    }
}

impl Planner<DubinsModel> {
    pub fn dubins(config: PlannerConfig, min_turning_radius: f64, resolution: f64) -> RrtxResult<Self> {
        let space = ConfigSpace::from_config(&config)?;
        let model = DubinsModel::new(
            min_turning_radius,
            resolution,
            config.robot_velocity,
            space.wrapping().clone(),
        );
        Self::from_parts(config, space, model)
    }
}

impl<M: EdgeModel> Planner<M> {
    pub fn new(config: PlannerConfig, model: M) -> RrtxResult<Self> {
        let space = ConfigSpace::from_config(&config)?;
        Self::from_parts(config, space, model)
    }

    pub fn from_parts(config: PlannerConfig, mut space: ConfigSpace, model: M) -> RrtxResult<Self> {
        config.validate()?;
        let mut tree = KdTree::new(space.dims(), space.wrapping(), space.distance_fn());
        let root = tree.add_and_insert(space.goal().clone(), GraphNode::root())?;
        let mut start = GraphNode::new();
        start.is_move_goal = true;
        let start_node = tree.add(space.start().clone(), start);
        space.move_goal = Some(start_node);

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (event_sender, events) = mpsc::channel();
        let schedule = config.obstacle_schedule().into();
        let robot = Robot::new(space.start().clone());
        let prev_pose = space.start().clone();

        debug!(dims = space.dims(), root = %root, start = %start_node, "planner initialised");
        Ok(Planner {
            config,
            space,
            model,
            tree,
            queue: RewireQueue::new(),
            root,
            start_node,
            robot,
            orphans: Vec::new(),
            longest_edge: 0.0,
            rng,
            slice_index: 0,
            prev_pose,
            stop: StopHandle::default(),
            events,
            event_sender,
            schedule,
            termination: None,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn space(&self) -> &ConfigSpace {
        &self.space
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn start_node(&self) -> NodeId {
        self.start_node
    }

    pub fn move_goal(&self) -> NodeId {
        self.space.move_goal.unwrap_or(self.start_node)
    }

    pub fn node(&self, id: NodeId) -> &GraphNode<M::Edge> {
        self.tree.get(id)
    }

    pub fn position(&self, id: NodeId) -> &Position {
        self.tree.position(id)
    }

    /// Live nodes of the search graph
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Position, &GraphNode<M::Edge>)> + '_ {
        self.tree.iter()
    }

    /// Whether the node was removed from the graph by an obstacle
    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.tree.is_deleted(id)
    }

    pub fn is_queued(&self, id: NodeId) -> bool {
        self.queue.contains(id)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn tree_size(&self) -> usize {
        self.tree.len()
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        &self.space.obstacles
    }

    pub fn slice_index(&self) -> usize {
        self.slice_index
    }

    /// Logical time at the start of the current slice
    pub fn elapsed(&self) -> f64 {
        self.slice_index as f64 * self.config.slice_time
    }

    pub fn termination(&self) -> Option<&Termination> {
        self.termination.as_ref()
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Feed for obstacle changes, applied at the start of the next slice
    pub fn obstacle_sender(&self) -> Sender<ObstacleEvent> {
        self.event_sender.clone()
    }

    pub fn robot_pose(&self) -> &Position {
        self.robot.pose()
    }

    pub fn robot_edge(&self) -> Option<&M::Edge> {
        self.robot.edge()
    }

    pub fn robot_history(&self) -> &[Position] {
        self.robot.history()
    }

    pub fn traversed_edges(&self) -> impl Iterator<Item = &M::Edge> + '_ {
        self.robot.traversed_edges()
    }

    /// Overwrite the robot pose as reported by an external localisation source
    pub fn set_robot_pose(&mut self, pose: Position) {
        self.robot.teleport(pose);
    }

    /// `(child, parent)` positions of every parent edge in the graph
    pub fn tree_edges(&self) -> Vec<(Position, Position)> {
        self.tree
            .iter()
            .filter_map(|(_, position, node)| {
                node.parent().map(|p| (position.clone(), self.tree.position(p).clone()))
            })
            .collect()
    }

    /// Best known path from the robot to the root through the parent chain
    pub fn current_path(&self) -> Vec<Position> {
        let mut path = vec![self.robot.pose().clone()];
        let mut cursor = self.robot.target().or(self.space.move_goal);
        // a chain longer than the arena means a cycle
        let mut budget = self.tree.arena_len() + 1;
        while let Some(id) = cursor {
            if budget == 0 {
                warn!("parent chain did not reach the root");
                break;
            }
            budget -= 1;
            path.push(self.tree.position(id).clone());
            if id == self.root {
                break;
            }
            cursor = self.tree.get(id).parent();
        }
        path
    }

    /// Advance the planner by one time slice
    pub fn step(&mut self) -> RrtxResult<SliceStatus> {
        if let Some(termination) = &self.termination {
            return Ok(SliceStatus::Finished(termination.clone()));
        }
        if self.stop.is_stopped() {
            return Ok(self.finish(Termination::Stopped));
        }
        let elapsed = self.elapsed();
        if elapsed >= self.config.total_planning_time {
            return Ok(self.finish(Termination::TimeExhausted));
        }

        self.apply_pending_events(elapsed)?;
        self.process_obstacle_stack()?;

        let mut moved = false;
        if self.config.move_robot && elapsed > self.config.planning_only_time + self.config.slice_time {
            moved = self.advance_robot()?;
        }

        self.reduce_inconsistency()?;

        let distance_to_goal = self.space.distance(self.robot.pose(), self.tree.position(self.root));
        if distance_to_goal < self.config.goal_threshold {
            return Ok(self.finish(Termination::ReachedGoal));
        }
        let displacement = self.space.distance(self.robot.pose(), &self.prev_pose);
        let bound = self.config.max_move();
        if displacement > bound {
            return Ok(self.finish(Termination::ImpossibleMove {
                distance: displacement,
                bound,
            }));
        }
        self.prev_pose = self.robot.pose().clone();

        for _ in 0..self.config.samples_per_slice {
            self.sample_and_extend()?;
        }

        let report = SliceReport {
            slice: self.slice_index,
            elapsed,
            robot_pose: self.robot.pose().clone(),
            distance_to_goal,
            tree_size: self.tree.len(),
            moved,
        };
        trace!(
            slice = report.slice,
            tree = report.tree_size,
            queue = self.queue.len(),
            distance = report.distance_to_goal,
            "slice done"
        );
        self.slice_index += 1;
        Ok(SliceStatus::Running(report))
    }

    /// Step until the run terminates
    pub fn run(&mut self) -> RrtxResult<RunReport> {
        let slice = Duration::from_secs_f64(self.config.slice_time);
        loop {
            let started = Instant::now();
            match self.step()? {
                SliceStatus::Finished(termination) => return Ok(self.report(termination)),
                SliceStatus::Running(report) => {
                    if report.slice % 100 == 0 {
                        debug!(
                            slice = report.slice,
                            tree = report.tree_size,
                            distance = report.distance_to_goal,
                            "planning"
                        );
                    }
                    if self.config.realtime {
                        if let Some(rest) = slice.checked_sub(started.elapsed()) {
                            thread::sleep(rest);
                        }
                    }
                }
            }
        }
    }

    fn report(&self, termination: Termination) -> RunReport {
        RunReport {
            termination,
            slices: self.slice_index,
            robot_path: self.robot.history().to_vec(),
            distance_travelled: self.robot.distance_travelled(&self.space.distance_fn()),
            tree_size: self.tree.len(),
        }
    }

    fn finish(&mut self, termination: Termination) -> SliceStatus {
        match &termination {
            Termination::ImpossibleMove { distance, bound } => {
                warn!(distance, bound, slice = self.slice_index, "impossible move, stopping")
            }
            other => info!(termination = ?other, slice = self.slice_index, tree = self.tree.len(), "run finished"),
        }
        self.termination = Some(termination.clone());
        SliceStatus::Finished(termination)
    }

    /// Apply queued obstacle events and every scheduled change due by `elapsed`
    pub fn apply_pending_events(&mut self, elapsed: f64) -> RrtxResult<()> {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.apply_event(event)?,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        while self.schedule.front().map_or(false, |t| t.at <= elapsed) {
            if let Some(timed) = self.schedule.pop_front() {
                let event = if timed.appear {
                    ObstacleEvent::Added(timed.id, timed.obstacle)
                } else {
                    ObstacleEvent::Removed(timed.id)
                };
                self.apply_event(event)?;
            }
        }
        Ok(())
    }

    pub fn apply_event(&mut self, event: ObstacleEvent) -> RrtxResult<()> {
        match event {
            ObstacleEvent::Added(id, obstacle) => self.add_obstacle(id, obstacle),
            ObstacleEvent::Removed(id) => {
                self.remove_obstacle(id)?;
                Ok(())
            }
        }
    }

    fn set_move_goal(&mut self, id: NodeId) {
        if let Some(old) = self.space.move_goal {
            self.tree.get_mut(old).is_move_goal = false;
        }
        self.tree.get_mut(id).is_move_goal = true;
        self.space.move_goal = Some(id);
    }

    fn advance_robot(&mut self) -> RrtxResult<bool> {
        if self.robot.current_move_invalid {
            self.reanchor_robot()?;
            if self.robot.current_move_invalid {
                return Ok(false);
            }
        }

        if self.robot.edge().is_none() {
            let goal = self.move_goal();
            if goal == self.root {
                return Ok(false);
            }
            match &self.tree.get(goal).parent {
                Some(link) => {
                    let (next, edge) = (link.node, Rc::clone(&link.edge));
                    debug!(from = %goal, to = %next, "robot starts moving");
                    self.robot.enter_edge(next, edge);
                }
                None => return Ok(false),
            }
        }

        let step = self.config.robot_velocity * self.config.slice_time;
        let root = self.root;
        let tree = &self.tree;
        let moved = self.robot.advance(step, |node| {
            if node == root {
                return None;
            }
            tree.get(node).parent.as_ref().map(|link| (link.node, Rc::clone(&link.edge)))
        });
        if let Some(target) = self.robot.target() {
            if self.space.move_goal != Some(target) {
                self.set_move_goal(target);
            }
        }
        self.robot.record_pose();
        Ok(moved)
    }

    /// Attach the robot to the graph at its current pose after its edge was invalidated
    fn reanchor_robot(&mut self) -> RrtxResult<()> {
        let pose = self.robot.pose().clone();
        let (nearest, distance) = self.tree.nearest(&pose)?;
        let anchor = if distance <= 1e-9 {
            nearest
        } else {
            let goal = self.move_goal();
            let pending = !self.tree.is_indexed(goal) && self.tree.position(goal) == &pose;
            let id = if pending { goal } else { self.tree.add(pose, GraphNode::new()) };
            if !self.extend(id)? {
                warn!(node = %id, "robot cannot reconnect to the graph");
                self.set_move_goal(id);
                self.robot.leave_edge();
                return Ok(());
            }
            id
        };
        debug!(node = %anchor, "robot re-anchored");
        self.set_move_goal(anchor);
        self.robot.leave_edge();
        self.robot.current_move_invalid = false;
        Ok(())
    }

    /// Draw one sample and try to grow the graph toward it
    pub fn sample_and_extend(&mut self) -> RrtxResult<Option<NodeId>> {
        let Some((position, node)) = self.sample() else {
            return Ok(None);
        };
        self.insert_at(position, node)
    }

    /// Grow the graph toward `position`, as if it had been sampled
    pub fn insert_sample(&mut self, position: Position) -> RrtxResult<Option<NodeId>> {
        let position = self.space.wrapping().normalized(&position);
        self.insert_at(position, None)
    }

    fn insert_at(&mut self, mut position: Position, node: Option<NodeId>) -> RrtxResult<Option<NodeId>> {
        if self.tree.is_empty() {
            warn!("spatial index is empty, dropping sample");
            return Ok(None);
        }
        let (nearest, distance) = self.tree.nearest(&position)?;
        if distance <= 0.0 {
            return Ok(None);
        }
        let is_start = node == Some(self.start_node);
        if distance > self.space.delta() && !is_start {
            let edge = self.model.connect(self.tree.position(nearest), &position);
            position = edge.saturate(self.space.delta()).end().clone();
            self.space.normalize(&mut position);
        }
        if !self.space.point_free(&position) {
            return Ok(None);
        }

        let id = match node {
            Some(id) if is_start => id,
            _ => self.tree.add(position, GraphNode::new()),
        };
        if !self.extend(id)? {
            return Ok(None);
        }
        if id == self.start_node {
            info!(node = %id, lmc = self.tree.get(id).lookahead_cost, "robot start connected to the tree");
        }
        self.reduce_inconsistency()?;
        Ok(Some(id))
    }

    /// Next configuration to try; `Some(start_node)` marks the robot start
    fn sample(&mut self) -> Option<(Position, Option<NodeId>)> {
        while let Some((husk, _)) = self.space.sample_stack.pop_front() {
            self.tree.get_mut(husk).sample_handle = None;
            let position = self.tree.position(husk).clone();
            if !self.space.point_free(&position) {
                continue;
            }
            self.tree.get_mut(husk).freed = false;
            trace!(node = %husk, "re-sampling freed node");
            if husk == self.start_node {
                let revived = self.tree.add(position.clone(), GraphNode::new());
                self.start_node = revived;
                if self.space.move_goal == Some(husk) {
                    self.set_move_goal(revived);
                }
                return Some((position, Some(revived)));
            }
            return Some((position, None));
        }

        if self.rng.gen_bool(self.space.p_goal) {
            let start = self.start_node;
            if self.tree.is_indexed(start) {
                return None;
            }
            return Some((self.tree.position(start).clone(), Some(start)));
        }
        Some((self.space.random_position(&mut self.rng), None))
    }

    /// Connect an allocated, unindexed node to the best parent in its ball
    ///
    /// Returns false when no feasible edge reaches a node with a finite cost,
    /// in which case the node stays out of the index.
    pub(crate) fn extend(&mut self, id: NodeId) -> RrtxResult<bool> {
        let position = self.tree.position(id).clone();
        let radius = self.space.ball_radius(self.tree.len());
        let mut candidates = self.tree.near(&position, radius);
        let (nearest, nearest_distance) = self.tree.nearest(&position)?;
        if !candidates.iter().any(|(c, _)| *c == nearest) {
            candidates.push((nearest, nearest_distance));
        }

        let robot_radius = self.space.robot_radius;
        let mut best: Option<(NodeId, Rc<M::Edge>, f64)> = None;
        let mut links = Vec::with_capacity(candidates.len());
        for (u, _) in candidates {
            if u == id {
                continue;
            }
            let other = self.tree.position(u).clone();
            let out_edge = self.model.connect(&position, &other);
            let in_edge = self.model.connect(&other, &position);
            let usable = |e: &M::Edge| e.cost() > 0.0 && e.feasible(&self.space.obstacles, robot_radius);
            let out_edge = usable(&out_edge).then(|| Rc::new(out_edge));
            let in_edge = usable(&in_edge).then(|| Rc::new(in_edge));

            if let Some(edge) = &out_edge {
                let through = edge.cost() + self.tree.get(u).lookahead_cost;
                if through.is_finite() && best.as_ref().map_or(true, |(_, _, c)| through < *c) {
                    best = Some((u, Rc::clone(edge), through));
                }
            }
            links.push((u, out_edge, in_edge));
        }

        let Some((parent, parent_edge, lmc)) = best else {
            trace!(node = %id, "no feasible parent, sample discarded");
            return Ok(false);
        };

        self.tree.insert(id)?;
        {
            let node = self.tree.get_mut(id);
            node.lookahead_cost = lmc;
            node.in_tree = true;
        }
        self.make_parent_of(id, parent, parent_edge);
        for (u, out_edge, in_edge) in links {
            if let Some(edge) = out_edge {
                self.link(id, u, edge);
            }
            if let Some(edge) = in_edge {
                self.link(u, id, edge);
            }
        }

        self.rewire_neighbors(id)?;
        let node = self.tree.get_mut(id);
        node.tree_cost = node.lookahead_cost;
        Ok(true)
    }

    /// Register a new obstacle and queue every node it may affect
    pub fn add_obstacle(&mut self, id: ObstacleId, obstacle: CircleObstacle) -> RrtxResult<()> {
        if self.space.obstacles.get(id).is_some() {
            self.remove_obstacle(id)?;
        }
        let robot_radius = self.space.robot_radius;
        let affected = self.nodes_near_xy(obstacle.x, obstacle.y, self.obstacle_reach(&obstacle));
        debug!(obstacle = id.0, affected = affected.len(), "obstacle added");

        for v in affected {
            if v != self.root && obstacle.collides_point(self.tree.position(v), robot_radius) {
                self.tree.delete(v);
                self.tree.get_mut(v).freed = true;
            }
            self.push_obstacle_stack(v);
        }
        self.space.obstacles.insert(id, obstacle);

        if let Some(edge) = self.robot.edge() {
            if !edge.feasible(&self.space.obstacles, robot_radius) {
                warn!(obstacle = id.0, "obstacle blocks the robot's current edge");
                self.robot.current_move_invalid = true;
            }
        }
        Ok(())
    }

    /// Forget an obstacle; returns whether it existed
    pub fn remove_obstacle(&mut self, id: ObstacleId) -> RrtxResult<bool> {
        let Some(obstacle) = self.space.obstacles.remove(id) else {
            return Ok(false);
        };
        let robot_radius = self.space.robot_radius;
        let affected = self.nodes_near_xy(obstacle.x, obstacle.y, self.obstacle_reach(&obstacle));
        debug!(obstacle = id.0, affected = affected.len(), "obstacle removed");
        for v in affected {
            self.tree.get_mut(v).needs_reconnect = true;
            self.push_obstacle_stack(v);
        }

        let freed: Vec<NodeId> = self
            .tree
            .deleted()
            .filter(|(_, p, n)| {
                n.freed && n.sample_handle.is_none() && obstacle.collides_point(p, robot_radius) && self.space.point_free(p)
            })
            .map(|(v, _, _)| v)
            .collect();
        for v in freed {
            let handle = self.space.sample_stack.push_back(v, 0.0);
            self.tree.get_mut(v).sample_handle = Some(handle);
        }
        Ok(true)
    }

    /// Planar distance from the obstacle centre within which a node may own an
    /// edge that touches the inflated obstacle
    fn obstacle_reach(&self, obstacle: &CircleObstacle) -> f64 {
        let edge_reach = self.model.reach(self.space.delta()).max(self.longest_edge);
        obstacle.radius + self.space.robot_radius + edge_reach
    }

    fn push_obstacle_stack(&mut self, v: NodeId) {
        if self.tree.get(v).obstacle_handle.is_none() {
            let handle = self.space.obstacle_stack.push_back(v, 0.0);
            self.tree.get_mut(v).obstacle_handle = Some(handle);
        }
    }

    /// Live nodes within planar distance `reach` of `(x, y)`
    fn nodes_near_xy(&self, x: f64, y: f64, reach: f64) -> Vec<NodeId> {
        let dims = self.space.dims();
        let mut lower = Position::from_element(dims, f64::NEG_INFINITY);
        let mut upper = Position::from_element(dims, f64::INFINITY);
        lower[0] = x - reach;
        upper[0] = x + reach;
        if dims > 1 {
            lower[1] = y - reach;
            upper[1] = y + reach;
        }
        self.tree
            .within_box(&lower, &upper)
            .into_iter()
            .filter(|&v| {
                let p = self.tree.position(v);
                let dy = if dims > 1 { p[1] - y } else { 0.0 };
                (p[0] - x).hypot(dy) <= reach
            })
            .collect()
    }
}
