//! Robot state: where it is, which edge it follows, where it has been

use std::rc::Rc;

use crate::common::{NodeId, Position, Trajectory};
use crate::path_planning::rrtx::distance::DistanceFn;

#[derive(Debug)]
pub struct Robot<E> {
    pose: Position,
    edge: Option<Rc<E>>,
    // end node of `edge`
    target: Option<NodeId>,
    distance_along: f64,
    history: Vec<Position>,
    traversed: Vec<Rc<E>>,
    /// Current edge was invalidated by an obstacle
    pub(crate) current_move_invalid: bool,
}

impl<E: Trajectory> Robot<E> {
    pub fn new(pose: Position) -> Self {
        Robot {
            history: vec![pose.clone()],
            pose,
            edge: None,
            target: None,
            distance_along: 0.0,
            traversed: Vec::new(),
            current_move_invalid: false,
        }
    }

    pub fn pose(&self) -> &Position {
        &self.pose
    }

    pub fn edge(&self) -> Option<&E> {
        self.edge.as_deref()
    }

    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Every recorded pose, the start pose first
    pub fn history(&self) -> &[Position] {
        &self.history
    }

    /// Edges in the order the robot entered them
    pub fn traversed_edges(&self) -> impl Iterator<Item = &E> + '_ {
        self.traversed.iter().map(|e| e.as_ref())
    }

    pub fn distance_travelled(&self, distance: &DistanceFn) -> f64 {
        self.history.windows(2).map(|w| distance(&w[0], &w[1])).sum()
    }

    /// Start following `edge` toward `target` from its beginning
    pub fn enter_edge(&mut self, target: NodeId, edge: Rc<E>) {
        self.pose = edge.start().clone();
        self.traversed.push(Rc::clone(&edge));
        self.edge = Some(edge);
        self.target = Some(target);
        self.distance_along = 0.0;
    }

    /// Drop the current edge, keeping the pose
    pub fn leave_edge(&mut self) {
        self.edge = None;
        self.target = None;
        self.distance_along = 0.0;
    }

    /// Move the pose without following an edge
    pub fn teleport(&mut self, pose: Position) {
        self.pose = pose;
    }

    /// Travel `distance` along the current edge, hopping onto the edge that
    /// `next_edge` returns for each node reached. Stops early when the end node
    /// has no onward edge. Returns whether the pose changed.
    pub fn advance<F>(&mut self, distance: f64, mut next_edge: F) -> bool
    where
        F: FnMut(NodeId) -> Option<(NodeId, Rc<E>)>,
    {
        let before = self.pose.clone();
        let mut remaining = distance;
        while let (Some(edge), Some(target)) = (self.edge.clone(), self.target) {
            let left = edge.length() - self.distance_along;
            if remaining < left {
                self.distance_along += remaining;
                self.pose = edge.pose_at_distance(self.distance_along);
                break;
            }
            remaining -= left.max(0.0);
            self.distance_along = edge.length();
            self.pose = edge.end().clone();
            match next_edge(target) {
                Some((next, next_edge_rc)) => {
                    self.traversed.push(Rc::clone(&next_edge_rc));
                    self.edge = Some(next_edge_rc);
                    self.target = Some(next);
                    self.distance_along = 0.0;
                }
                None => break,
            }
        }
        self.pose != before
    }

    pub fn record_pose(&mut self) {
        self.history.push(self.pose.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EdgeModel;
    use crate::path_planning::rrtx::distance::{euclidean, Wrapping};
    use crate::path_planning::rrtx::edge::{StraightEdge, StraightLineModel};
    use nalgebra::DVector;

    fn pos(v: &[f64]) -> Position {
        DVector::from_row_slice(v)
    }

    fn edge(from: &[f64], to: &[f64]) -> Rc<StraightEdge> {
        let model = StraightLineModel::new(Wrapping::none(), euclidean(), 1.0);
        Rc::new(model.connect(&pos(from), &pos(to)))
    }

    #[test]
    fn test_advance_along_single_edge() {
        let mut robot = Robot::new(pos(&[0.0, 0.0]));
        robot.enter_edge(NodeId(1), edge(&[0.0, 0.0], &[10.0, 0.0]));
        assert!(robot.advance(4.0, |_| None));
        assert_eq!(robot.pose(), &pos(&[4.0, 0.0]));
        assert_eq!(robot.target(), Some(NodeId(1)));
    }

    #[test]
    fn test_hops_to_next_edge_and_stops_at_end() {
        let mut robot = Robot::new(pos(&[0.0, 0.0]));
        robot.enter_edge(NodeId(1), edge(&[0.0, 0.0], &[3.0, 0.0]));
        let second = edge(&[3.0, 0.0], &[3.0, 4.0]);
        let next = |n: NodeId| (n == NodeId(1)).then(|| (NodeId(0), Rc::clone(&second)));

        robot.advance(5.0, next);
        assert!((robot.pose() - pos(&[3.0, 2.0])).norm() < 1e-12);
        assert_eq!(robot.target(), Some(NodeId(0)));
        assert_eq!(robot.traversed_edges().count(), 2);

        // past the final node the robot waits there
        robot.advance(50.0, |_| None);
        assert_eq!(robot.pose(), &pos(&[3.0, 4.0]));
        assert!(!robot.advance(1.0, |_| None));
    }

    #[test]
    fn test_history_and_distance() {
        let mut robot: Robot<StraightEdge> = Robot::new(pos(&[0.0, 0.0]));
        assert_eq!(robot.history().len(), 1);
        robot.teleport(pos(&[3.0, 4.0]));
        robot.record_pose();
        assert_eq!(robot.history().len(), 2);
        assert!((robot.distance_travelled(&euclidean()) - 5.0).abs() < 1e-12);
    }
}
