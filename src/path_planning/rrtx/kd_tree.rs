//! KD-tree spatial index over a space with wrapped dimensions
//!
//! The tree doubles as the node arena of the planner: every graph node lives
//! in `nodes` and is addressed by [`NodeId`]. A node can exist in the arena
//! without being indexed (the robot's start node before it joins the search
//! graph) and can be lazily deleted, after which queries never return it.
//!
//! Queries on wrapped dimensions are answered by repeating the search for every
//! image of the query shifted by `{0, -P, +P}` along each wrapped axis. Pruning
//! uses the per-axis gap to the splitting plane, so the injected distance must be
//! at least that gap for the best image (true for Euclidean-type metrics).

use itertools::Itertools;
use nalgebra::DVector;

use crate::common::{NodeId, Position, RrtxError, RrtxResult};
use crate::path_planning::rrtx::distance::{DistanceFn, Wrapping};

#[derive(Debug)]
struct KdNode<T> {
    position: Position,
    data: T,
    split: usize,
    left: Option<NodeId>,
    right: Option<NodeId>,
    indexed: bool,
    deleted: bool,
}

impl<T> KdNode<T> {
    fn is_live(&self) -> bool {
        self.indexed && !self.deleted
    }
}

pub struct KdTree<T> {
    dims: usize,
    distance: DistanceFn,
    nodes: Vec<KdNode<T>>,
    root: Option<NodeId>,
    live: usize,
    // translations of a query covering every wrap seam, identity first
    images: Vec<Position>,
}

impl<T> KdTree<T> {
    pub fn new(dims: usize, wrapping: &Wrapping, distance: DistanceFn) -> Self {
        let images = Self::image_offsets(dims, wrapping);
        KdTree {
            dims,
            distance,
            nodes: Vec::new(),
            root: None,
            live: 0,
            images,
        }
    }

    fn image_offsets(dims: usize, wrapping: &Wrapping) -> Vec<Position> {
        let specs = wrapping.specs();
        if specs.is_empty() {
            return vec![DVector::zeros(dims)];
        }
        specs
            .iter()
            .map(|w| vec![0.0, -w.period, w.period])
            .multi_cartesian_product()
            .map(|shifts| {
                let mut offset = DVector::zeros(dims);
                for (w, shift) in specs.iter().zip(shifts) {
                    offset[w.dim] = shift;
                }
                offset
            })
            .collect()
    }

    /// Allocate a node in the arena without indexing it
    pub fn add(&mut self, position: Position, data: T) -> NodeId {
        debug_assert_eq!(position.len(), self.dims);
        let id = NodeId(self.nodes.len());
        self.nodes.push(KdNode {
            position,
            data,
            split: 0,
            left: None,
            right: None,
            indexed: false,
            deleted: false,
        });
        id
    }

    /// Link an allocated node into the tree
    pub fn insert(&mut self, id: NodeId) -> RrtxResult<()> {
        let node = &self.nodes[id.0];
        if node.indexed || node.deleted {
            return Err(RrtxError::DuplicateInsert(id));
        }

        let mut depth_split = 0;
        match self.root {
            None => self.root = Some(id),
            Some(mut cursor) => loop {
                let parent = &self.nodes[cursor.0];
                let s = parent.split;
                let go_left = self.nodes[id.0].position[s] < parent.position[s];
                let next = if go_left { parent.left } else { parent.right };
                match next {
                    Some(n) => cursor = n,
                    None => {
                        let parent = &mut self.nodes[cursor.0];
                        if go_left {
                            parent.left = Some(id);
                        } else {
                            parent.right = Some(id);
                        }
                        depth_split = (s + 1) % self.dims;
                        break;
                    }
                }
            },
        }

        let node = &mut self.nodes[id.0];
        node.split = depth_split;
        node.indexed = true;
        self.live += 1;
        Ok(())
    }

    /// Add and index in one step
    pub fn add_and_insert(&mut self, position: Position, data: T) -> RrtxResult<NodeId> {
        let id = self.add(position, data);
        self.insert(id)?;
        Ok(id)
    }

    /// Lazily remove a node from future queries; returns false if it was not live
    pub fn delete(&mut self, id: NodeId) -> bool {
        let node = &mut self.nodes[id.0];
        if !node.is_live() {
            return false;
        }
        node.deleted = true;
        self.live -= 1;
        true
    }

    /// Nearest live node to `query` and its distance
    pub fn nearest(&self, query: &Position) -> RrtxResult<(NodeId, f64)> {
        if self.live == 0 {
            return Err(RrtxError::EmptyIndex);
        }
        let mut best: Option<(NodeId, f64)> = None;
        for offset in &self.images {
            let image = query + offset;
            self.nearest_from(self.root, &image, &mut best);
        }
        best.ok_or(RrtxError::EmptyIndex)
    }

    fn nearest_from(&self, cursor: Option<NodeId>, query: &Position, best: &mut Option<(NodeId, f64)>) {
        let Some(id) = cursor else { return };
        let node = &self.nodes[id.0];
        if node.is_live() {
            let d = (self.distance)(query, &node.position);
            if best.map_or(true, |(_, b)| d < b) {
                *best = Some((id, d));
            }
        }

        let gap = query[node.split] - node.position[node.split];
        let (near_side, far_side) = if gap < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.nearest_from(near_side, query, best);
        if best.map_or(true, |(_, b)| gap.abs() <= b) {
            self.nearest_from(far_side, query, best);
        }
    }

    /// Every live node within `radius` of `query`, closest first
    pub fn near(&self, query: &Position, radius: f64) -> Vec<(NodeId, f64)> {
        let mut found = Vec::new();
        if self.live == 0 {
            return found;
        }
        for offset in &self.images {
            let image = query + offset;
            self.near_from(self.root, &image, radius, &mut found);
        }
        // a node can be reached from several images
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.total_cmp(&b.1)));
        found.dedup_by_key(|(id, _)| *id);
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        found
    }

    fn near_from(&self, cursor: Option<NodeId>, query: &Position, radius: f64, found: &mut Vec<(NodeId, f64)>) {
        let Some(id) = cursor else { return };
        let node = &self.nodes[id.0];
        if node.is_live() {
            let d = (self.distance)(query, &node.position);
            if d <= radius {
                found.push((id, d));
            }
        }

        let gap = query[node.split] - node.position[node.split];
        let (near_side, far_side) = if gap < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };
        self.near_from(near_side, query, radius, found);
        if gap.abs() <= radius {
            self.near_from(far_side, query, radius, found);
        }
    }

    /// Live nodes inside the axis-aligned box `[lower, upper]` (no wrapping)
    pub fn within_box(&self, lower: &Position, upper: &Position) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.box_from(self.root, lower, upper, &mut found);
        found.sort();
        found
    }

    fn box_from(&self, cursor: Option<NodeId>, lower: &Position, upper: &Position, found: &mut Vec<NodeId>) {
        let Some(id) = cursor else { return };
        let node = &self.nodes[id.0];
        let p = &node.position;
        if node.is_live() && (0..self.dims).all(|i| p[i] >= lower[i] && p[i] <= upper[i]) {
            found.push(id);
        }
        let s = node.split;
        if lower[s] < p[s] {
            self.box_from(node.left, lower, upper, found);
        }
        if upper[s] >= p[s] {
            self.box_from(node.right, lower, upper, found);
        }
    }

    pub fn distance(&self, a: &Position, b: &Position) -> f64 {
        (self.distance)(a, b)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Number of live indexed nodes
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of nodes ever allocated, including unindexed and deleted ones
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_indexed(&self, id: NodeId) -> bool {
        self.nodes[id.0].indexed
    }

    pub fn is_deleted(&self, id: NodeId) -> bool {
        self.nodes[id.0].deleted
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.nodes[id.0].is_live()
    }

    pub fn position(&self, id: NodeId) -> &Position {
        &self.nodes[id.0].position
    }

    pub fn get(&self, id: NodeId) -> &T {
        &self.nodes[id.0].data
    }

    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.nodes[id.0].data
    }

    /// Live nodes in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Position, &T)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.is_live())
            .map(|(i, n)| (NodeId(i), &n.position, &n.data))
    }

    /// Deleted nodes in allocation order
    pub fn deleted(&self) -> impl Iterator<Item = (NodeId, &Position, &T)> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.deleted)
            .map(|(i, n)| (NodeId(i), &n.position, &n.data))
    }
}
