//! Indexed binary min-heap of graph nodes keyed by their inconsistency
//!
//! A position map from [`NodeId`] to heap slot gives O(log n) decrease-key,
//! increase-key and removal of arbitrary entries.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;

use crate::common::{NodeId, RrtxError, RrtxResult};

/// Priority of a node: `min(g, lmc)` first, smaller `lmc` breaks ties
#[derive(Debug, Clone, Copy)]
pub struct QueueKey {
    pub primary: f64,
    pub lmc: f64,
}

impl QueueKey {
    pub fn new(tree_cost: f64, lookahead_cost: f64) -> Self {
        QueueKey {
            primary: tree_cost.min(lookahead_cost),
            lmc: lookahead_cost,
        }
    }

    fn ordered(&self) -> (OrderedFloat<f64>, OrderedFloat<f64>) {
        (OrderedFloat(self.primary), OrderedFloat(self.lmc))
    }
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.ordered() == other.ordered()
    }
}

impl Eq for QueueKey {}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordered().cmp(&other.ordered())
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
pub struct RewireQueue {
    heap: Vec<(NodeId, QueueKey)>,
    positions: Vec<Option<usize>>,
}

impl RewireQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.position(node).is_some()
    }

    fn position(&self, node: NodeId) -> Option<usize> {
        self.positions.get(node.0).copied().flatten()
    }

    fn set_position(&mut self, node: NodeId, position: Option<usize>) {
        if node.0 >= self.positions.len() {
            self.positions.resize(node.0 + 1, None);
        }
        self.positions[node.0] = position;
    }

    /// Key the node was last pushed with
    pub fn key_of(&self, node: NodeId) -> Option<QueueKey> {
        self.position(node).map(|i| self.heap[i].1)
    }

    /// Push a node, or reposition it if already queued
    pub fn insert(&mut self, node: NodeId, key: QueueKey) {
        if self.update(node, key) {
            return;
        }
        self.heap.push((node, key));
        let last = self.heap.len() - 1;
        self.set_position(node, Some(last));
        self.sift_up(last);
    }

    /// Reposition a queued node under a new key; false if it is not queued
    pub fn update(&mut self, node: NodeId, key: QueueKey) -> bool {
        let Some(i) = self.position(node) else {
            return false;
        };
        let old = self.heap[i].1;
        self.heap[i].1 = key;
        match key.cmp(&old) {
            Ordering::Less => self.sift_up(i),
            Ordering::Greater => self.sift_down(i),
            Ordering::Equal => {}
        }
        true
    }

    /// Remove an arbitrary node; false if it was not queued
    pub fn remove(&mut self, node: NodeId) -> bool {
        let Some(i) = self.position(node) else {
            return false;
        };
        self.take_at(i);
        true
    }

    pub fn peek(&self) -> Option<(NodeId, QueueKey)> {
        self.heap.first().copied()
    }

    pub fn pop_min(&mut self) -> RrtxResult<NodeId> {
        if self.heap.is_empty() {
            return Err(RrtxError::EmptyQueue);
        }
        Ok(self.take_at(0).0)
    }

    pub fn clear(&mut self) {
        for (node, _) in self.heap.drain(..) {
            if let Some(p) = self.positions.get_mut(node.0) {
                *p = None;
            }
        }
    }

    fn take_at(&mut self, i: usize) -> (NodeId, QueueKey) {
        let entry = self.heap.swap_remove(i);
        self.set_position(entry.0, None);
        if i < self.heap.len() {
            let moved = self.heap[i].0;
            self.set_position(moved, Some(i));
            self.sift_down(i);
            self.sift_up(i);
        }
        entry
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.heap.swap(a, b);
        let (na, nb) = (self.heap[a].0, self.heap[b].0);
        self.set_position(na, Some(a));
        self.set_position(nb, Some(b));
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.heap[i].1 < self.heap[parent].1 {
                self.swap(i, parent);
                i = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.heap.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < n && self.heap[left].1 < self.heap[smallest].1 {
                smallest = left;
            }
            if right < n && self.heap[right].1 < self.heap[smallest].1 {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.swap(i, smallest);
            i = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(queue: &mut RewireQueue) -> Vec<usize> {
        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.pop_min().unwrap().0);
        }
        out
    }

    #[test]
    fn test_pop_in_key_order() {
        let mut q = RewireQueue::new();
        q.insert(NodeId(0), QueueKey::new(5.0, 5.0));
        q.insert(NodeId(1), QueueKey::new(f64::INFINITY, 2.0));
        q.insert(NodeId(2), QueueKey::new(3.0, 9.0));
        q.insert(NodeId(3), QueueKey::new(1.0, 1.0));
        assert_eq!(drain(&mut q), vec![3, 1, 2, 0]);
    }

    #[test]
    fn test_tie_broken_by_lookahead() {
        let mut q = RewireQueue::new();
        // both have primary key 4.0
        q.insert(NodeId(0), QueueKey::new(4.0, 7.0));
        q.insert(NodeId(1), QueueKey::new(6.0, 4.0));
        q.insert(NodeId(2), QueueKey::new(4.0, 5.0));
        assert_eq!(drain(&mut q), vec![1, 2, 0]);
    }

    #[test]
    fn test_insert_existing_acts_as_update() {
        let mut q = RewireQueue::new();
        q.insert(NodeId(0), QueueKey::new(1.0, 1.0));
        q.insert(NodeId(1), QueueKey::new(2.0, 2.0));
        q.insert(NodeId(1), QueueKey::new(0.5, 0.5));
        assert_eq!(q.len(), 2);
        assert_eq!(q.peek().unwrap().0, NodeId(1));

        assert!(q.update(NodeId(1), QueueKey::new(3.0, 3.0)));
        assert_eq!(q.peek().unwrap().0, NodeId(0));
        assert!(!q.update(NodeId(9), QueueKey::new(0.0, 0.0)));
    }

    #[test]
    fn test_remove_arbitrary() {
        let mut q = RewireQueue::new();
        for i in 0..10 {
            q.insert(NodeId(i), QueueKey::new(i as f64, i as f64));
        }
        assert!(q.remove(NodeId(0)));
        assert!(q.remove(NodeId(5)));
        assert!(!q.remove(NodeId(5)));
        assert!(!q.contains(NodeId(5)));
        assert_eq!(drain(&mut q), vec![1, 2, 3, 4, 6, 7, 8, 9]);
    }

    #[test]
    fn test_pop_empty_fails() {
        let mut q = RewireQueue::new();
        assert!(matches!(q.pop_min(), Err(RrtxError::EmptyQueue)));
        assert!(q.peek().is_none());
    }

    #[test]
    fn test_clear_forgets_positions() {
        let mut q = RewireQueue::new();
        q.insert(NodeId(4), QueueKey::new(1.0, 1.0));
        q.clear();
        assert!(!q.contains(NodeId(4)));
        q.insert(NodeId(4), QueueKey::new(2.0, 2.0));
        assert_eq!(q.len(), 1);
        assert_eq!(q.key_of(NodeId(4)).unwrap().primary, 2.0);
    }
}
