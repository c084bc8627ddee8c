//! Doubly-linked keyed list with O(1) removal by handle
//!
//! Entries live in a slab; freed slots are recycled. Every slot carries a
//! generation counter, so a handle that outlived its entry is recognised as
//! stale instead of silently removing whatever reused the slot.

/// Handle to an entry of a [`NeighborList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListHandle {
    slot: usize,
    generation: u32,
}

#[derive(Debug)]
struct Slot<T> {
    item: Option<T>,
    key: f64,
    generation: u32,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
pub struct NeighborList<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    front: Option<usize>,
    back: Option<usize>,
    len: usize,
}

impl<T> NeighborList<T> {
    pub fn new() -> Self {
        NeighborList {
            slots: Vec::new(),
            free: Vec::new(),
            front: None,
            back: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn allocate(&mut self, item: T, key: f64) -> usize {
        match self.free.pop() {
            Some(slot) => {
                let s = &mut self.slots[slot];
                s.item = Some(item);
                s.key = key;
                s.prev = None;
                s.next = None;
                slot
            }
            None => {
                self.slots.push(Slot {
                    item: Some(item),
                    key,
                    generation: 0,
                    prev: None,
                    next: None,
                });
                self.slots.len() - 1
            }
        }
    }

    fn handle(&self, slot: usize) -> ListHandle {
        ListHandle {
            slot,
            generation: self.slots[slot].generation,
        }
    }

    fn resolve(&self, handle: ListHandle) -> Option<usize> {
        let s = self.slots.get(handle.slot)?;
        (s.generation == handle.generation && s.item.is_some()).then_some(handle.slot)
    }

    pub fn push_front(&mut self, item: T, key: f64) -> ListHandle {
        let slot = self.allocate(item, key);
        self.slots[slot].next = self.front;
        match self.front {
            Some(f) => self.slots[f].prev = Some(slot),
            None => self.back = Some(slot),
        }
        self.front = Some(slot);
        self.len += 1;
        self.handle(slot)
    }

    pub fn push_back(&mut self, item: T, key: f64) -> ListHandle {
        let slot = self.allocate(item, key);
        self.slots[slot].prev = self.back;
        match self.back {
            Some(b) => self.slots[b].next = Some(slot),
            None => self.front = Some(slot),
        }
        self.back = Some(slot);
        self.len += 1;
        self.handle(slot)
    }

    /// Front entry without removing it
    pub fn peek_front(&self) -> Option<(ListHandle, &T, f64)> {
        let slot = self.front?;
        let s = &self.slots[slot];
        s.item.as_ref().map(|item| (self.handle(slot), item, s.key))
    }

    pub fn pop_front(&mut self) -> Option<(T, f64)> {
        let slot = self.front?;
        let handle = self.handle(slot);
        self.remove(handle)
    }

    /// Remove the entry behind `handle`; stale handles are a no-op returning `None`
    pub fn remove(&mut self, handle: ListHandle) -> Option<(T, f64)> {
        let slot = self.resolve(handle)?;
        let (prev, next) = (self.slots[slot].prev, self.slots[slot].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.front = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.back = prev,
        }

        let s = &mut self.slots[slot];
        let item = s.item.take()?;
        let key = s.key;
        s.generation = s.generation.wrapping_add(1);
        s.prev = None;
        s.next = None;
        self.free.push(slot);
        self.len -= 1;
        Some((item, key))
    }

    pub fn contains(&self, handle: ListHandle) -> bool {
        self.resolve(handle).is_some()
    }

    pub fn get(&self, handle: ListHandle) -> Option<&T> {
        let slot = self.resolve(handle)?;
        self.slots[slot].item.as_ref()
    }

    pub fn get_mut(&mut self, handle: ListHandle) -> Option<&mut T> {
        let slot = self.resolve(handle)?;
        self.slots[slot].item.as_mut()
    }

    pub fn key(&self, handle: ListHandle) -> Option<f64> {
        self.resolve(handle).map(|slot| self.slots[slot].key)
    }

    /// Drop every entry; all outstanding handles become stale
    pub fn clear(&mut self) {
        let mut cursor = self.front;
        while let Some(slot) = cursor {
            let s = &mut self.slots[slot];
            cursor = s.next;
            s.item = None;
            s.generation = s.generation.wrapping_add(1);
            s.prev = None;
            s.next = None;
            self.free.push(slot);
        }
        self.front = None;
        self.back = None;
        self.len = 0;
    }

    /// Entries front to back
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.front,
        }
    }
}

impl<T> Default for NeighborList<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Iter<'a, T> {
    list: &'a NeighborList<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (ListHandle, &'a T, f64);

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.cursor?;
        let s = &self.list.slots[slot];
        self.cursor = s.next;
        s.item.as_ref().map(|item| (self.list.handle(slot), item, s.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items<T: Copy>(list: &NeighborList<T>) -> Vec<T> {
        list.iter().map(|(_, item, _)| *item).collect()
    }

    #[test]
    fn test_push_front_and_back_order() {
        let mut list = NeighborList::new();
        list.push_back(2, 0.2);
        list.push_front(1, 0.1);
        list.push_back(3, 0.3);
        assert_eq!(items(&list), vec![1, 2, 3]);
        assert_eq!(list.len(), 3);

        let (_, front, key) = list.peek_front().unwrap();
        assert_eq!(*front, 1);
        assert_eq!(key, 0.1);
    }

    #[test]
    fn test_pop_front_drains_in_order() {
        let mut list = NeighborList::new();
        for i in 0..4 {
            list.push_back(i, i as f64);
        }
        assert_eq!(list.pop_front(), Some((0, 0.0)));
        assert_eq!(list.pop_front(), Some((1, 1.0)));
        list.push_front(9, 9.0);
        assert_eq!(items(&list), vec![9, 2, 3]);
        list.pop_front();
        list.pop_front();
        list.pop_front();
        assert!(list.pop_front().is_none());
        assert!(list.is_empty());
        assert!(list.peek_front().is_none());
    }

    #[test]
    fn test_remove_middle_front_back() {
        let mut list = NeighborList::new();
        let a = list.push_back('a', 1.0);
        let b = list.push_back('b', 2.0);
        let c = list.push_back('c', 3.0);
        let d = list.push_back('d', 4.0);

        assert_eq!(list.remove(b), Some(('b', 2.0)));
        assert_eq!(items(&list), vec!['a', 'c', 'd']);
        assert_eq!(list.remove(a), Some(('a', 1.0)));
        assert_eq!(list.remove(d), Some(('d', 4.0)));
        assert_eq!(items(&list), vec!['c']);
        assert_eq!(list.key(c), Some(3.0));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut list = NeighborList::new();
        let a = list.push_back(1, 0.0);
        let b = list.push_back(2, 0.0);
        let c = list.push_back(3, 0.0);

        assert!(list.remove(b).is_some());
        assert!(list.remove(b).is_none());
        assert_eq!(list.len(), 2);
        assert_eq!(items(&list), vec![1, 3]);

        // the freed slot is recycled; the stale handle must not reach the new entry
        let e = list.push_front(4, 0.0);
        assert!(list.remove(b).is_none());
        assert!(!list.contains(b));
        assert!(list.contains(e));
        assert_eq!(items(&list), vec![4, 1, 3]);
        assert_eq!(list.len(), 3);

        list.remove(a);
        list.remove(c);
        list.remove(e);
        assert!(list.is_empty());
        assert!(list.remove(a).is_none());
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut list = NeighborList::new();
        let a = list.push_back(1, 0.0);
        list.push_back(2, 0.0);
        list.clear();
        assert!(list.is_empty());
        assert!(list.remove(a).is_none());

        list.push_back(5, 0.5);
        assert_eq!(items(&list), vec![5]);
        assert!(list.get(a).is_none());
    }

    #[test]
    fn test_get_mut_updates_in_place() {
        let mut list = NeighborList::new();
        let h = list.push_back(10, 1.0);
        *list.get_mut(h).unwrap() += 5;
        assert_eq!(list.get(h), Some(&15));
    }
}
