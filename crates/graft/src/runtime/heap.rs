//! Binary min-heap addressed by item.
//!
//! Each item's slot is tracked in a side table, so membership tests,
//! priority lookups and removal of arbitrary items are cheap, none of which
//! `std::collections::BinaryHeap` offers. The growth loop asks whether a
//! node is still queued before dropping the stack below it.

use crate::rule::FastMap;
use std::hash::Hash;

#[derive(Debug)]
pub struct IndexedHeap<T, P> {
    entries: Vec<(P, T)>,
    slots: FastMap<T, usize>,
}

impl<T, P> Default for IndexedHeap<T, P> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            slots: FastMap::default(),
        }
    }
}

impl<T, P> IndexedHeap<T, P>
where
    T: Copy + Eq + Hash,
    P: Copy + Ord,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, item: T) -> bool {
        self.slots.contains_key(&item)
    }

    #[must_use]
    pub fn priority(&self, item: T) -> Option<P> {
        self.slots.get(&item).map(|slot| self.entries[*slot].0)
    }

    #[must_use]
    pub fn peek(&self) -> Option<(P, T)> {
        self.entries.first().copied()
    }

    /// Insert `item`, or lower its priority if it is already queued.
    ///
    /// Returns `true` if the item was not queued before.
    pub fn push(&mut self, item: T, priority: P) -> bool {
        if let Some(&slot) = self.slots.get(&item) {
            if priority < self.entries[slot].0 {
                self.entries[slot].0 = priority;
                self.sift_up(slot);
            }
            return false;
        }
        let slot = self.entries.len();
        self.entries.push((priority, item));
        self.slots.insert(item, slot);
        self.sift_up(slot);
        true
    }

    pub fn pop(&mut self) -> Option<(P, T)> {
        if self.entries.is_empty() {
            return None;
        }
        Some(self.take(0))
    }

    /// Pop the minimum only if `accept` holds for its priority.
    pub fn pop_if(&mut self, accept: impl FnOnce(&P) -> bool) -> Option<(P, T)> {
        match self.entries.first() {
            Some((priority, _)) if accept(priority) => self.pop(),
            _ => None,
        }
    }

    pub fn remove(&mut self, item: T) -> Option<P> {
        let slot = *self.slots.get(&item)?;
        Some(self.take(slot).0)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.slots.clear();
    }

    fn take(&mut self, slot: usize) -> (P, T) {
        let last = self.entries.len() - 1;
        self.swap(slot, last);
        let removed = self.entries.pop().unwrap_or_else(|| unreachable!());
        self.slots.remove(&removed.1);
        if slot < self.entries.len() {
            self.sift_down(slot);
            self.sift_up(slot);
        }
        removed
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        self.slots.insert(self.entries[a].1, a);
        self.slots.insert(self.entries[b].1, b);
    }

    fn sift_up(&mut self, mut slot: usize) {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.entries[slot].0 >= self.entries[parent].0 {
                break;
            }
            self.swap(slot, parent);
            slot = parent;
        }
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.entries.len();
        loop {
            let left = slot * 2 + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.entries[left].0 < self.entries[smallest].0 {
                smallest = left;
            }
            if right < len && self.entries[right].0 < self.entries[smallest].0 {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }
}
