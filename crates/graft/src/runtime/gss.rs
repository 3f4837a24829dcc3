//! Graph-structured stack
//!
//! Each node is a growing parse state; its `previous` edges point at the
//! contexts it is stacked on. Several parse paths that reach the same state
//! share one node, which is what keeps the number of nodes polynomial.
//!
//! Nodes live in an arena addressed by [`NodeId`] and are identified by
//! their [`GrowingNodeIndex`]. A node's `ref_count` is the number of nodes
//! that have it as a previous node; a node with a count of zero is a head.

use crate::rule::{FastMap, RulePosition};
use smallvec::SmallVec;
use std::fmt;

/// Arena slot of a stack node. Slots are reused after a node is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of a growing node: two nodes with equal indices are the same node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GrowingNodeIndex {
    pub rule_position: RulePosition,
    pub start: usize,
    pub next_input_position: usize,
}

impl GrowingNodeIndex {
    #[must_use]
    pub const fn new(rule_position: RulePosition, start: usize, next_input_position: usize) -> Self {
        Self {
            rule_position,
            start,
            next_input_position,
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.rule_position.is_at_end()
    }

    /// Length consumed so far, including trailing skip.
    #[must_use]
    pub const fn consumed(&self) -> usize {
        self.next_input_position - self.start
    }
}

impl fmt::Display for GrowingNodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}..{}",
            self.rule_position, self.start, self.next_input_position
        )
    }
}

#[derive(Debug, Clone)]
struct StackEntry {
    key: GrowingNodeIndex,
    previous: SmallVec<[NodeId; 2]>,
    ref_count: u32,
}

#[derive(Debug, Default)]
pub struct GraphStructuredStack {
    entries: Vec<Option<StackEntry>>,
    free: Vec<NodeId>,
    index: FastMap<GrowingNodeIndex, NodeId>,
}

impl GraphStructuredStack {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    #[must_use]
    pub fn find(&self, key: &GrowingNodeIndex) -> Option<NodeId> {
        self.index.get(key).copied()
    }

    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.entry(id).is_some()
    }

    fn entry(&self, id: NodeId) -> Option<&StackEntry> {
        self.entries.get(id.index()).and_then(Option::as_ref)
    }

    fn entry_mut(&mut self, id: NodeId) -> &mut StackEntry {
        self.entries
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .unwrap_or_else(|| panic!("stack node {id:?} is not live"))
    }

    /// Key of a live node.
    ///
    /// # Panics
    ///
    /// Panics if `id` has been dropped.
    #[must_use]
    pub fn key(&self, id: NodeId) -> GrowingNodeIndex {
        self.entry(id)
            .map(|entry| entry.key)
            .unwrap_or_else(|| panic!("stack node {id:?} is not live"))
    }

    #[must_use]
    pub fn previous(&self, id: NodeId) -> &[NodeId] {
        self.entry(id).map_or(&[], |entry| entry.previous.as_slice())
    }

    #[must_use]
    pub fn ref_count(&self, id: NodeId) -> u32 {
        self.entry(id).map_or(0, |entry| entry.ref_count)
    }

    #[must_use]
    pub fn is_head(&self, id: NodeId) -> bool {
        self.ref_count(id) == 0
    }

    /// Find the node for `key`, creating it without any previous nodes.
    ///
    /// Returns the node and whether it was created.
    pub fn get_or_create(&mut self, key: GrowingNodeIndex) -> (NodeId, bool) {
        if let Some(id) = self.find(&key) {
            return (id, false);
        }
        let entry = StackEntry {
            key,
            previous: SmallVec::new(),
            ref_count: 0,
        };
        let id = if let Some(id) = self.free.pop() {
            self.entries[id.index()] = Some(entry);
            id
        } else {
            let id = NodeId(u32::try_from(self.entries.len()).unwrap_or(u32::MAX));
            self.entries.push(Some(entry));
            id
        };
        self.index.insert(key, id);
        (id, true)
    }

    /// Register a node with no previous context, the start of a parse.
    ///
    /// Returns the node and whether it was created; an existing node is left
    /// as is.
    pub fn root(&mut self, key: GrowingNodeIndex) -> (NodeId, bool) {
        self.get_or_create(key)
    }

    /// Stack `head` on `previous`.
    ///
    /// Returns `true` if the edge is new, in which case `previous` gains a
    /// reference.
    pub fn push(&mut self, previous: NodeId, head: NodeId) -> bool {
        assert!(self.contains(previous), "push onto dropped node {previous:?}");
        let entry = self.entry_mut(head);
        if entry.previous.contains(&previous) {
            return false;
        }
        entry.previous.push(previous);
        self.entry_mut(previous).ref_count += 1;
        true
    }

    /// Previous nodes of `head`, removing `head` if nothing is stacked on it.
    ///
    /// Removing a node releases its references on the previous nodes but does
    /// not drop them, even if they become heads. The growth loop itself
    /// retires whole stacks with [`drop_stack`](Self::drop_stack); `pop` is
    /// for callers that unwind one head at a time.
    pub fn pop(&mut self, head: NodeId) -> SmallVec<[NodeId; 2]> {
        let Some(entry) = self.entry(head) else {
            return SmallVec::new();
        };
        if entry.ref_count > 0 {
            return entry.previous.clone();
        }
        self.remove(head)
    }

    fn remove(&mut self, id: NodeId) -> SmallVec<[NodeId; 2]> {
        let Some(entry) = self.entries.get_mut(id.index()).and_then(Option::take) else {
            return SmallVec::new();
        };
        self.index.remove(&entry.key);
        self.free.push(id);
        for previous in &entry.previous {
            let prev = self.entry_mut(*previous);
            prev.ref_count = prev.ref_count.checked_sub(1).unwrap_or_else(|| {
                panic!("reference count underflow on {previous:?} removing {id:?}")
            });
        }
        entry.previous
    }

    /// Remove `head` and every previous node that becomes an unreferenced
    /// head as a result, unless `is_live` says it is still wanted.
    ///
    /// `on_drop` is called for each removed node. Does nothing if `head` is
    /// still referenced.
    pub fn drop_stack(
        &mut self,
        head: NodeId,
        is_live: impl Fn(NodeId) -> bool,
        mut on_drop: impl FnMut(NodeId, GrowingNodeIndex),
    ) -> usize {
        let mut dropped = 0;
        let mut pending = vec![head];
        while let Some(id) = pending.pop() {
            let Some(entry) = self.entry(id) else {
                continue;
            };
            if entry.ref_count > 0 {
                continue;
            }
            let key = entry.key;
            for previous in self.remove(id) {
                if self.ref_count(previous) == 0 && !is_live(previous) {
                    pending.push(previous);
                }
            }
            on_drop(id, key);
            dropped += 1;
        }
        dropped
    }

    /// Check that every node's reference count equals the number of
    /// previous edges pointing at it, and that the key index is consistent.
    ///
    /// # Panics
    ///
    /// Panics on the first inconsistency found.
    pub fn verify(&self) {
        let mut incoming = vec![0u32; self.entries.len()];
        for (slot, entry) in self.entries.iter().enumerate() {
            let Some(entry) = entry else { continue };
            assert_eq!(
                self.index.get(&entry.key).map(|id| id.index()),
                Some(slot),
                "stack node {} is not indexed by its key",
                entry.key
            );
            for previous in &entry.previous {
                assert!(
                    self.contains(*previous),
                    "stack node {} points at dropped node {previous:?}",
                    entry.key
                );
                incoming[previous.index()] += 1;
            }
        }
        for (slot, entry) in self.entries.iter().enumerate() {
            if let Some(entry) = entry {
                assert_eq!(
                    entry.ref_count, incoming[slot],
                    "reference count of {} does not match its incoming edges",
                    entry.key
                );
            }
        }
        assert_eq!(
            self.index.len(),
            self.entries.iter().filter(|e| e.is_some()).count(),
            "key index out of sync with arena"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{RuleId, RulePosition};

    fn key(rule: u32, start: usize, next: usize) -> GrowingNodeIndex {
        GrowingNodeIndex::new(RulePosition::new(RuleId::new(rule), 0, 1), start, next)
    }

    #[test]
    fn test_root_is_idempotent() {
        let mut gss = GraphStructuredStack::new();
        assert!(gss.root(key(0, 0, 0)).1);
        assert!(!gss.root(key(0, 0, 0)).1);
        assert_eq!(gss.len(), 1);
        gss.verify();
    }

    #[test]
    fn test_push_counts_each_edge_once() {
        let mut gss = GraphStructuredStack::new();
        let (a, _) = gss.get_or_create(key(0, 0, 0));
        let (b, _) = gss.get_or_create(key(1, 0, 1));
        assert!(gss.push(a, b));
        assert!(!gss.push(a, b));
        assert_eq!(gss.ref_count(a), 1);
        assert!(gss.is_head(b));
        assert_eq!(gss.previous(b), &[a]);
        gss.verify();
    }

    #[test]
    fn test_pop_keeps_referenced_nodes() {
        let mut gss = GraphStructuredStack::new();
        let (a, _) = gss.get_or_create(key(0, 0, 0));
        let (b, _) = gss.get_or_create(key(1, 0, 1));
        let (c, _) = gss.get_or_create(key(2, 1, 2));
        gss.push(a, b);
        gss.push(b, c);

        // b is referenced by c, so it survives.
        assert_eq!(gss.pop(b).as_slice(), &[a]);
        assert!(gss.contains(b));

        // c is a head: popping removes it and releases b, but does not cascade.
        assert_eq!(gss.pop(c).as_slice(), &[b]);
        assert!(!gss.contains(c));
        assert!(gss.contains(b));
        assert_eq!(gss.ref_count(b), 0);
        gss.verify();
    }

    #[test]
    fn test_drop_stack_cascades_until_shared_node() {
        let mut gss = GraphStructuredStack::new();
        let (root, _) = gss.get_or_create(key(0, 0, 0));
        let (left, _) = gss.get_or_create(key(1, 0, 1));
        let (right, _) = gss.get_or_create(key(2, 0, 1));
        let (tip, _) = gss.get_or_create(key(3, 1, 2));
        gss.push(root, left);
        gss.push(root, right);
        gss.push(left, tip);

        let mut dropped = Vec::new();
        let count = gss.drop_stack(tip, |_| false, |id, _| dropped.push(id));
        assert_eq!(count, 2);
        assert_eq!(dropped, vec![tip, left]);
        // root is still referenced by right.
        assert!(gss.contains(root));
        assert_eq!(gss.ref_count(root), 1);
        gss.verify();
    }

    #[test]
    fn test_drop_stack_spares_live_nodes() {
        let mut gss = GraphStructuredStack::new();
        let (root, _) = gss.get_or_create(key(0, 0, 0));
        let (tip, _) = gss.get_or_create(key(1, 0, 1));
        gss.push(root, tip);
        gss.drop_stack(tip, |id| id == root, |_, _| {});
        assert!(gss.contains(root));
        assert!(!gss.contains(tip));
        gss.verify();
    }

    #[test]
    fn test_slots_are_reused() {
        let mut gss = GraphStructuredStack::new();
        let (a, _) = gss.get_or_create(key(0, 0, 0));
        gss.pop(a);
        let (b, created) = gss.get_or_create(key(5, 3, 3));
        assert!(created);
        assert_eq!(a, b);
        assert_eq!(gss.key(b), key(5, 3, 3));
        assert!(gss.find(&key(0, 0, 0)).is_none());
    }

    #[test]
    #[should_panic(expected = "reference count")]
    fn test_verify_detects_corruption() {
        let mut gss = GraphStructuredStack::new();
        let (a, _) = gss.get_or_create(key(0, 0, 0));
        let (b, _) = gss.get_or_create(key(1, 0, 1));
        gss.push(a, b);
        gss.entry_mut(a).ref_count = 7;
        gss.verify();
    }
}
