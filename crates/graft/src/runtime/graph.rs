//! Parse graph: the state of one parse.
//!
//! Owns the graph-structured stack, the queue of growing heads, the scan
//! caches and the derivation store from which the parse tree is built.
//!
//! Derivations are recorded against node *keys* rather than stack slots, so
//! they outlive the stack nodes that produced them: a node may be dropped
//! from the stack once it can no longer grow, while its derivations stay
//! available to the tree builder.
//!
//! A derivation of a key `(rule, option, position, start, next)` is a pair of
//! an optional predecessor (the same option one item earlier, `None` at the
//! start of the option) and the child consumed last. Every complete key is
//! also indexed by `(rule, start, next)`, the completed-node cache, so that
//! all options matching the same span end up packed into one tree node.

use super::config::ParseMetrics;
use super::gss::{GraphStructuredStack, GrowingNodeIndex, NodeId};
use super::heap::IndexedHeap;
use crate::input::InputText;
use crate::rule::{FastMap, RuleId, RuleSet};
use crate::sppt::SharedPackedParseTree;
use smallvec::SmallVec;
use std::sync::Arc;

/// Result of scanning one terminal or embedded grammar at one position.
#[derive(Debug, Clone)]
pub(crate) struct LeafMatch {
    /// Length of the match itself.
    pub length: usize,
    /// Position after the match and any trailing skip.
    pub next: usize,
    /// Tree of an embedded grammar's match.
    pub fragment: Option<Arc<SharedPackedParseTree>>,
}

/// A run of skip rules at one position.
#[derive(Debug, Clone)]
pub(crate) struct SkipMatch {
    pub length: usize,
    pub fragment: Arc<SharedPackedParseTree>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Derivation {
    pub predecessor: Option<GrowingNodeIndex>,
    pub child: GrowingNodeIndex,
}

/// Furthest point at which a terminal was expected and not found.
#[derive(Debug, Clone, Default)]
pub(crate) struct FailureRecord {
    pub position: usize,
    pub expected: Vec<RuleId>,
    pub active: Vec<RuleId>,
    pub recorded: bool,
}

impl FailureRecord {
    pub fn record(&mut self, position: usize, terminal: RuleId, active: RuleId) {
        if self.recorded && position < self.position {
            return;
        }
        if !self.recorded || position > self.position {
            self.position = position;
            self.expected.clear();
            self.active.clear();
            self.recorded = true;
        }
        if !self.expected.contains(&terminal) {
            self.expected.push(terminal);
        }
        if !self.active.contains(&active) {
            self.active.push(active);
        }
    }
}

#[derive(Debug)]
pub(crate) struct ParseGraph<'a> {
    pub(crate) rules: &'a RuleSet,
    pub(crate) input: &'a InputText,
    /// Generated goal rule the parse was started with.
    pub(crate) goal: RuleId,
    /// User rule wrapped by `goal`.
    pub(crate) user_goal: RuleId,
    pub(crate) start_position: usize,
    /// Accept the longest goal instead of requiring the whole input.
    pub(crate) longest_mode: bool,
    pub(crate) skip_enabled: bool,
    pub(crate) gss: GraphStructuredStack,
    pub(crate) heads: IndexedHeap<NodeId, (usize, u64)>,
    sequence: u64,
    pub(crate) leaves: FastMap<(RuleId, usize), Option<LeafMatch>>,
    pub(crate) skips: FastMap<usize, Option<SkipMatch>>,
    derivations: FastMap<GrowingNodeIndex, SmallVec<[Derivation; 1]>>,
    completed: FastMap<(RuleId, usize, usize), SmallVec<[u32; 2]>>,
    pub(crate) goals: Vec<GrowingNodeIndex>,
    pub(crate) failure: FailureRecord,
    pub(crate) longest_user_match: Option<GrowingNodeIndex>,
    pub(crate) metrics: ParseMetrics,
}

impl<'a> ParseGraph<'a> {
    pub(crate) fn new(
        rules: &'a RuleSet,
        input: &'a InputText,
        goal: RuleId,
        start_position: usize,
        longest_mode: bool,
    ) -> Self {
        let user_goal = rules.goal_target(goal).unwrap_or(goal);
        let skip_enabled = rules.skip_goal().is_some_and(|skip| skip != goal);
        Self {
            rules,
            input,
            goal,
            user_goal,
            start_position,
            longest_mode,
            skip_enabled,
            gss: GraphStructuredStack::new(),
            heads: IndexedHeap::new(),
            sequence: 0,
            leaves: FastMap::default(),
            skips: FastMap::default(),
            derivations: FastMap::default(),
            completed: FastMap::default(),
            goals: Vec::new(),
            failure: FailureRecord::default(),
            longest_user_match: None,
            metrics: ParseMetrics::default(),
        }
    }

    /// Next input position of the earliest queued head.
    #[must_use]
    pub(crate) fn next_season_position(&self) -> Option<usize> {
        self.heads.peek().map(|((position, _), _)| position)
    }

    /// Queue `id` for growth at its next input position, in creation order.
    pub(crate) fn enqueue(&mut self, id: NodeId) {
        let position = self.gss.key(id).next_input_position;
        self.sequence += 1;
        self.heads.push(id, (position, self.sequence));
        self.metrics.max_heads = self.metrics.max_heads.max(self.heads.len());
    }

    /// Create the root node a parse starts from.
    pub(crate) fn create_root(&mut self, key: GrowingNodeIndex) -> NodeId {
        let (id, created) = self.gss.root(key);
        if created {
            self.metrics.nodes_created += 1;
        }
        id
    }

    /// Find or create the stack node for `key`.
    pub(crate) fn create(&mut self, key: GrowingNodeIndex) -> (NodeId, bool) {
        let (id, created) = self.gss.get_or_create(key);
        if created {
            self.metrics.nodes_created += 1;
            if key.is_complete() {
                let options = self
                    .completed
                    .entry((key.rule_position.rule, key.start, key.next_input_position))
                    .or_default();
                if !options.contains(&key.rule_position.option) {
                    options.push(key.rule_position.option);
                }
            }
        }
        (id, created)
    }

    /// Record a derivation; returns `false` if it was already known.
    pub(crate) fn add_derivation(&mut self, key: GrowingNodeIndex, derivation: Derivation) -> bool {
        let derivations = self.derivations.entry(key).or_default();
        if derivations.contains(&derivation) {
            return false;
        }
        derivations.push(derivation);
        true
    }

    pub(crate) fn derivations(&self, key: &GrowingNodeIndex) -> &[Derivation] {
        self.derivations.get(key).map_or(&[], SmallVec::as_slice)
    }

    /// Options of `rule` that completed over exactly `[start, next)`.
    pub(crate) fn complete_options(&self, rule: RuleId, start: usize, next: usize) -> &[u32] {
        self.completed
            .get(&(rule, start, next))
            .map_or(&[], SmallVec::as_slice)
    }

    pub(crate) fn leaf(&self, terminal: RuleId, position: usize) -> Option<&LeafMatch> {
        self.leaves.get(&(terminal, position)).and_then(Option::as_ref)
    }

    pub(crate) fn skip_at(&self, position: usize) -> Option<&SkipMatch> {
        self.skips.get(&position).and_then(Option::as_ref)
    }

    pub(crate) fn record_failure(&mut self, position: usize, terminal: RuleId, active: RuleId) {
        self.failure.record(position, terminal, active);
    }

    /// Track the longest completed match of the user goal from the start.
    pub(crate) fn note_complete(&mut self, key: GrowingNodeIndex) {
        if key.rule_position.rule != self.user_goal {
            return;
        }
        if key.start != self.user_goal_start() {
            return;
        }
        let longer = self
            .longest_user_match
            .is_none_or(|current| key.next_input_position > current.next_input_position);
        if longer {
            self.longest_user_match = Some(key);
        }
    }

    /// Where the user goal starts: after any leading skip.
    fn user_goal_start(&self) -> usize {
        self.start_position + self.skip_at(self.start_position).map_or(0, |skip| skip.length)
    }

    /// The best goal found: the single full-input goal, or in longest mode
    /// the goal reaching furthest.
    #[must_use]
    pub(crate) fn best_goal(&self) -> Option<GrowingNodeIndex> {
        self.goals
            .iter()
            .copied()
            .reduce(|best, goal| {
                if goal.next_input_position > best.next_input_position {
                    goal
                } else {
                    best
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleId;

    #[test]
    fn test_failure_record_keeps_furthest_position() {
        let mut failure = FailureRecord::default();
        let (a, b, c) = (RuleId::new(3), RuleId::new(4), RuleId::new(5));
        let rule = RuleId::new(9);
        failure.record(2, a, rule);
        failure.record(1, b, rule);
        assert_eq!(failure.expected, vec![a]);
        failure.record(2, b, rule);
        failure.record(2, a, rule);
        assert_eq!(failure.expected, vec![a, b]);
        failure.record(4, c, rule);
        assert_eq!(failure.position, 4);
        assert_eq!(failure.expected, vec![c]);
        assert_eq!(failure.active, vec![rule]);
    }
}
