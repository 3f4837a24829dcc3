//! Build a [`SharedPackedParseTree`] from the derivations of a parse graph.
//!
//! Complete nodes are memoised by `(rule, start, next)`, so a span of a rule
//! becomes one tree node shared by every parent. Each option that completed
//! over the span contributes the child sequences of its derivation chain;
//! the resulting candidates are deduplicated and handed to the resolver.
//!
//! Zero-length cycles (a rule deriving itself over an empty span) would
//! give infinitely many trees. A derivation that reaches a node already
//! being built is dropped, and results computed while such a cycle was cut
//! are only memoised when they still produced something.

use super::{SharedPackedParseTree, SpptAlternative, SpptNode, SpptNodeId};
use crate::input::InputLocation;
use crate::rule::{FastMap, FastSet, RuleBody, RuleId, RuleKind, RulePosition};
use crate::runtime::{AmbiguityResolver, GrowingNodeIndex, ParseGraph};
use compact_str::CompactString;
use smallvec::SmallVec;
use std::rc::Rc;

type Children = SmallVec<[SpptNodeId; 4]>;
type Span = (RuleId, usize, usize);

pub(crate) struct SpptBuilder<'g, 'a> {
    graph: &'g ParseGraph<'a>,
    resolver: AmbiguityResolver<'a>,
    nodes: Vec<SpptNode>,
    complete: FastMap<Span, Option<SpptNodeId>>,
    sequences: FastMap<GrowingNodeIndex, Rc<Vec<Children>>>,
    skips: FastMap<usize, Children>,
    building: FastSet<Span>,
    extending: FastSet<GrowingNodeIndex>,
    cycle_hits: usize,
    last_leaf: Option<InputLocation>,
}

impl<'g, 'a> SpptBuilder<'g, 'a> {
    pub(crate) fn new(graph: &'g ParseGraph<'a>) -> Self {
        Self {
            graph,
            resolver: AmbiguityResolver::new(graph.rules),
            nodes: Vec::new(),
            complete: FastMap::default(),
            sequences: FastMap::default(),
            skips: FastMap::default(),
            building: FastSet::default(),
            extending: FastSet::default(),
            cycle_hits: 0,
            last_leaf: None,
        }
    }

    /// Build the tree rooted at the complete node `goal`.
    ///
    /// For a generated goal rule, the tree's root is the user goal inside it,
    /// which always follows any leading skip.
    pub(crate) fn build(mut self, goal: GrowingNodeIndex) -> Option<SharedPackedParseTree> {
        let rule = goal.rule_position.rule;
        let goal_id = self.complete_node(rule, goal.start, goal.next_input_position)?;
        let root = if self.graph.rules.rule(rule).kind() == RuleKind::Goal {
            self.nodes[goal_id.index()]
                .children()
                .last()
                .copied()
                .unwrap_or(goal_id)
        } else {
            goal_id
        };
        Some(SharedPackedParseTree::from_parts(
            self.graph.input.shared_text(),
            self.nodes,
            root,
            goal_id,
        ))
    }

    fn push(&mut self, node: SpptNode) -> SpptNodeId {
        let id = SpptNodeId::from_index(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn name(&self, rule: RuleId) -> CompactString {
        CompactString::from(self.graph.rules.name(rule))
    }

    /// Tree nodes for one derivation child: a leaf plus its trailing skip,
    /// a run of skip nodes, or a complete node.
    fn child_nodes(&mut self, child: GrowingNodeIndex) -> Option<Children> {
        let rule = child.rule_position.rule;
        let (start, next) = (child.start, child.next_input_position);
        if self.graph.rules.skip_rule() == Some(rule) {
            return Some(self.skip_nodes(start));
        }
        match self.graph.rules.rule(rule).body() {
            RuleBody::Terminal(_) | RuleBody::Embedded(_) => {
                let (id, end) = self.leaf_node(rule, start)?;
                let mut children = Children::new();
                children.push(id);
                if next > end {
                    children.extend(self.skip_nodes(end));
                }
                Some(children)
            }
            RuleBody::NonTerminal(_) | RuleBody::Goal(_) => {
                let mut children = Children::new();
                children.push(self.complete_node(rule, start, next)?);
                Some(children)
            }
        }
    }

    fn complete_node(&mut self, rule: RuleId, start: usize, next: usize) -> Option<SpptNodeId> {
        let span = (rule, start, next);
        if let Some(memo) = self.complete.get(&span) {
            return *memo;
        }
        if !self.building.insert(span) {
            self.cycle_hits += 1;
            return None;
        }
        let hits = self.cycle_hits;

        let options = self.graph.complete_options(rule, start, next).to_vec();
        let mut candidates: Vec<SpptAlternative> = Vec::new();
        for option in options {
            let key = GrowingNodeIndex::new(RulePosition::end(rule, option), start, next);
            for sequence in self.sequences_of(key).iter() {
                let candidate = SpptAlternative {
                    option,
                    children: sequence.to_vec(),
                };
                if !candidates.contains(&candidate) {
                    candidates.push(candidate);
                }
            }
        }
        self.building.remove(&span);

        let result = if candidates.is_empty() {
            None
        } else {
            let alternatives = self.resolver.resolve(&self.nodes, rule, candidates);
            let node = SpptNode::Branch {
                name: self.name(rule),
                rule,
                start,
                length: next - start,
                alternatives,
                is_skip: self.graph.rules.rule(rule).is_skip(),
            };
            Some(self.push(node))
        };
        if result.is_some() || self.cycle_hits == hits {
            self.complete.insert(span, result);
        }
        result
    }

    /// Every child sequence deriving `key` from the start of its option.
    fn sequences_of(&mut self, key: GrowingNodeIndex) -> Rc<Vec<Children>> {
        if let Some(memo) = self.sequences.get(&key) {
            return Rc::clone(memo);
        }
        let derivations = self.graph.derivations(&key).to_vec();
        if derivations.is_empty() && key.rule_position.is_at_start() {
            return Rc::new(vec![Children::new()]);
        }
        if !self.extending.insert(key) {
            self.cycle_hits += 1;
            return Rc::new(Vec::new());
        }
        let hits = self.cycle_hits;

        let mut sequences: Vec<Children> = Vec::new();
        for derivation in derivations {
            let prefixes = match derivation.predecessor {
                Some(predecessor) => self.sequences_of(predecessor),
                None => Rc::new(vec![Children::new()]),
            };
            if prefixes.is_empty() {
                continue;
            }
            let Some(tail) = self.child_nodes(derivation.child) else {
                continue;
            };
            for prefix in prefixes.iter() {
                let mut sequence = prefix.clone();
                sequence.extend(tail.iter().copied());
                if !sequences.contains(&sequence) {
                    sequences.push(sequence);
                }
            }
        }
        self.extending.remove(&key);

        let sequences = Rc::new(sequences);
        if !sequences.is_empty() || self.cycle_hits == hits {
            self.sequences.insert(key, Rc::clone(&sequences));
        }
        sequences
    }

    /// The leaf (or embedded branch) matched by `rule` at `start`, with the
    /// end of the match itself.
    fn leaf_node(&mut self, rule: RuleId, start: usize) -> Option<(SpptNodeId, usize)> {
        let leaf = self.graph.leaf(rule, start)?;
        let (length, fragment) = (leaf.length, leaf.fragment.clone());
        let end = start + length;
        let span = (rule, start, end);
        if let Some(Some(id)) = self.complete.get(&span) {
            return Some((*id, end));
        }

        let is_skip = self.graph.rules.rule(rule).is_skip();
        let node = match fragment {
            Some(fragment) => {
                let mut imported = FastMap::default();
                let children = fragment
                    .node(fragment.goal())
                    .children()
                    .iter()
                    .map(|child| self.import(&fragment, *child, false, &mut imported))
                    .collect();
                SpptNode::Branch {
                    name: self.name(rule),
                    rule,
                    start,
                    length,
                    alternatives: vec![SpptAlternative {
                        option: 0,
                        children,
                    }],
                    is_skip,
                }
            }
            None => SpptNode::Leaf {
                name: self.name(rule),
                rule,
                location: self.locate(start, length),
                text: CompactString::from(self.graph.input.slice(start, length)),
                is_skip,
            },
        };
        let id = self.push(node);
        self.complete.insert(span, Some(id));
        Some((id, end))
    }

    /// Skip nodes for the run of skip rules matched at `position`.
    fn skip_nodes(&mut self, position: usize) -> Children {
        if let Some(memo) = self.skips.get(&position) {
            return memo.clone();
        }
        let mut children = Children::new();
        if let Some(skip) = self.graph.skip_at(position) {
            let fragment = std::sync::Arc::clone(&skip.fragment);
            let mut imported = FastMap::default();
            // <SKIP> { <SKIP-CHOICE> { WS } <SKIP-CHOICE> { COMMENT } ... }
            for choice in fragment.node(fragment.root()).children() {
                for item in fragment.node(*choice).children() {
                    children.push(self.import(&fragment, *item, true, &mut imported));
                }
            }
        }
        self.skips.insert(position, children.clone());
        children
    }

    /// Copy `id` and everything below it from a nested parse's tree.
    ///
    /// Nested parses run over the same input, so locations carry over.
    fn import(
        &mut self,
        fragment: &SharedPackedParseTree,
        id: SpptNodeId,
        force_skip: bool,
        imported: &mut FastMap<SpptNodeId, SpptNodeId>,
    ) -> SpptNodeId {
        if let Some(copy) = imported.get(&id) {
            return *copy;
        }
        let node = match fragment.node(id) {
            SpptNode::Leaf {
                name,
                rule,
                location,
                text,
                is_skip,
            } => SpptNode::Leaf {
                name: name.clone(),
                rule: *rule,
                location: *location,
                text: text.clone(),
                is_skip: *is_skip || force_skip,
            },
            SpptNode::Branch {
                name,
                rule,
                start,
                length,
                alternatives,
                is_skip,
            } => {
                let alternatives = alternatives
                    .iter()
                    .map(|alt| SpptAlternative {
                        option: alt.option,
                        children: alt
                            .children
                            .iter()
                            .map(|child| self.import(fragment, *child, force_skip, imported))
                            .collect(),
                    })
                    .collect();
                SpptNode::Branch {
                    name: name.clone(),
                    rule: *rule,
                    start: *start,
                    length: *length,
                    alternatives,
                    is_skip: *is_skip || force_skip,
                }
            }
        };
        let copy = self.push(node);
        imported.insert(id, copy);
        copy
    }

    /// Location of a leaf, advancing from the previous leaf when adjacent.
    fn locate(&mut self, position: usize, length: usize) -> InputLocation {
        let input = self.graph.input;
        let location = match self.last_leaf {
            Some(last) if last.end() == position => {
                input.next_location(last, input.slice(last.position, last.length), length)
            }
            _ => input.location(position, length),
        };
        self.last_leaf = Some(location);
        location
    }
}
