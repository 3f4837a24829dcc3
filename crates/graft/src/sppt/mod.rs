//! # Shared Packed Parse Tree
//!
//! The output of a successful parse.
//!
//! Nodes live in an arena addressed by [`SpptNodeId`]. A node for a given
//! rule and span exists exactly once and is shared by every parent that
//! uses it. A branch that can be derived in more than one way keeps each
//! derivation as a separate [`SpptAlternative`], best first; this is the
//! "packed" part. An unambiguous tree has exactly one alternative per
//! branch.
//!
//! Skip matches (whitespace, comments) are kept as ordinary children
//! flagged with `is_skip`, so the leaves always spell the input exactly.
//! Use [`SharedPackedParseTree::non_skip_children`] to get the children a
//! consumer normally indexes into.
//!
//! Rule ids stored in nodes refer to the rule set that produced them; nodes
//! spliced in from an embedded grammar carry the embedded rule set's ids.

mod builder;

pub(crate) use builder::SpptBuilder;

use crate::input::InputLocation;
use crate::rule::RuleId;
use compact_str::CompactString;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SpptNodeId(u32);

impl SpptNodeId {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }
}

/// One way of deriving a branch: the option used and the children in order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SpptAlternative {
    pub option: u32,
    pub children: Vec<SpptNodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum SpptNode {
    Leaf {
        name: CompactString,
        rule: RuleId,
        location: InputLocation,
        text: CompactString,
        is_skip: bool,
    },
    Branch {
        name: CompactString,
        rule: RuleId,
        start: usize,
        length: usize,
        alternatives: Vec<SpptAlternative>,
        is_skip: bool,
    },
}

impl SpptNode {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Leaf { name, .. } | Self::Branch { name, .. } => name,
        }
    }

    #[must_use]
    pub const fn rule(&self) -> RuleId {
        match self {
            Self::Leaf { rule, .. } | Self::Branch { rule, .. } => *rule,
        }
    }

    #[must_use]
    pub const fn start(&self) -> usize {
        match self {
            Self::Leaf { location, .. } => location.position,
            Self::Branch { start, .. } => *start,
        }
    }

    #[must_use]
    pub const fn length(&self) -> usize {
        match self {
            Self::Leaf { location, .. } => location.length,
            Self::Branch { length, .. } => *length,
        }
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.start() + self.length()
    }

    #[must_use]
    pub const fn is_skip(&self) -> bool {
        match self {
            Self::Leaf { is_skip, .. } | Self::Branch { is_skip, .. } => *is_skip,
        }
    }

    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf { .. })
    }

    /// Matched text of a leaf.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Leaf { text, .. } => Some(text),
            Self::Branch { .. } => None,
        }
    }

    #[must_use]
    pub const fn location(&self) -> Option<InputLocation> {
        match self {
            Self::Leaf { location, .. } => Some(*location),
            Self::Branch { .. } => None,
        }
    }

    /// All derivations of a branch, best first; empty for leaves.
    #[must_use]
    pub fn alternatives(&self) -> &[SpptAlternative] {
        match self {
            Self::Leaf { .. } => &[],
            Self::Branch { alternatives, .. } => alternatives,
        }
    }

    /// Children of the preferred derivation.
    #[must_use]
    pub fn children(&self) -> &[SpptNodeId] {
        self.alternatives()
            .first()
            .map_or(&[], |alt| alt.children.as_slice())
    }

    fn is_literal(&self) -> bool {
        self.name().starts_with('\'')
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SharedPackedParseTree {
    input: Arc<str>,
    nodes: Vec<SpptNode>,
    root: SpptNodeId,
    goal: SpptNodeId,
}

impl SharedPackedParseTree {
    /// Assemble a tree, keeping only nodes reachable from `goal`.
    ///
    /// Reachable nodes are renumbered in depth-first order, so trees built
    /// from equal derivations compare equal.
    pub(crate) fn from_parts(
        input: Arc<str>,
        nodes: Vec<SpptNode>,
        root: SpptNodeId,
        goal: SpptNodeId,
    ) -> Self {
        let mut remap: Vec<Option<SpptNodeId>> = vec![None; nodes.len()];
        let mut order = Vec::with_capacity(nodes.len());
        let mut stack = vec![goal];
        while let Some(id) = stack.pop() {
            if remap[id.index()].is_some() {
                continue;
            }
            remap[id.index()] = Some(SpptNodeId::from_index(order.len()));
            order.push(id);
            for alt in nodes[id.index()].alternatives().iter().rev() {
                stack.extend(alt.children.iter().rev().copied());
            }
        }

        let renumber = |id: SpptNodeId| remap[id.index()].unwrap_or(id);
        let compact = order
            .iter()
            .map(|id| {
                let mut node = nodes[id.index()].clone();
                if let SpptNode::Branch { alternatives, .. } = &mut node {
                    for alt in alternatives {
                        for child in &mut alt.children {
                            *child = renumber(*child);
                        }
                    }
                }
                node
            })
            .collect();

        Self {
            input,
            nodes: compact,
            root: renumber(root),
            goal: renumber(goal),
        }
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// The node of the requested goal rule.
    #[must_use]
    pub const fn root(&self) -> SpptNodeId {
        self.root
    }

    /// The generated goal node: the root plus any leading skip.
    #[must_use]
    pub const fn goal(&self) -> SpptNodeId {
        self.goal
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this tree.
    #[must_use]
    pub fn node(&self, id: SpptNodeId) -> &SpptNode {
        &self.nodes[id.index()]
    }

    #[must_use]
    pub fn nodes(&self) -> &[SpptNode] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any branch keeps more than one derivation.
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.nodes.iter().any(|node| node.alternatives().len() > 1)
    }

    /// Number of distinct trees packed in this forest, saturating at `u64::MAX`.
    #[must_use]
    pub fn count_trees(&self) -> u64 {
        // Shared nodes are counted once.
        let mut counts: Vec<Option<u64>> = vec![None; self.nodes.len()];
        self.count_from(self.goal, &mut counts)
    }

    fn count_from(&self, id: SpptNodeId, counts: &mut Vec<Option<u64>>) -> u64 {
        if let Some(count) = counts[id.index()] {
            return count;
        }
        let node = self.node(id);
        let count = if node.is_leaf() {
            1
        } else {
            node.alternatives().iter().fold(0u64, |total, alt| {
                let product = alt.children.iter().fold(1u64, |product, child| {
                    product.saturating_mul(self.count_from(*child, counts))
                });
                total.saturating_add(product)
            })
        };
        counts[id.index()] = Some(count);
        count
    }

    /// Leaves of the preferred tree in document order, skip leaves included.
    #[must_use]
    pub fn leaves(&self) -> Vec<SpptNodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![self.goal];
        while let Some(id) = stack.pop() {
            let node = self.node(id);
            if node.is_leaf() {
                leaves.push(id);
            } else {
                stack.extend(node.children().iter().rev().copied());
            }
        }
        leaves
    }

    /// Concatenated text of [`leaves`](Self::leaves); equals the input.
    #[must_use]
    pub fn matched_text(&self) -> String {
        self.leaves()
            .into_iter()
            .filter_map(|id| self.node(id).text())
            .collect()
    }

    /// Children of the preferred derivation of `id`, without skip nodes.
    #[must_use]
    pub fn non_skip_children(&self, id: SpptNodeId) -> Vec<SpptNodeId> {
        self.node(id)
            .children()
            .iter()
            .copied()
            .filter(|child| !self.node(*child).is_skip())
            .collect()
    }

    /// Render the root as `S { 'a' ',' 'a' }`, without skip nodes.
    ///
    /// Pattern leaves render as `name : 'text'` and branches with several
    /// derivations as `name { (...) | (...) }`.
    #[must_use]
    pub fn to_string_tree(&self) -> String {
        let mut out = String::new();
        self.render(self.root, false, &mut out);
        out
    }

    /// Render the whole input, leading and interleaved skip included.
    #[must_use]
    pub fn to_string_tree_with_skip(&self) -> String {
        let mut out = String::new();
        let goal = self.node(self.goal);
        for (i, child) in goal.children().iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            self.render(*child, true, &mut out);
        }
        out
    }

    fn render(&self, id: SpptNodeId, include_skip: bool, out: &mut String) {
        let node = self.node(id);
        match node {
            SpptNode::Leaf { name, text, .. } => {
                if node.is_literal() || text.is_empty() {
                    out.push_str(name);
                } else {
                    out.push_str(&format!("{name} : '{}'", text.escape_debug()));
                }
            }
            SpptNode::Branch {
                name, alternatives, ..
            } => {
                out.push_str(&format!("{name} {{"));
                let grouped = alternatives.len() > 1;
                for (index, alt) in alternatives.iter().enumerate() {
                    if index > 0 {
                        out.push_str(" |");
                    }
                    if grouped {
                        out.push_str(" (");
                    }
                    let mut first = true;
                    for child in &alt.children {
                        if !include_skip && self.node(*child).is_skip() {
                            continue;
                        }
                        if !(grouped && first) {
                            out.push(' ');
                        }
                        first = false;
                        self.render(*child, include_skip, out);
                    }
                    if grouped {
                        out.push(')');
                    }
                }
                out.push_str(" }");
            }
        }
    }
}

impl fmt::Display for SharedPackedParseTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_tree())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, position: usize, text: &str, is_skip: bool) -> SpptNode {
        SpptNode::Leaf {
            name: name.into(),
            rule: RuleId::new(0),
            location: InputLocation::new(position, 1, position + 1, text.len()),
            text: text.into(),
            is_skip,
        }
    }

    fn branch(name: &str, start: usize, length: usize, alternatives: Vec<Vec<u32>>) -> SpptNode {
        SpptNode::Branch {
            name: name.into(),
            rule: RuleId::new(1),
            start,
            length,
            alternatives: alternatives
                .into_iter()
                .enumerate()
                .map(|(option, children)| SpptAlternative {
                    option: u32::try_from(option).unwrap(),
                    children: children.into_iter().map(SpptNodeId).collect(),
                })
                .collect(),
            is_skip: false,
        }
    }

    /// `<GOAL> { S { 'a' WS 'b' } }` over "a b".
    fn sample() -> SharedPackedParseTree {
        let nodes = vec![
            leaf("'a'", 0, "a", false),
            leaf("WS", 1, " ", true),
            leaf("ID", 2, "b", false),
            branch("S", 0, 3, vec![vec![0, 1, 2]]),
            branch("<GOAL>S", 0, 3, vec![vec![3]]),
        ];
        SharedPackedParseTree::from_parts("a b".into(), nodes, SpptNodeId(3), SpptNodeId(4))
    }

    #[test]
    fn test_from_parts_renumbers_depth_first_and_drops_unreachable() {
        let mut nodes = sample().nodes.clone();
        nodes.push(leaf("'z'", 9, "z", false));
        let tree = SharedPackedParseTree::from_parts("a b".into(), nodes, SpptNodeId(1), SpptNodeId(0));
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.node(tree.goal()).name(), "<GOAL>S");
        assert_eq!(tree.node(tree.root()).name(), "S");
    }

    #[test]
    fn test_rendering_and_leaves() {
        let tree = sample();
        assert_eq!(tree.to_string_tree(), "S { 'a' ID : 'b' }");
        assert_eq!(tree.to_string_tree_with_skip(), "S { 'a' WS : ' ' ID : 'b' }");
        assert_eq!(tree.matched_text(), "a b");
        assert_eq!(tree.non_skip_children(tree.root()).len(), 2);
        assert!(!tree.is_ambiguous());
        assert_eq!(tree.count_trees(), 1);
    }

    #[test]
    fn test_ambiguous_branches_render_alternatives() {
        let nodes = vec![
            leaf("'a'", 0, "a", false),
            leaf("'a'", 1, "a", false),
            branch("X", 0, 2, vec![vec![0, 1], vec![0, 1]]),
            branch("<GOAL>X", 0, 2, vec![vec![2]]),
        ];
        let tree = SharedPackedParseTree::from_parts("aa".into(), nodes, SpptNodeId(2), SpptNodeId(3));
        assert!(tree.is_ambiguous());
        assert_eq!(tree.count_trees(), 2);
        assert_eq!(tree.to_string_tree(), "X { ('a' 'a') | ('a' 'a') }");
    }
}
