//! # Rule Model
//!
//! The compiled, immutable grammar consumed by the runtime parser.
//!
//! ## Overview
//!
//! A [`RuleSet`] is a flat arena of [`RuntimeRule`]s addressed by [`RuleId`].
//! Every rule is one of:
//!
//! - a **terminal** (literal text, a regular expression, the zero-length
//!   `<EMPTY>` match, or the `<EOT>` marker),
//! - a **nonterminal** whose right-hand side is a [`RuleItem`]
//!   (concatenation, choice, optional, list, separated list),
//! - a generated **goal** wrapping a user rule,
//! - an **embedded** reference into another, independently compiled
//!   [`RuleSet`].
//!
//! Any rule may additionally be flagged as a skip rule (whitespace,
//! comments) that is matched between tokens.
//!
//! The automaton state used by the runtime is a [`RulePosition`]: the rule,
//! the option (alternative) being matched, and how far into that option the
//! match has progressed. Positions are plain `Copy` values with structural
//! equality so they can key hash maps directly.
//!
//! Rule sets are built with [`RuleSetBuilder`].

mod analysis;
mod builder;
mod preference;

pub use analysis::RuleBitSet;
pub use builder::RuleSetBuilder;
pub use preference::{Associativity, PreferenceOption, PreferenceRule};

use crate::error::GrammarError;
use analysis::RuleAnalysis;
use compact_str::CompactString;
use hashbrown::{HashMap, HashSet};
use lasso::{RodeoReader, Spur};
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use std::fmt;
use std::sync::Arc;

pub(crate) type FastMap<K, V> = HashMap<K, V, ahash::RandomState>;
pub(crate) type FastSet<T> = HashSet<T, ahash::RandomState>;

/// Name of the generated zero-length terminal.
pub const EMPTY_RULE_NAME: &str = "<EMPTY>";
/// Name of the generated end-of-text terminal.
pub const END_OF_TEXT_RULE_NAME: &str = "<EOT>";
/// Name of the generated list rule that matches a run of skip rules.
pub const SKIP_RULE_NAME: &str = "<SKIP>";
/// Name of the generated choice between individual skip rules.
pub const SKIP_CHOICE_RULE_NAME: &str = "<SKIP-CHOICE>";
/// Prefix of the generated goal rules.
pub const GOAL_RULE_PREFIX: &str = "<GOAL>";

/// Index of a rule inside its [`RuleSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct RuleId(u32);

impl RuleId {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How competing derivations of the same span are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ChoiceKind {
    /// Keep every derivation in the parse tree.
    Ambiguous,
    /// Prefer the derivation whose earlier children consume the most input,
    /// then the option listed first.
    #[default]
    LongestPriority,
    /// Prefer the option listed first, then the derivation whose earlier
    /// children consume the most input.
    PriorityLongest,
}

/// Broad classification of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Terminal,
    NonTerminal,
    Goal,
    Skip,
    Embedded,
}

/// What a terminal matches.
#[derive(Debug, Clone)]
pub enum TerminalPattern {
    /// Exact text.
    Literal(CompactString),
    /// A regular expression anchored at the match offset.
    Pattern {
        source: CompactString,
        regex: regex::Regex,
    },
    /// The zero-length match used for nullable constructs.
    Empty,
    /// Matches only at the end of the input, never consumed.
    EndOfText,
}

/// Right-hand side of a nonterminal.
#[derive(Debug, Clone)]
pub enum RuleItem {
    Concatenation(SmallVec<[RuleId; 4]>),
    Choice {
        kind: ChoiceKind,
        alternatives: Vec<SmallVec<[RuleId; 4]>>,
    },
    /// Option 0 is the item, option 1 is empty.
    Optional(RuleId),
    /// Option 0 is one or more items, option 1 (only when `min == 0`) is empty.
    List {
        item: RuleId,
        min: u32,
        max: Option<u32>,
    },
    /// Like [`RuleItem::List`] with a separator between consecutive items.
    SeparatedList {
        item: RuleId,
        separator: RuleId,
        min: u32,
        max: Option<u32>,
    },
}

/// A sub-grammar matched as a single child of the outer grammar.
#[derive(Debug, Clone)]
pub struct EmbeddedGrammar {
    pub rule_set: Arc<RuleSet>,
    pub goal: RuleId,
}

#[derive(Debug, Clone)]
pub enum RuleBody {
    Terminal(TerminalPattern),
    NonTerminal(RuleItem),
    /// Generated wrapper whose single item is the user goal.
    Goal(RuleId),
    Embedded(EmbeddedGrammar),
}

/// A compiled rule.
#[derive(Debug, Clone)]
pub struct RuntimeRule {
    pub(crate) id: RuleId,
    pub(crate) name: Spur,
    pub(crate) body: RuleBody,
    pub(crate) is_skip: bool,
}

impl RuntimeRule {
    #[must_use]
    pub const fn id(&self) -> RuleId {
        self.id
    }

    #[must_use]
    pub const fn body(&self) -> &RuleBody {
        &self.body
    }

    #[must_use]
    pub const fn is_skip(&self) -> bool {
        self.is_skip
    }

    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        if self.is_skip {
            return RuleKind::Skip;
        }
        match self.body {
            RuleBody::Terminal(_) => RuleKind::Terminal,
            RuleBody::NonTerminal(_) => RuleKind::NonTerminal,
            RuleBody::Goal(_) => RuleKind::Goal,
            RuleBody::Embedded(_) => RuleKind::Embedded,
        }
    }

    /// Terminals and embedded grammars are matched directly against the input.
    #[must_use]
    pub const fn is_leaf_like(&self) -> bool {
        matches!(self.body, RuleBody::Terminal(_) | RuleBody::Embedded(_))
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self.body, RuleBody::Terminal(_))
    }

    #[must_use]
    pub const fn is_empty_terminal(&self) -> bool {
        matches!(self.body, RuleBody::Terminal(TerminalPattern::Empty))
    }

    #[must_use]
    pub const fn terminal_pattern(&self) -> Option<&TerminalPattern> {
        match &self.body {
            RuleBody::Terminal(pattern) => Some(pattern),
            _ => None,
        }
    }

    /// Choice kind used when this rule's node has several derivations.
    #[must_use]
    pub const fn choice_kind(&self) -> ChoiceKind {
        match &self.body {
            RuleBody::NonTerminal(RuleItem::Choice { kind, .. }) => *kind,
            RuleBody::NonTerminal(RuleItem::Optional(_)) => ChoiceKind::LongestPriority,
            _ => ChoiceKind::Ambiguous,
        }
    }
}

/// Marker for the start of an option.
pub const START: u32 = 0;
/// Marker for a fully matched option.
pub const END: u32 = u32::MAX;

/// Automaton state: a rule, one of its options, and the progress within it.
///
/// For concatenations and choices `position` counts consumed items. For
/// lists it counts consumed items, and for separated lists consumed items
/// and separators; in both cases the count saturates once further items no
/// longer change what may follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RulePosition {
    pub rule: RuleId,
    pub option: u32,
    pub position: u32,
}

impl RulePosition {
    #[must_use]
    pub const fn new(rule: RuleId, option: u32, position: u32) -> Self {
        Self {
            rule,
            option,
            position,
        }
    }

    #[must_use]
    pub const fn start(rule: RuleId, option: u32) -> Self {
        Self::new(rule, option, START)
    }

    #[must_use]
    pub const fn end(rule: RuleId, option: u32) -> Self {
        Self::new(rule, option, END)
    }

    #[must_use]
    pub const fn is_at_start(self) -> bool {
        self.position == START
    }

    #[must_use]
    pub const fn is_at_end(self) -> bool {
        self.position == END
    }
}

impl fmt::Display for RulePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            END => write!(f, "{}[{}].END", self.rule, self.option),
            p => write!(f, "{}[{}].{}", self.rule, self.option, p),
        }
    }
}

/// A compiled grammar.
///
/// Immutable once built and safe to share between threads; every parse
/// borrows it read-only.
#[derive(Debug)]
pub struct RuleSet {
    pub(crate) rules: Vec<RuntimeRule>,
    pub(crate) names: RodeoReader,
    pub(crate) by_name: FastMap<Spur, RuleId>,
    pub(crate) goals: FastMap<RuleId, RuleId>,
    pub(crate) empty: RuleId,
    pub(crate) end_of_text: RuleId,
    pub(crate) skip: Option<RuleId>,
    pub(crate) preferences: FastMap<RuleId, Vec<PreferenceRule>>,
    pub(crate) analysis: RuleAnalysis,
}

impl RuleSet {
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `id` does not belong to this rule set.
    #[must_use]
    pub fn rule(&self, id: RuleId) -> &RuntimeRule {
        &self.rules[id.index()]
    }

    #[must_use]
    pub fn rules(&self) -> &[RuntimeRule] {
        &self.rules
    }

    #[must_use]
    pub fn name(&self, id: RuleId) -> &str {
        self.names.resolve(&self.rules[id.index()].name)
    }

    /// Look up a rule by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<RuleId> {
        let spur = self.names.get(name)?;
        self.by_name.get(&spur).copied()
    }

    /// The generated goal rule wrapping the named user rule.
    ///
    /// # Errors
    ///
    /// Returns [`GrammarError::UnknownGoal`] if no rule has that name.
    pub fn goal_rule(&self, name: &str) -> Result<RuleId, GrammarError> {
        self.find(name)
            .and_then(|user| self.goals.get(&user).copied())
            .ok_or_else(|| GrammarError::UnknownGoal { name: name.into() })
    }

    /// The user rule wrapped by a generated goal.
    #[must_use]
    pub fn goal_target(&self, goal: RuleId) -> Option<RuleId> {
        match self.rule(goal).body {
            RuleBody::Goal(user) => Some(user),
            _ => None,
        }
    }

    #[must_use]
    pub const fn empty_rule(&self) -> RuleId {
        self.empty
    }

    #[must_use]
    pub const fn end_of_text_rule(&self) -> RuleId {
        self.end_of_text
    }

    /// The generated `<SKIP>` list, present when any skip rule is declared.
    #[must_use]
    pub const fn skip_rule(&self) -> Option<RuleId> {
        self.skip
    }

    /// Goal used to parse runs of skip rules.
    #[must_use]
    pub fn skip_goal(&self) -> Option<RuleId> {
        self.skip.and_then(|skip| self.goals.get(&skip).copied())
    }

    #[must_use]
    pub fn preferences(&self, rule: RuleId) -> &[PreferenceRule] {
        self.preferences.get(&rule).map_or(&[], Vec::as_slice)
    }

    /// Number of options of a rule; leaves have a single implicit option.
    #[must_use]
    pub fn option_count(&self, rule: RuleId) -> u32 {
        match &self.rule(rule).body {
            RuleBody::NonTerminal(RuleItem::Choice { alternatives, .. }) => {
                u32::try_from(alternatives.len()).unwrap_or(u32::MAX)
            }
            RuleBody::NonTerminal(RuleItem::Optional(_)) => 2,
            RuleBody::NonTerminal(
                RuleItem::List { min, .. } | RuleItem::SeparatedList { min, .. },
            ) => {
                if *min == 0 {
                    2
                } else {
                    1
                }
            }
            _ => 1,
        }
    }

    /// Items that may be consumed next at `rp`.
    #[must_use]
    pub fn items_at(&self, rp: RulePosition) -> SmallVec<[RuleId; 2]> {
        if rp.is_at_end() {
            return SmallVec::new();
        }
        let position = rp.position as usize;
        match &self.rule(rp.rule).body {
            RuleBody::Terminal(_) | RuleBody::Embedded(_) => SmallVec::new(),
            RuleBody::Goal(user) => smallvec![*user],
            RuleBody::NonTerminal(item) => match item {
                RuleItem::Concatenation(items) => {
                    items.get(position).copied().into_iter().collect()
                }
                RuleItem::Choice { alternatives, .. } => alternatives
                    .get(rp.option as usize)
                    .and_then(|alt| alt.get(position))
                    .copied()
                    .into_iter()
                    .collect(),
                RuleItem::Optional(item) => match rp.option {
                    0 => smallvec![*item],
                    _ => smallvec![self.empty],
                },
                RuleItem::List { item, max, .. } => match rp.option {
                    0 if max.is_none_or(|m| rp.position < m) => smallvec![*item],
                    0 => SmallVec::new(),
                    _ => smallvec![self.empty],
                },
                RuleItem::SeparatedList {
                    item, separator, ..
                } => match rp.option {
                    0 if rp.position % 2 == 0 => smallvec![*item],
                    0 => smallvec![*separator],
                    _ => smallvec![self.empty],
                },
            },
        }
    }

    /// Positions reachable from `rp` after consuming `item`.
    ///
    /// More than one position is returned where a list may either stop or
    /// continue after the item.
    #[must_use]
    pub fn next_rule_positions(&self, rp: RulePosition, item: RuleId) -> SmallVec<[RulePosition; 2]> {
        let rule = rp.rule;
        let option = rp.option;
        let end = RulePosition::end(rule, option);
        if rp.is_at_end() || !self.items_at(rp).contains(&item) {
            return SmallVec::new();
        }
        match &self.rule(rule).body {
            RuleBody::Terminal(_) | RuleBody::Embedded(_) => SmallVec::new(),
            RuleBody::Goal(_) => smallvec![end],
            RuleBody::NonTerminal(body) => match body {
                RuleItem::Concatenation(items) => {
                    Self::advance_sequence(rp, items.len())
                }
                RuleItem::Choice { alternatives, .. } => {
                    let len = alternatives.get(option as usize).map_or(0, SmallVec::len);
                    Self::advance_sequence(rp, len)
                }
                RuleItem::Optional(_) => smallvec![end],
                RuleItem::List { min, max, .. } => {
                    if option != 0 {
                        return smallvec![end];
                    }
                    let count = rp.position + 1;
                    let mut next = SmallVec::new();
                    if count >= *min {
                        next.push(end);
                    }
                    if max.is_none_or(|m| count < m) {
                        let capped = match max {
                            Some(_) => count,
                            None => count.min((*min).max(1)),
                        };
                        next.push(RulePosition::new(rule, option, capped));
                    }
                    next
                }
                RuleItem::SeparatedList { min, max, .. } => {
                    if option != 0 {
                        return smallvec![end];
                    }
                    if rp.position % 2 == 1 {
                        return smallvec![RulePosition::new(rule, option, rp.position + 1)];
                    }
                    let count = rp.position / 2 + 1;
                    let mut next = SmallVec::new();
                    if count >= *min {
                        next.push(end);
                    }
                    if max.is_none_or(|m| count < m) {
                        let capped = match max {
                            Some(_) => count,
                            None => count.min((*min).max(1)),
                        };
                        next.push(RulePosition::new(rule, option, capped * 2 - 1));
                    }
                    next
                }
            },
        }
    }

    fn advance_sequence(rp: RulePosition, len: usize) -> SmallVec<[RulePosition; 2]> {
        let next = rp.position as usize + 1;
        if next >= len {
            smallvec![RulePosition::end(rp.rule, rp.option)]
        } else {
            smallvec![RulePosition::new(
                rp.rule,
                rp.option,
                u32::try_from(next).unwrap_or(END - 1),
            )]
        }
    }

    /// Options whose first item is `child`; the candidates for HEIGHT.
    #[must_use]
    pub fn height_targets(&self, child: RuleId) -> &[(RuleId, u32)] {
        &self.analysis.height_targets[child.index()]
    }

    /// Whether a node of `rule` may eventually be consumed by a context at `rp`,
    /// either directly or as the left corner of what `rp` expects.
    #[must_use]
    pub fn can_grow_into(&self, rule: RuleId, rp: RulePosition) -> bool {
        self.items_at(rp)
            .iter()
            .any(|item| self.analysis.left_corners[item.index()].contains(rule))
    }

    /// Terminals (and embedded grammars) that may start what `rp` expects.
    #[must_use]
    pub fn first_terminals_at(&self, rp: RulePosition) -> SmallVec<[RuleId; 8]> {
        let items = self.items_at(rp);
        let mut terminals: SmallVec<[RuleId; 8]> = SmallVec::new();
        for item in items {
            for terminal in &self.analysis.first_terminals[item.index()] {
                if !terminals.contains(terminal) {
                    terminals.push(*terminal);
                }
            }
        }
        terminals
    }

    /// Terminals that may start a match of `rule`.
    #[must_use]
    pub fn first_terminals(&self, rule: RuleId) -> &[RuleId] {
        &self.analysis.first_terminals[rule.index()]
    }

    /// Whether `rule` can match the empty string.
    #[must_use]
    pub fn is_nullable(&self, rule: RuleId) -> bool {
        self.analysis.nullable.contains(rule)
    }

    /// Whether stepping from `from` to `to` over a zero-length item only
    /// repeats an empty iteration of a list.
    ///
    /// A list takes empty items only while it is below its minimum count;
    /// beyond that, the empty option (or stopping) derives the same span. A
    /// separated list takes an empty item after a separator, but a lone
    /// empty item would duplicate its empty option.
    #[must_use]
    pub fn repeats_empty_item(&self, from: RulePosition, to: RulePosition) -> bool {
        if from.option != 0 || from.is_at_end() {
            return false;
        }
        match &self.rule(from.rule).body {
            RuleBody::NonTerminal(RuleItem::List { item, min, .. }) => {
                from.position >= *min && self.is_nullable(*item)
            }
            RuleBody::NonTerminal(RuleItem::SeparatedList { item, min, .. }) => {
                *min == 0 && from.is_at_start() && to.is_at_end() && self.is_nullable(*item)
            }
            _ => false,
        }
    }
}
