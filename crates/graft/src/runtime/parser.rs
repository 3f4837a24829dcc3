//! Growth engine and public parser API.
//!
//! Parsing proceeds in *seasons*, one per input position, in increasing
//! order. A season pops every head whose next input position is the current
//! one and grows it:
//!
//! - **WIDTH**: an incomplete head scans the terminals that may come next
//!   and stacks a leaf for each one that matches.
//! - **GRAFT**: a complete node is consumed by a previous node that was
//!   waiting for its rule, advancing that node one item.
//! - **HEIGHT**: a complete node starts a new node of a rule it can begin,
//!   stacked on the same previous node.
//!
//! Nodes with equal identity are merged, so the number of nodes stays
//! polynomial in the input length even for ambiguous grammars. Edges added
//! to an already grown complete node within a season are queued and grown
//! before the season ends. After a season, nodes that can no longer grow
//! are dropped from the stack; their derivations remain for tree building.

use super::config::{ParseMetrics, RuntimeConfig};
use super::graph::{Derivation, LeafMatch, ParseGraph, SkipMatch};
use super::gss::{GrowingNodeIndex, NodeId};
use crate::error::diagnostics::extract_context;
use crate::error::{ParseError, ParseFailure};
use crate::input::InputText;
use crate::rule::{
    EMPTY_RULE_NAME, END_OF_TEXT_RULE_NAME, FastMap, FastSet, RuleBody, RuleId, RuleKind,
    RulePosition, RuleSet, TerminalPattern,
};
use crate::sppt::{SharedPackedParseTree, SpptBuilder};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, trace};

/// Cooperative cancellation for a running parse.
///
/// Clones share the same flag, so a handle obtained from
/// [`Parser::interrupt_handle`] can stop a parse running on another thread.
/// The flag is checked between seasons.
#[derive(Debug, Clone, Default)]
pub struct InterruptHandle {
    flag: Arc<AtomicBool>,
    message: Arc<Mutex<Option<String>>>,
}

impl InterruptHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the parse to stop; `message` ends up in [`ParseError::Interrupted`].
    pub fn interrupt(&self, message: impl Into<String>) {
        let mut slot = self.message.lock();
        *slot = Some(message.into());
        self.flag.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        let mut slot = self.message.lock();
        *slot = None;
        self.flag.store(false, Ordering::Release);
    }

    /// Take the interrupt message, leaving the flag set.
    #[must_use]
    pub fn take_message(&self) -> Option<String> {
        self.message.lock().take()
    }
}

/// Result of a successful parse.
#[derive(Debug, Clone)]
pub struct ParseOutput {
    pub tree: SharedPackedParseTree,
    pub metrics: ParseMetrics,
}

/// Parses text against a compiled [`RuleSet`].
///
/// # Example
///
/// ```rust
/// use graft::Parser;
/// use graft::rule::RuleSetBuilder;
///
/// let rules = RuleSetBuilder::new()
///     .separated_list("S", "'a'", "','", 1, None)
///     .build()
///     .expect("valid rule set");
/// let parser = Parser::new(rules);
/// let output = parser.parse("S", "a,a,a").expect("parses");
/// assert_eq!(output.tree.to_string_tree(), "S { 'a' ',' 'a' ',' 'a' }");
/// ```
#[derive(Debug, Clone)]
pub struct Parser {
    rules: Arc<RuleSet>,
    config: RuntimeConfig,
    interrupt: InterruptHandle,
}

impl Parser {
    #[must_use]
    pub fn new(rules: impl Into<Arc<RuleSet>>) -> Self {
        Self::with_config(rules, RuntimeConfig::default())
    }

    #[must_use]
    pub fn with_config(rules: impl Into<Arc<RuleSet>>, config: RuntimeConfig) -> Self {
        Self {
            rules: rules.into(),
            config,
            interrupt: InterruptHandle::new(),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &Arc<RuleSet> {
        &self.rules
    }

    #[must_use]
    pub const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Handle that interrupts parses started by this parser.
    #[must_use]
    pub fn interrupt_handle(&self) -> InterruptHandle {
        self.interrupt.clone()
    }

    /// Parse the whole of `input` as rule `goal`.
    ///
    /// Any previous interrupt is cleared when the parse starts.
    ///
    /// # Errors
    ///
    /// - [`ParseError::Grammar`] if `goal` names no rule.
    /// - [`ParseError::ParseFailed`] if the input does not match; the failure
    ///   holds the furthest position reached and the terminals expected there.
    /// - [`ParseError::Interrupted`] or [`ParseError::SeasonLimit`] if the
    ///   parse was stopped.
    pub fn parse(&self, goal: &str, input: &str) -> Result<ParseOutput, ParseError> {
        self.interrupt.clear();
        self.parse_uncleared(goal, input)
    }

    fn parse_uncleared(&self, goal: &str, input: &str) -> Result<ParseOutput, ParseError> {
        let started = Instant::now();
        let goal_rule = self.rules.goal_rule(goal)?;
        let text = InputText::new(input);
        debug!(goal, length = text.len(), "parse started");

        let mut runtime = RuntimeParser::new(
            &self.rules,
            &text,
            goal_rule,
            0,
            false,
            self.config.clone(),
            Some(&self.interrupt),
        );
        runtime.start();
        runtime.run()?;

        let tree = runtime
            .graph
            .best_goal()
            .and_then(|found| SpptBuilder::new(&runtime.graph).build(found));
        let mut metrics = runtime.graph.metrics.clone();
        metrics.parse_time = started.elapsed();
        debug!(
            goal,
            success = tree.is_some(),
            seasons = metrics.seasons,
            nodes = metrics.nodes_created,
            "parse finished"
        );
        match tree {
            Some(tree) => Ok(ParseOutput { tree, metrics }),
            None => Err(ParseError::ParseFailed(Box::new(
                runtime.failure(self.config.context_window),
            ))),
        }
    }

    /// Terminals that could follow `input[..position]` when parsing as `goal`.
    ///
    /// Empty when the prefix already fails before `position`, when it is a
    /// complete match with nothing more allowed, or when `position` is not a
    /// char boundary of `input`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Grammar`] if `goal` names no rule, and the
    /// interrupt and season limit errors of [`parse`](Self::parse).
    pub fn expected_at(
        &self,
        goal: &str,
        input: &str,
        position: usize,
    ) -> Result<Vec<String>, ParseError> {
        self.interrupt.clear();
        let goal_rule = self.rules.goal_rule(goal)?;
        let Some(prefix) = input.get(..position) else {
            return Ok(Vec::new());
        };
        let text = InputText::new(prefix);
        let mut runtime = RuntimeParser::new(
            &self.rules,
            &text,
            goal_rule,
            0,
            false,
            RuntimeConfig {
                stop_at_first_goal: false,
                ..self.config.clone()
            },
            Some(&self.interrupt),
        );
        runtime.start();
        runtime.run()?;

        let failure = &runtime.graph.failure;
        if !failure.recorded || failure.position != position {
            return Ok(Vec::new());
        }
        let mut expected: Vec<String> = failure
            .expected
            .iter()
            .map(|terminal| self.rules.name(*terminal))
            .filter(|name| *name != EMPTY_RULE_NAME && *name != END_OF_TEXT_RULE_NAME)
            .map(str::to_string)
            .collect();
        expected.sort_unstable();
        expected.dedup();
        Ok(expected)
    }

    /// Parse several inputs in parallel with the same goal.
    ///
    /// The interrupt handle is shared: interrupting stops every parse.
    #[cfg(feature = "parallel")]
    #[must_use]
    pub fn parse_many(&self, goal: &str, inputs: &[&str]) -> Vec<Result<ParseOutput, ParseError>> {
        use rayon::prelude::*;
        self.interrupt.clear();
        inputs
            .par_iter()
            .map(|input| self.parse_uncleared(goal, input))
            .collect()
    }
}

/// Per-season bookkeeping, reset when the season ends.
#[derive(Debug, Default)]
struct Season {
    position: usize,
    processed: Vec<NodeId>,
    grown: FastSet<NodeId>,
    width_done: FastSet<NodeId>,
    edges_done: FastSet<(NodeId, NodeId)>,
    edge_queue: Vec<(NodeId, NodeId)>,
    /// Nodes grafted onto a key without consuming input: whatever `key`
    /// gets stacked on later, they must be stacked on too.
    mirrors: FastMap<NodeId, SmallVec<[NodeId; 2]>>,
    goal_found: bool,
}

impl Season {
    fn reset(&mut self, position: usize) {
        self.position = position;
        self.processed.clear();
        self.grown.clear();
        self.width_done.clear();
        self.edges_done.clear();
        self.edge_queue.clear();
        self.mirrors.clear();
    }
}

pub(crate) struct RuntimeParser<'a> {
    pub(crate) graph: ParseGraph<'a>,
    config: RuntimeConfig,
    interrupt: Option<&'a InterruptHandle>,
    season: Season,
}

impl<'a> RuntimeParser<'a> {
    pub(crate) fn new(
        rules: &'a RuleSet,
        input: &'a InputText,
        goal: RuleId,
        start_position: usize,
        longest_mode: bool,
        config: RuntimeConfig,
        interrupt: Option<&'a InterruptHandle>,
    ) -> Self {
        Self {
            graph: ParseGraph::new(rules, input, goal, start_position, longest_mode),
            config,
            interrupt,
            season: Season::default(),
        }
    }

    /// Create the root head, consuming any leading skip.
    pub(crate) fn start(&mut self) {
        let position = self.graph.start_position;
        let leading = self.scan_skip(position);
        let root = GrowingNodeIndex::new(
            RulePosition::start(self.graph.goal, 0),
            position,
            position + leading,
        );
        let id = self.graph.create_root(root);
        if leading > 0
            && let Some(skip) = self.graph.rules.skip_rule()
        {
            let child = GrowingNodeIndex::new(RulePosition::end(skip, 0), position, position + leading);
            self.graph.add_derivation(
                root,
                Derivation {
                    predecessor: None,
                    child,
                },
            );
        }
        self.graph.enqueue(id);
    }

    /// Run seasons until no head can grow.
    pub(crate) fn run(&mut self) -> Result<(), ParseError> {
        while let Some(position) = self.graph.next_season_position() {
            if let Some(interrupt) = self.interrupt
                && interrupt.is_interrupted()
            {
                debug!(position, "parse interrupted");
                return Err(ParseError::Interrupted {
                    message: interrupt.take_message().unwrap_or_default(),
                });
            }
            if let Some(limit) = self.config.max_seasons
                && self.graph.metrics.seasons >= limit
            {
                return Err(ParseError::SeasonLimit { seasons: limit });
            }

            self.run_season(position);
            self.graph.metrics.seasons += 1;
            if self.config.check_invariants {
                self.graph.gss.verify();
            }
            if self.config.stop_at_first_goal && self.season.goal_found {
                break;
            }
        }
        Ok(())
    }

    fn run_season(&mut self, position: usize) {
        self.season.reset(position);
        debug!(
            position,
            heads = self.graph.heads.len(),
            nodes = self.graph.gss.len(),
            "season"
        );
        loop {
            if let Some((_, head)) = self.graph.heads.pop_if(|(next, _)| *next == position) {
                self.process(head);
            } else if let Some((node, previous)) = self.season.edge_queue.pop() {
                self.process_edge(node, previous);
            } else {
                break;
            }
            if self.config.stop_at_first_goal && self.season.goal_found {
                break;
            }
        }
        self.end_season();
    }

    /// Drop the nodes grown this season that nothing is stacked on.
    fn end_season(&mut self) {
        let processed = std::mem::take(&mut self.season.processed);
        let heads = &self.graph.heads;
        let gss = &mut self.graph.gss;
        let mut dropped = 0;
        for id in processed.iter().rev() {
            if gss.contains(*id) && gss.is_head(*id) && !heads.contains(*id) {
                dropped += gss.drop_stack(
                    *id,
                    |previous| heads.contains(previous),
                    |_, key| trace!(%key, "drop"),
                );
            }
        }
        if dropped > 0 {
            trace!(dropped, remaining = gss.len(), "season ended");
        }
        self.season.processed = processed;
    }

    fn process(&mut self, id: NodeId) {
        let key = self.graph.gss.key(id);
        self.season.processed.push(id);
        self.season.grown.insert(id);
        if key.is_complete() {
            self.graph.note_complete(key);
            let previous: SmallVec<[NodeId; 2]> = self.graph.gss.previous(id).into();
            if previous.is_empty() {
                self.complete_root(key);
            }
            for prev in previous {
                self.process_edge(id, prev);
            }
        } else {
            self.grow_width(id, key);
        }
    }

    /// A complete node with nothing below it: the goal, if it is the goal rule.
    fn complete_root(&mut self, key: GrowingNodeIndex) {
        let goal = self.graph.goal;
        if key.rule_position.rule != goal {
            return;
        }
        if self.graph.longest_mode || key.next_input_position == self.graph.input.len() {
            trace!(%key, "goal");
            self.graph.goals.push(key);
            self.season.goal_found = true;
        } else {
            let end_of_text = self.graph.rules.end_of_text_rule();
            self.graph
                .record_failure(key.next_input_position, end_of_text, self.graph.user_goal);
        }
    }

    fn grow_width(&mut self, id: NodeId, key: GrowingNodeIndex) {
        if !self.season.width_done.insert(id) {
            return;
        }
        let position = key.next_input_position;
        for terminal in self.graph.rules.first_terminals_at(key.rule_position) {
            match self.find_or_try_create_leaf(terminal, position) {
                Some(next) => {
                    let leaf_key = GrowingNodeIndex::new(RulePosition::end(terminal, 0), position, next);
                    let (leaf, created) = self.graph.create(leaf_key);
                    self.add_edge(leaf, id);
                    if created {
                        self.graph.enqueue(leaf);
                    }
                    trace!(leaf = %leaf_key, on = %key, "width");
                }
                None => {
                    if !self.graph.rules.rule(terminal).is_empty_terminal() {
                        self.graph
                            .record_failure(position, terminal, key.rule_position.rule);
                    }
                }
            }
        }
    }

    /// Grow the complete node `node` over the edge to `previous`.
    fn process_edge(&mut self, node: NodeId, previous: NodeId) {
        if !self.season.edges_done.insert((node, previous)) {
            return;
        }
        if !self.graph.gss.contains(previous) {
            return;
        }
        let child = self.graph.gss.key(node);
        let context = self.graph.gss.key(previous);
        self.graft(child, previous, context);
        self.height(child, previous, context);
    }

    /// Advance `context` over the completed `child`.
    fn graft(&mut self, child: GrowingNodeIndex, previous: NodeId, context: GrowingNodeIndex) {
        let rules = self.graph.rules;
        let rule = child.rule_position.rule;
        if !rules.items_at(context.rule_position).contains(&rule) {
            return;
        }
        for rp in rules.next_rule_positions(context.rule_position, rule) {
            let key = GrowingNodeIndex::new(rp, context.start, child.next_input_position);
            if key == context
                || key == child
                || self.repeats_empty(child, context.rule_position, rp)
                || !self.passes_lookahead(key)
            {
                continue;
            }
            let below: SmallVec<[NodeId; 2]> = self.graph.gss.previous(previous).into();
            let (grafted, created) = self.graph.create(key);
            self.graph.add_derivation(
                key,
                Derivation {
                    predecessor: Some(context),
                    child,
                },
            );
            for prev in below {
                self.add_edge(grafted, prev);
            }
            if context.next_input_position == self.season.position {
                let mirrors = self.season.mirrors.entry(previous).or_default();
                if !mirrors.contains(&grafted) {
                    mirrors.push(grafted);
                }
            }
            if created {
                self.graph.enqueue(grafted);
            }
            trace!(%key, %child, "graft");
        }
    }

    /// Start every rule that `child` can begin, stacked on `previous`.
    fn height(&mut self, child: GrowingNodeIndex, previous: NodeId, context: GrowingNodeIndex) {
        let rules = self.graph.rules;
        let rule = child.rule_position.rule;
        for &(target, option) in rules.height_targets(rule) {
            if !rules.can_grow_into(target, context.rule_position) {
                continue;
            }
            let from = RulePosition::start(target, option);
            for rp in rules.next_rule_positions(from, rule) {
                let key = GrowingNodeIndex::new(rp, child.start, child.next_input_position);
                if key == child
                    || self.repeats_empty(child, from, rp)
                    || !self.passes_lookahead(key)
                {
                    continue;
                }
                let (grown, created) = self.graph.create(key);
                self.graph.add_derivation(
                    key,
                    Derivation {
                        predecessor: None,
                        child,
                    },
                );
                self.add_edge(grown, previous);
                if created {
                    self.graph.enqueue(grown);
                }
                trace!(%key, %child, "height");
            }
        }
    }

    /// A zero-length `child` that would only add another empty list item.
    fn repeats_empty(&self, child: GrowingNodeIndex, from: RulePosition, to: RulePosition) -> bool {
        child.start == child.next_input_position && self.graph.rules.repeats_empty_item(from, to)
    }

    /// Stack `child` on `previous`, propagating the edge to late growth.
    fn add_edge(&mut self, child: NodeId, previous: NodeId) {
        if !self.graph.gss.push(previous, child) {
            return;
        }
        if self.season.grown.contains(&child) && self.graph.gss.key(child).is_complete() {
            self.season.edge_queue.push((child, previous));
        }
        if let Some(mirrors) = self.season.mirrors.get(&child).cloned() {
            for mirror in mirrors {
                self.add_edge(mirror, previous);
            }
        }
    }

    /// Whether an incomplete `key` can continue at its next input position.
    fn passes_lookahead(&mut self, key: GrowingNodeIndex) -> bool {
        if key.is_complete() || !self.config.lookahead_filtering {
            return true;
        }
        let rules = self.graph.rules;
        let position = key.next_input_position;
        let terminals = rules.first_terminals_at(key.rule_position);
        for terminal in &terminals {
            let always = match rules.rule(*terminal).body() {
                RuleBody::Terminal(TerminalPattern::Empty) | RuleBody::Embedded(_) => true,
                _ => false,
            };
            if always || self.find_or_try_create_leaf(*terminal, position).is_some() {
                return true;
            }
        }
        for terminal in terminals {
            self.graph
                .record_failure(position, terminal, key.rule_position.rule);
        }
        false
    }

    /// Next input position after matching `terminal` at `position`, cached.
    fn find_or_try_create_leaf(&mut self, terminal: RuleId, position: usize) -> Option<usize> {
        if let Some(cached) = self.graph.leaves.get(&(terminal, position)) {
            return cached.as_ref().map(|leaf| leaf.next);
        }
        self.graph.metrics.leaves_scanned += 1;
        let rules = self.graph.rules;
        let matched = match rules.rule(terminal).body() {
            RuleBody::Terminal(pattern) => self
                .graph
                .input
                .try_match(position, pattern)
                .map(|length| (length, None)),
            RuleBody::Embedded(embedded) => self
                .nested_match(&embedded.rule_set, embedded.goal, position)
                .map(|(length, tree)| (length, Some(Arc::new(tree)))),
            RuleBody::NonTerminal(_) | RuleBody::Goal(_) => None,
        };
        let leaf = matched.map(|(length, fragment)| {
            let end = position + length;
            let next = if length == 0 {
                end
            } else {
                end + self.scan_skip(end)
            };
            LeafMatch {
                length,
                next,
                fragment,
            }
        });
        let next = leaf.as_ref().map(|leaf| leaf.next);
        self.graph.leaves.insert((terminal, position), leaf);
        next
    }

    /// Length of the run of skip rules at `position`, cached.
    fn scan_skip(&mut self, position: usize) -> usize {
        if !self.graph.skip_enabled {
            return 0;
        }
        if let Some(cached) = self.graph.skips.get(&position) {
            return cached.as_ref().map_or(0, |skip| skip.length);
        }
        let rules = self.graph.rules;
        let found = rules
            .skip_goal()
            .filter(|goal| self.skip_may_start(*goal, position))
            .and_then(|goal| self.nested_match(rules, goal, position))
            .filter(|(length, _)| *length > 0)
            .map(|(length, tree)| SkipMatch {
                length,
                fragment: Arc::new(tree),
            });
        let length = found.as_ref().map_or(0, |skip| skip.length);
        self.graph.skips.insert(position, found);
        length
    }

    /// Cheap check that some skip terminal matches before running a nested parse.
    fn skip_may_start(&self, goal: RuleId, position: usize) -> bool {
        let rules = self.graph.rules;
        rules
            .first_terminals(goal)
            .iter()
            .any(|terminal| match rules.rule(*terminal).body() {
                RuleBody::Terminal(pattern) => self
                    .graph
                    .input
                    .try_match(position, pattern)
                    .is_some_and(|length| length > 0),
                _ => true,
            })
    }

    /// Longest match of `goal` from `rules` at `position`, as a tree.
    fn nested_match(
        &self,
        rules: &RuleSet,
        goal: RuleId,
        position: usize,
    ) -> Option<(usize, SharedPackedParseTree)> {
        let mut nested = RuntimeParser::new(
            rules,
            self.graph.input,
            goal,
            position,
            true,
            self.config.nested(),
            None,
        );
        nested.start();
        nested.run().ok()?;
        let best = nested.graph.best_goal()?;
        let tree = SpptBuilder::new(&nested.graph).build(best)?;
        trace!(position, length = best.next_input_position - position, "nested match");
        Some((best.next_input_position - position, tree))
    }

    /// Describe why the parse failed.
    pub(crate) fn failure(&self, context_window: usize) -> ParseFailure {
        let graph = &self.graph;
        let rules = graph.rules;
        let record = &graph.failure;
        let position = if record.recorded {
            record.position
        } else {
            graph.start_position
        };

        let mut expected: Vec<String> = record
            .expected
            .iter()
            .map(|terminal| rules.name(*terminal))
            .filter(|name| *name != EMPTY_RULE_NAME)
            .map(str::to_string)
            .collect();
        expected.sort_unstable();
        expected.dedup();

        let mut active_rules: Vec<String> = Vec::new();
        for rule in &record.active {
            if rules.rule(*rule).kind() == RuleKind::Goal {
                continue;
            }
            let name = rules.name(*rule).to_string();
            if !active_rules.contains(&name) {
                active_rules.push(name);
            }
        }

        let context = extract_context(graph.input.text(), position, position, context_window)
            .map(|(before, _, after)| before + &after)
            .unwrap_or_default();
        let longest_match = graph
            .longest_user_match
            .and_then(|key| SpptBuilder::new(graph).build(key))
            .map(Arc::new);

        ParseFailure {
            location: graph.input.location(position, 0),
            context,
            active_rules,
            expected,
            longest_match,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{ChoiceKind, RuleSetBuilder};

    fn list_rules() -> RuleSet {
        RuleSetBuilder::new()
            .separated_list("S", "'a'", "','", 1, None)
            .build()
            .unwrap()
    }

    fn run(rules: &RuleSet, text: &str, goal: &str) -> (bool, ParseMetrics) {
        let input = InputText::new(text);
        let goal = rules.goal_rule(goal).unwrap();
        let config = RuntimeConfig {
            check_invariants: true,
            ..RuntimeConfig::default()
        };
        let mut runtime = RuntimeParser::new(rules, &input, goal, 0, false, config, None);
        runtime.start();
        runtime.run().unwrap();
        (runtime.graph.best_goal().is_some(), runtime.graph.metrics.clone())
    }

    #[test]
    fn test_one_season_per_consumed_position() {
        let rules = list_rules();
        let (found, metrics) = run(&rules, "a,a,a", "S");
        assert!(found);
        assert_eq!(metrics.seasons, 6);
        assert!(metrics.leaves_scanned >= 5);
    }

    #[test]
    fn test_stack_is_emptied_after_parse() {
        let rules = list_rules();
        let input = InputText::new("a,a");
        let goal = rules.goal_rule("S").unwrap();
        let mut runtime =
            RuntimeParser::new(&rules, &input, goal, 0, false, RuntimeConfig::default(), None);
        runtime.start();
        runtime.run().unwrap();
        assert!(runtime.graph.next_season_position().is_none());
        assert!(runtime.graph.gss.is_empty());
        let s = rules.find("S").unwrap();
        assert_eq!(runtime.graph.complete_options(s, 0, 3), &[0]);
        assert_eq!(runtime.graph.complete_options(s, 0, 1), &[0]);
        assert!(runtime.graph.complete_options(s, 0, 2).is_empty());
    }

    #[test]
    fn test_left_recursion_terminates() {
        let rules = RuleSetBuilder::new()
            .choice("E", ChoiceKind::LongestPriority, &[&["E", "'+'", "'a'"], &["'a'"]])
            .build()
            .unwrap();
        assert!(run(&rules, "a+a+a+a", "E").0);
        assert!(!run(&rules, "a+a+", "E").0);
    }

    #[test]
    fn test_right_recursion_and_nullable_prefix() {
        let rules = RuleSetBuilder::new()
            .choice("R", ChoiceKind::LongestPriority, &[&["'a'", "R"], &["'a'"]])
            .optional("A", "'x'")
            .concatenation("S", &["A", "'b'"])
            .build()
            .unwrap();
        assert!(run(&rules, "aaaa", "R").0);
        assert!(run(&rules, "b", "S").0);
        assert!(run(&rules, "xb", "S").0);
    }

    #[test]
    fn test_start_registers_one_root() {
        let rules = list_rules();
        let input = InputText::new("a");
        let goal = rules.goal_rule("S").unwrap();
        let mut runtime =
            RuntimeParser::new(&rules, &input, goal, 0, false, RuntimeConfig::default(), None);
        runtime.start();
        assert_eq!(runtime.graph.gss.len(), 1);
        assert_eq!(runtime.graph.metrics.nodes_created, 1);
        assert_eq!(runtime.graph.next_season_position(), Some(0));
    }

    #[test]
    fn test_longest_mode_accepts_prefix() {
        let rules = list_rules();
        let input = InputText::new("a,a;");
        let goal = rules.goal_rule("S").unwrap();
        let mut runtime = RuntimeParser::new(&rules, &input, goal, 0, true, RuntimeConfig::default(), None);
        runtime.start();
        runtime.run().unwrap();
        let best = runtime.graph.best_goal().unwrap();
        assert_eq!(best.next_input_position, 3);
    }

    #[test]
    fn test_interrupt_handle_shares_state() {
        let handle = InterruptHandle::new();
        let clone = handle.clone();
        clone.interrupt("stop");
        assert!(handle.is_interrupted());
        assert_eq!(handle.take_message().as_deref(), Some("stop"));
        assert!(handle.is_interrupted());
        handle.clear();
        assert!(!clone.is_interrupted());
    }
}
