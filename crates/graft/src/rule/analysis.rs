//! Static analysis of a rule set, computed once at build time.
//!
//! The runtime never walks the grammar graph while parsing; it asks for
//! precomputed answers instead:
//!
//! - `left_corners[r]` is every rule that can appear as the leftmost
//!   descendant of `r` (reflexive), used to decide whether growing a node
//!   upward can ever be consumed by a waiting context.
//! - `first_terminals[r]` is the leaf-like subset of `left_corners[r]`,
//!   used for WIDTH scans and lookahead filtering.
//! - `height_targets[c]` lists the `(rule, option)` pairs whose first item
//!   is `c`, the inverse of the first-item relation.
//! - `nullable` marks rules that can match the empty string, including
//!   patterns that accept it.

use super::{RuleBody, RuleId, RulePosition, RuleSet, TerminalPattern};

/// A fixed-size set of rule ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleBitSet {
    words: Vec<u64>,
}

impl RuleBitSet {
    #[must_use]
    pub fn with_capacity(rules: usize) -> Self {
        Self {
            words: vec![0; rules.div_ceil(64)],
        }
    }

    /// Returns `true` if the id was not already present.
    pub fn insert(&mut self, id: RuleId) -> bool {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let fresh = self.words[word] & mask == 0;
        self.words[word] |= mask;
        fresh
    }

    #[must_use]
    pub fn contains(&self, id: RuleId) -> bool {
        let (word, bit) = (id.index() / 64, id.index() % 64);
        self.words.get(word).is_some_and(|w| w & (1u64 << bit) != 0)
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &bits)| {
            (0..64u32)
                .filter(move |b| bits & (1u64 << b) != 0)
                .map(move |b| RuleId::new(u32::try_from(w).unwrap_or(u32::MAX) * 64 + b))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RuleAnalysis {
    pub(crate) left_corners: Vec<RuleBitSet>,
    pub(crate) first_terminals: Vec<Vec<RuleId>>,
    pub(crate) height_targets: Vec<Vec<(RuleId, u32)>>,
    pub(crate) nullable: RuleBitSet,
}

impl RuleAnalysis {
    pub(crate) fn compute(rules: &RuleSet) -> Self {
        let count = rules.len();

        // First-item edges, also recorded inverted for HEIGHT.
        let mut first_items: Vec<Vec<RuleId>> = vec![Vec::new(); count];
        let mut height_targets: Vec<Vec<(RuleId, u32)>> = vec![Vec::new(); count];
        for rule in rules.rules() {
            if rule.is_leaf_like() {
                continue;
            }
            for option in 0..rules.option_count(rule.id) {
                for item in rules.items_at(RulePosition::start(rule.id, option)) {
                    if !first_items[rule.id.index()].contains(&item) {
                        first_items[rule.id.index()].push(item);
                    }
                    // Goals are only ever roots, never grown into.
                    if !matches!(rule.body, RuleBody::Goal(_)) {
                        height_targets[item.index()].push((rule.id, option));
                    }
                }
            }
        }

        let mut left_corners = Vec::with_capacity(count);
        let mut stack = Vec::new();
        for start in 0..count {
            let mut closure = RuleBitSet::with_capacity(count);
            let start = RuleId::new(u32::try_from(start).unwrap_or(u32::MAX));
            closure.insert(start);
            stack.push(start);
            while let Some(rule) = stack.pop() {
                for &item in &first_items[rule.index()] {
                    if closure.insert(item) {
                        stack.push(item);
                    }
                }
            }
            left_corners.push(closure);
        }

        let first_terminals = left_corners
            .iter()
            .map(|closure| {
                closure
                    .iter()
                    .filter(|id| rules.rule(*id).is_leaf_like())
                    .collect()
            })
            .collect();

        Self {
            nullable: Self::nullable_rules(rules),
            left_corners,
            first_terminals,
            height_targets,
        }
    }

    /// Fixpoint over "some option consists only of nullable items".
    fn nullable_rules(rules: &RuleSet) -> RuleBitSet {
        let mut nullable = RuleBitSet::with_capacity(rules.len());
        nullable.insert(rules.empty_rule());
        for rule in rules.rules() {
            if let Some(TerminalPattern::Pattern { regex, .. }) = rule.terminal_pattern()
                && regex.is_match("")
            {
                nullable.insert(rule.id);
            }
        }
        let mut changed = true;
        while changed {
            changed = false;
            for rule in rules.rules() {
                if rule.is_leaf_like() || nullable.contains(rule.id) {
                    continue;
                }
                let any_option = (0..rules.option_count(rule.id))
                    .any(|option| option_is_nullable(rules, &nullable, rule.id, option));
                if any_option {
                    nullable.insert(rule.id);
                    changed = true;
                }
            }
        }
        nullable
    }
}

fn option_is_nullable(rules: &RuleSet, nullable: &RuleBitSet, rule: RuleId, option: u32) -> bool {
    let mut rp = RulePosition::start(rule, option);
    // Sequences are finite and lists saturate, so this walk terminates.
    let mut steps = 0;
    while !rp.is_at_end() {
        let Some(item) = rules.items_at(rp).first().copied() else {
            return false;
        };
        if !nullable.contains(item) {
            return false;
        }
        let next = rules.next_rule_positions(rp, item);
        if next.iter().any(|p| p.is_at_end()) {
            return true;
        }
        match next.first() {
            Some(p) if steps < 64 => rp = *p,
            _ => return false,
        }
        steps += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use crate::rule::{ChoiceKind, RuleSetBuilder};

    #[test]
    fn test_left_corners_follow_first_items() {
        let rules = RuleSetBuilder::new()
            .concatenation("S", &["A", "'b'"])
            .choice("A", ChoiceKind::LongestPriority, &[&["'a'"], &["'c'", "'d'"]])
            .build()
            .unwrap();
        let s = rules.find("S").unwrap();
        let a = rules.find("A").unwrap();
        let b = rules.find("'b'").unwrap();
        let first: Vec<_> = rules
            .first_terminals(s)
            .iter()
            .map(|t| rules.name(*t).to_string())
            .collect();
        assert_eq!(first, vec!["'a'", "'c'"]);
        assert!(rules.analysis.left_corners[s.index()].contains(a));
        assert!(!rules.analysis.left_corners[s.index()].contains(b));
        assert_eq!(rules.height_targets(a), &[(s, 0)]);
    }

    #[test]
    fn test_nullable_detection() {
        let rules = RuleSetBuilder::new()
            .concatenation("S", &["A", "B"])
            .optional("A", "'a'")
            .list("B", "'b'", 0, None)
            .list("C", "'c'", 1, None)
            .build()
            .unwrap();
        assert!(rules.is_nullable(rules.find("A").unwrap()));
        assert!(rules.is_nullable(rules.find("B").unwrap()));
        assert!(rules.is_nullable(rules.find("S").unwrap()));
        assert!(!rules.is_nullable(rules.find("C").unwrap()));
    }

    #[test]
    fn test_patterns_accepting_empty_are_nullable() {
        let rules = RuleSetBuilder::new()
            .list("S", "ID", 0, None)
            .pattern("ID", "[a-z]*")
            .pattern("NUM", "[0-9]+")
            .build()
            .unwrap();
        assert!(rules.is_nullable(rules.find("ID").unwrap()));
        assert!(!rules.is_nullable(rules.find("NUM").unwrap()));
    }

    #[test]
    fn test_bitset_iterates_in_order() {
        let mut set = super::RuleBitSet::with_capacity(10);
        for id in [70, 3, 64, 3] {
            set.insert(crate::rule::RuleId::new(id));
        }
        let ids: Vec<_> = set.iter().map(|id| id.index()).collect();
        assert_eq!(ids, vec![3, 64, 70]);
        assert_eq!(set.len(), 3);
    }
}
