//! Ambiguity resolution for packed nodes
//!
//! A node whose span can be derived in several ways gets one candidate
//! alternative per derivation. Candidates are filtered in two stages:
//!
//! 1. Declared preferences: a candidate whose root operator has the lower
//!    precedence becomes the root. At equal precedence, left associativity
//!    prefers the candidate whose root operator comes later (so the earlier
//!    operators nest on the left) and right associativity the earlier one.
//! 2. The rule's [`ChoiceKind`]: longest-then-priority compares the lengths
//!    of the children from left to right and then the option index;
//!    priority-then-longest does it the other way round. Ambiguous rules
//!    keep everything.
//!
//! 3. Nested choices: where two candidates first differ in a child of the
//!    same choice rule starting at the same offset, that rule's own kind
//!    decides. A longest-then-priority choice keeps the candidate whose
//!    child reaches further, so a keyword cannot split an identifier.
//!
//! A candidate survives if no other candidate is strictly better, so
//! candidates that tie stay packed in the node in their original order.

use crate::rule::{Associativity, ChoiceKind, PreferenceRule, RuleId, RuleKind, RuleSet};
use crate::sppt::{SpptAlternative, SpptNode};
use smallvec::SmallVec;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy)]
struct OperatorInfo {
    precedence: u32,
    associativity: Associativity,
    position: usize,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct AmbiguityResolver<'r> {
    rules: &'r RuleSet,
}

impl<'r> AmbiguityResolver<'r> {
    pub(crate) const fn new(rules: &'r RuleSet) -> Self {
        Self { rules }
    }

    /// Keep the candidates of `rule` that no other candidate beats.
    pub(crate) fn resolve(
        &self,
        nodes: &[SpptNode],
        rule: RuleId,
        candidates: Vec<SpptAlternative>,
    ) -> Vec<SpptAlternative> {
        if candidates.len() <= 1 {
            return candidates;
        }
        let kind = self.rules.rule(rule).choice_kind();
        let preferences = self.rules.preferences(rule);
        let operators: Vec<Option<OperatorInfo>> = candidates
            .iter()
            .map(|candidate| self.root_operator(nodes, preferences, candidate))
            .collect();
        let lengths: Vec<SmallVec<[usize; 4]>> = candidates
            .iter()
            .map(|candidate| child_lengths(nodes, candidate))
            .collect();

        let better = |a: usize, b: usize| -> bool {
            match precedence_order(operators[a], operators[b]) {
                Some(Ordering::Less) => return true,
                Some(Ordering::Greater) => return false,
                _ => {}
            }
            let by_option = candidates[a].option.cmp(&candidates[b].option);
            let by_length = longest_first(&lengths[a], &lengths[b]);
            let order = match kind {
                ChoiceKind::Ambiguous => Ordering::Equal,
                ChoiceKind::LongestPriority => by_length.then(by_option),
                ChoiceKind::PriorityLongest => by_option.then(by_length),
            };
            order
                .then_with(|| self.divergence_order(nodes, &candidates[a], &candidates[b]))
                == Ordering::Less
        };

        let survivors: Vec<bool> = (0..candidates.len())
            .map(|i| !(0..candidates.len()).any(|j| j != i && better(j, i)))
            .collect();
        if !survivors.contains(&true) {
            return candidates;
        }
        candidates
            .into_iter()
            .zip(survivors)
            .filter_map(|(candidate, keep)| keep.then_some(candidate))
            .collect()
    }

    /// The operator at the top of `candidate`: a direct child leaf, or the
    /// first leaf of a direct child branch, named by a preference on the
    /// candidate's option.
    fn root_operator(
        &self,
        nodes: &[SpptNode],
        preferences: &[PreferenceRule],
        candidate: &SpptAlternative,
    ) -> Option<OperatorInfo> {
        let applicable: SmallVec<[&PreferenceRule; 2]> = preferences
            .iter()
            .filter(|pref| pref.option == candidate.option)
            .collect();
        if applicable.is_empty() {
            return None;
        }
        for child in &candidate.children {
            let node = &nodes[child.index()];
            if node.is_skip() {
                continue;
            }
            let leaf = if node.is_leaf() {
                Some(node)
            } else if self.is_local(node) {
                node.children()
                    .iter()
                    .map(|id| &nodes[id.index()])
                    .find(|n| !n.is_skip())
                    .filter(|n| n.is_leaf())
            } else {
                None
            };
            let Some(leaf) = leaf else { continue };
            if let Some(pref) = applicable
                .iter()
                .find(|pref| pref.matches(candidate.option, leaf.rule()))
            {
                return Some(OperatorInfo {
                    precedence: pref.precedence,
                    associativity: pref.associativity,
                    position: leaf.start(),
                });
            }
        }
        None
    }

    /// Compare two candidates at the first non-skip child where they differ.
    fn divergence_order(
        &self,
        nodes: &[SpptNode],
        a: &SpptAlternative,
        b: &SpptAlternative,
    ) -> Ordering {
        let non_skip = |alt: &SpptAlternative| {
            alt.children
                .iter()
                .copied()
                .filter(|id| !nodes[id.index()].is_skip())
                .collect::<SmallVec<[_; 4]>>()
        };
        let (left, right) = (non_skip(a), non_skip(b));
        left.iter()
            .zip(&right)
            .find(|(x, y)| x != y)
            .map_or(Ordering::Equal, |(x, y)| {
                self.completion_order(nodes, &nodes[x.index()], &nodes[y.index()])
            })
    }

    /// Order two completions of one rule from one offset by that rule's kind.
    ///
    /// Rules without a choice kind of their own defer to the first place
    /// their preferred derivations differ.
    fn completion_order(&self, nodes: &[SpptNode], x: &SpptNode, y: &SpptNode) -> Ordering {
        if x.rule() != y.rule() || x.start() != y.start() || x.is_leaf() || y.is_leaf() {
            return Ordering::Equal;
        }
        let by_length = y.length().cmp(&x.length());
        match self.rules.rule(x.rule()).choice_kind() {
            ChoiceKind::LongestPriority => by_length,
            ChoiceKind::PriorityLongest => preferred_option(x)
                .cmp(&preferred_option(y))
                .then(by_length),
            ChoiceKind::Ambiguous => match (x.alternatives().first(), y.alternatives().first()) {
                (Some(a), Some(b)) if self.is_local(x) => self.divergence_order(nodes, a, b),
                _ => Ordering::Equal,
            },
        }
    }

    // Children of embedded branches carry another rule set's ids.
    fn is_local(&self, node: &SpptNode) -> bool {
        self.rules.rule(node.rule()).kind() != RuleKind::Embedded
    }
}

fn preferred_option(node: &SpptNode) -> Option<u32> {
    node.alternatives().iter().map(|alt| alt.option).min()
}

fn child_lengths(nodes: &[SpptNode], candidate: &SpptAlternative) -> SmallVec<[usize; 4]> {
    candidate
        .children
        .iter()
        .map(|id| &nodes[id.index()])
        .filter(|node| !node.is_skip())
        .map(SpptNode::length)
        .collect()
}

/// `Less` when `a` has a longer child at the first position they differ.
fn longest_first(a: &[usize], b: &[usize]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| y.cmp(x))
        .find(|order| order.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// `Less` when `a` should be the root rather than `b`.
fn precedence_order(a: Option<OperatorInfo>, b: Option<OperatorInfo>) -> Option<Ordering> {
    let (a, b) = (a?, b?);
    if a.precedence != b.precedence {
        return Some(a.precedence.cmp(&b.precedence));
    }
    match (a.associativity, b.associativity) {
        (Associativity::Left, Associativity::Left) => Some(b.position.cmp(&a.position)),
        (Associativity::Right, Associativity::Right) => Some(a.position.cmp(&b.position)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputLocation;
    use crate::rule::{PreferenceOption, RuleSetBuilder};
    use crate::sppt::SpptNodeId;

    fn leaf(rules: &RuleSet, name: &str, start: usize, len: usize) -> SpptNode {
        let rule = rules.find(name).unwrap();
        SpptNode::Leaf {
            name: name.into(),
            rule,
            location: InputLocation::new(start, 1, start + 1, len),
            text: "x".into(),
            is_skip: false,
        }
    }

    fn branch(rules: &RuleSet, name: &str, start: usize, len: usize) -> SpptNode {
        SpptNode::Branch {
            name: name.into(),
            rule: rules.find(name).unwrap(),
            start,
            length: len,
            alternatives: vec![],
            is_skip: false,
        }
    }

    fn alt(option: u32, children: &[usize]) -> SpptAlternative {
        SpptAlternative {
            option,
            children: children.iter().map(|i| SpptNodeId::from_index(*i)).collect(),
        }
    }

    fn expression_rules() -> RuleSet {
        RuleSetBuilder::new()
            .choice(
                "E",
                ChoiceKind::Ambiguous,
                &[&["E", "'+'", "E"], &["E", "'*'", "E"], &["'a'"]],
            )
            .preference("E", PreferenceOption::left(0, &["'+'"], 1))
            .preference("E", PreferenceOption::left(1, &["'*'"], 2))
            .build()
            .unwrap()
    }

    #[test]
    fn test_lower_precedence_becomes_root() {
        let rules = expression_rules();
        // a+a*a: (a) + (a*a) versus (a+a) * (a)
        let nodes = vec![
            branch(&rules, "E", 0, 1),
            leaf(&rules, "'+'", 1, 1),
            branch(&rules, "E", 2, 3),
            branch(&rules, "E", 0, 3),
            leaf(&rules, "'*'", 3, 1),
            branch(&rules, "E", 4, 1),
        ];
        let e = rules.find("E").unwrap();
        let kept = AmbiguityResolver::new(&rules).resolve(
            &nodes,
            e,
            vec![alt(1, &[3, 4, 5]), alt(0, &[0, 1, 2])],
        );
        assert_eq!(kept, vec![alt(0, &[0, 1, 2])]);
    }

    #[test]
    fn test_left_associativity_prefers_later_root_operator() {
        let rules = expression_rules();
        // a+a+a: (a) + (a+a) versus (a+a) + (a)
        let nodes = vec![
            branch(&rules, "E", 0, 1),
            leaf(&rules, "'+'", 1, 1),
            branch(&rules, "E", 2, 3),
            branch(&rules, "E", 0, 3),
            leaf(&rules, "'+'", 3, 1),
            branch(&rules, "E", 4, 1),
        ];
        let e = rules.find("E").unwrap();
        let kept = AmbiguityResolver::new(&rules).resolve(
            &nodes,
            e,
            vec![alt(0, &[0, 1, 2]), alt(0, &[3, 4, 5])],
        );
        assert_eq!(kept, vec![alt(0, &[3, 4, 5])]);
    }

    #[test]
    fn test_choice_kinds() {
        let rules = RuleSetBuilder::new()
            .choice("L", ChoiceKind::LongestPriority, &[&["A", "A"], &["A", "A"]])
            .choice("P", ChoiceKind::PriorityLongest, &[&["A", "A"], &["A", "A"]])
            .choice("N", ChoiceKind::Ambiguous, &[&["A", "A"], &["A", "A"]])
            .choice("A", ChoiceKind::Ambiguous, &[&["'a'"], &["'a'", "'a'"]])
            .build()
            .unwrap();
        let nodes = vec![
            branch(&rules, "A", 0, 1),
            branch(&rules, "A", 1, 2),
            branch(&rules, "A", 0, 2),
            branch(&rules, "A", 2, 1),
        ];
        let resolver = AmbiguityResolver::new(&rules);
        let candidates = || vec![alt(0, &[0, 1]), alt(1, &[2, 3])];

        let longest = resolver.resolve(&nodes, rules.find("L").unwrap(), candidates());
        assert_eq!(longest, vec![alt(1, &[2, 3])]);
        let priority = resolver.resolve(&nodes, rules.find("P").unwrap(), candidates());
        assert_eq!(priority, vec![alt(0, &[0, 1])]);
        let ambiguous = resolver.resolve(&nodes, rules.find("N").unwrap(), candidates());
        assert_eq!(ambiguous, candidates());
    }

    fn chosen(rules: &RuleSet, name: &str, start: usize, len: usize, option: u32) -> SpptNode {
        let mut node = branch(rules, name, start, len);
        if let SpptNode::Branch { alternatives, .. } = &mut node {
            alternatives.push(alt(option, &[]));
        }
        node
    }

    fn keyword_rules(kind: ChoiceKind) -> RuleSet {
        RuleSetBuilder::new()
            .list("S", "X", 1, None)
            .choice("X", kind, &[&["'if'"], &["ID"]])
            .pattern("ID", "[a-z]+")
            .build()
            .unwrap()
    }

    #[test]
    fn test_nested_longest_choice_keeps_longer_child() {
        let rules = keyword_rules(ChoiceKind::LongestPriority);
        // iffy: X{iffy} versus X{if} X{fy}
        let nodes = vec![
            chosen(&rules, "X", 0, 4, 1),
            chosen(&rules, "X", 0, 2, 0),
            chosen(&rules, "X", 2, 2, 1),
        ];
        let s = rules.find("S").unwrap();
        let kept = AmbiguityResolver::new(&rules).resolve(
            &nodes,
            s,
            vec![alt(0, &[1, 2]), alt(0, &[0])],
        );
        assert_eq!(kept, vec![alt(0, &[0])]);
    }

    #[test]
    fn test_nested_priority_choice_keeps_earlier_option() {
        let rules = keyword_rules(ChoiceKind::PriorityLongest);
        let nodes = vec![
            chosen(&rules, "X", 0, 4, 1),
            chosen(&rules, "X", 0, 2, 0),
            chosen(&rules, "X", 2, 2, 1),
        ];
        let s = rules.find("S").unwrap();
        let kept = AmbiguityResolver::new(&rules).resolve(
            &nodes,
            s,
            vec![alt(0, &[0]), alt(0, &[1, 2])],
        );
        assert_eq!(kept, vec![alt(0, &[1, 2])]);
    }

    #[test]
    fn test_nested_ambiguous_choice_stays_packed() {
        let rules = keyword_rules(ChoiceKind::Ambiguous);
        let nodes = vec![
            chosen(&rules, "X", 0, 4, 1),
            chosen(&rules, "X", 0, 2, 0),
            chosen(&rules, "X", 2, 2, 1),
        ];
        let s = rules.find("S").unwrap();
        let candidates = vec![alt(0, &[0]), alt(0, &[1, 2])];
        let kept = AmbiguityResolver::new(&rules).resolve(&nodes, s, candidates.clone());
        assert_eq!(kept, candidates);
    }

    #[test]
    fn test_longest_first_ordering() {
        assert_eq!(longest_first(&[2, 1], &[1, 2]), Ordering::Less);
        assert_eq!(longest_first(&[1, 1, 1], &[1, 1, 1]), Ordering::Equal);
        assert_eq!(longest_first(&[0, 3], &[1, 2]), Ordering::Greater);
    }
}
