use super::analysis::RuleAnalysis;
use super::preference::PreferenceRule;
use super::{
    ChoiceKind, EMPTY_RULE_NAME, END_OF_TEXT_RULE_NAME, EmbeddedGrammar, FastMap, GOAL_RULE_PREFIX,
    PreferenceOption, RuleBody, RuleId, RuleItem, RuleSet, RuntimeRule, SKIP_CHOICE_RULE_NAME,
    SKIP_RULE_NAME, TerminalPattern,
};
use crate::error::GrammarError;
use compact_str::{CompactString, format_compact};
use lasso::Rodeo;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

#[derive(Debug, Clone)]
enum DeclBody {
    Literal(CompactString),
    Pattern(CompactString),
    Concatenation(Vec<CompactString>),
    Choice {
        kind: ChoiceKind,
        alternatives: Vec<Vec<CompactString>>,
    },
    Optional(CompactString),
    List {
        item: CompactString,
        min: u32,
        max: Option<u32>,
    },
    SeparatedList {
        item: CompactString,
        separator: CompactString,
        min: u32,
        max: Option<u32>,
    },
    Embedded {
        rule_set: Arc<RuleSet>,
        goal: CompactString,
    },
}

#[derive(Debug, Clone)]
struct RuleDecl {
    name: CompactString,
    body: DeclBody,
}

/// Builder for a [`RuleSet`].
///
/// Rules reference each other by name and may be declared in any order.
/// A quoted item such as `"'+'"` that is not declared explicitly becomes a
/// literal terminal automatically.
///
/// # Example
///
/// ```rust
/// use graft::rule::{ChoiceKind, RuleSetBuilder};
///
/// let rules = RuleSetBuilder::new()
///     .choice("expr", ChoiceKind::LongestPriority, &[&["expr", "'+'", "num"], &["num"]])
///     .pattern("num", "[0-9]+")
///     .pattern("WS", r"\s+")
///     .skip("WS")
///     .build()
///     .expect("valid rule set");
/// assert!(rules.find("'+'").is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    decls: Vec<RuleDecl>,
    skip: Vec<CompactString>,
    preferences: Vec<(CompactString, PreferenceOption)>,
}

fn names(items: &[&str]) -> Vec<CompactString> {
    items.iter().map(|item| CompactString::from(*item)).collect()
}

fn literal_text(name: &str) -> Option<&str> {
    name.strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
}

impl RuleSetBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn declare(mut self, name: &str, body: DeclBody) -> Self {
        self.decls.push(RuleDecl {
            name: name.into(),
            body,
        });
        self
    }

    /// Declare a literal terminal, named by its quoted text (`'text'`).
    #[must_use]
    pub fn literal(self, text: &str) -> Self {
        let name = format_compact!("'{text}'");
        self.declare(&name, DeclBody::Literal(text.into()))
    }

    /// Declare a regular-expression terminal.
    #[must_use]
    pub fn pattern(self, name: &str, regex: &str) -> Self {
        self.declare(name, DeclBody::Pattern(regex.into()))
    }

    #[must_use]
    pub fn concatenation(self, name: &str, items: &[&str]) -> Self {
        self.declare(name, DeclBody::Concatenation(names(items)))
    }

    /// Declare a choice; the first alternative has the highest priority.
    #[must_use]
    pub fn choice(self, name: &str, kind: ChoiceKind, alternatives: &[&[&str]]) -> Self {
        let alternatives = alternatives.iter().map(|alt| names(alt)).collect();
        self.declare(name, DeclBody::Choice { kind, alternatives })
    }

    #[must_use]
    pub fn optional(self, name: &str, item: &str) -> Self {
        self.declare(name, DeclBody::Optional(item.into()))
    }

    /// Declare a list of `min..=max` items; `max` of `None` is unbounded.
    #[must_use]
    pub fn list(self, name: &str, item: &str, min: u32, max: Option<u32>) -> Self {
        self.declare(
            name,
            DeclBody::List {
                item: item.into(),
                min,
                max,
            },
        )
    }

    /// Declare a list of `min..=max` items separated by `separator`.
    #[must_use]
    pub fn separated_list(
        self,
        name: &str,
        item: &str,
        separator: &str,
        min: u32,
        max: Option<u32>,
    ) -> Self {
        self.declare(
            name,
            DeclBody::SeparatedList {
                item: item.into(),
                separator: separator.into(),
                min,
                max,
            },
        )
    }

    /// Declare a rule matched by parsing `goal` of another rule set.
    #[must_use]
    pub fn embedded(self, name: &str, rule_set: Arc<RuleSet>, goal: &str) -> Self {
        self.declare(
            name,
            DeclBody::Embedded {
                rule_set,
                goal: goal.into(),
            },
        )
    }

    /// Mark a declared rule as skip (whitespace, comments).
    #[must_use]
    pub fn skip(mut self, name: &str) -> Self {
        self.skip.push(name.into());
        self
    }

    #[must_use]
    pub fn preference(mut self, rule: &str, preference: PreferenceOption) -> Self {
        self.preferences.push((rule.into(), preference));
        self
    }

    /// Resolve names and compile the rule set.
    ///
    /// # Errors
    ///
    /// Returns a [`GrammarError`] for duplicate declarations, references to
    /// undeclared rules, invalid regular expressions, impossible list bounds,
    /// unknown embedded goals, and preferences naming a missing option.
    pub fn build(self) -> Result<RuleSet, GrammarError> {
        let mut compiler = Compiler::default();
        let empty = compiler.add(EMPTY_RULE_NAME, RuleBody::Terminal(TerminalPattern::Empty));
        let end_of_text = compiler.add(
            END_OF_TEXT_RULE_NAME,
            RuleBody::Terminal(TerminalPattern::EndOfText),
        );

        // Ids first, bodies once every name is known.
        let mut declared: Vec<(RuleId, &RuleDecl)> = Vec::with_capacity(self.decls.len());
        for decl in &self.decls {
            if let Some(existing) = compiler.lookup(&decl.name) {
                let same_literal = matches!(
                    (&decl.body, &compiler.rules[existing.index()].body),
                    (DeclBody::Literal(_), RuleBody::Terminal(TerminalPattern::Literal(_)))
                );
                if same_literal {
                    continue;
                }
                return Err(GrammarError::DuplicateRule {
                    name: decl.name.clone(),
                });
            }
            let placeholder = match &decl.body {
                DeclBody::Literal(text) => TerminalPattern::Literal(text.clone()),
                _ => TerminalPattern::Empty,
            };
            let id = compiler.add(&decl.name, RuleBody::Terminal(placeholder));
            declared.push((id, decl));
        }

        for (id, decl) in declared {
            let from = decl.name.as_str();
            let body = match &decl.body {
                DeclBody::Literal(_) => continue,
                DeclBody::Pattern(source) => {
                    let regex = regex::Regex::new(&format!("^(?:{source})")).map_err(|err| {
                        GrammarError::InvalidPattern {
                            name: decl.name.clone(),
                            message: err.to_string(),
                        }
                    })?;
                    RuleBody::Terminal(TerminalPattern::Pattern {
                        source: source.clone(),
                        regex,
                    })
                }
                DeclBody::Concatenation(items) => RuleBody::NonTerminal(RuleItem::Concatenation(
                    compiler.sequence(items, from, empty)?,
                )),
                DeclBody::Choice { kind, alternatives } => {
                    let mut resolved = Vec::with_capacity(alternatives.len().max(1));
                    for alt in alternatives {
                        resolved.push(compiler.sequence(alt, from, empty)?);
                    }
                    if resolved.is_empty() {
                        resolved.push(smallvec![empty]);
                    }
                    RuleBody::NonTerminal(RuleItem::Choice {
                        kind: *kind,
                        alternatives: resolved,
                    })
                }
                DeclBody::Optional(item) => {
                    RuleBody::NonTerminal(RuleItem::Optional(compiler.resolve(item, from)?))
                }
                DeclBody::List { item, min, max } => {
                    check_bounds(&decl.name, *min, *max)?;
                    RuleBody::NonTerminal(RuleItem::List {
                        item: compiler.resolve(item, from)?,
                        min: *min,
                        max: *max,
                    })
                }
                DeclBody::SeparatedList {
                    item,
                    separator,
                    min,
                    max,
                } => {
                    check_bounds(&decl.name, *min, *max)?;
                    RuleBody::NonTerminal(RuleItem::SeparatedList {
                        item: compiler.resolve(item, from)?,
                        separator: compiler.resolve(separator, from)?,
                        min: *min,
                        max: *max,
                    })
                }
                DeclBody::Embedded { rule_set, goal } => RuleBody::Embedded(EmbeddedGrammar {
                    goal: rule_set.goal_rule(goal)?,
                    rule_set: Arc::clone(rule_set),
                }),
            };
            compiler.rules[id.index()].body = body;
        }

        let mut skip_rules = Vec::with_capacity(self.skip.len());
        for name in &self.skip {
            let id = compiler.resolve(name, SKIP_RULE_NAME)?;
            compiler.rules[id.index()].is_skip = true;
            if !skip_rules.contains(&id) {
                skip_rules.push(id);
            }
        }
        let skip = if skip_rules.is_empty() {
            None
        } else {
            let alternatives = skip_rules.iter().map(|id| smallvec![*id]).collect();
            let choice = compiler.add(
                SKIP_CHOICE_RULE_NAME,
                RuleBody::NonTerminal(RuleItem::Choice {
                    kind: ChoiceKind::LongestPriority,
                    alternatives,
                }),
            );
            let list = compiler.add(
                SKIP_RULE_NAME,
                RuleBody::NonTerminal(RuleItem::List {
                    item: choice,
                    min: 1,
                    max: None,
                }),
            );
            compiler.rules[choice.index()].is_skip = true;
            compiler.rules[list.index()].is_skip = true;
            Some(list)
        };

        let mut preference_specs = Vec::with_capacity(self.preferences.len());
        for (rule_name, preference) in &self.preferences {
            let rule = compiler.resolve(rule_name, rule_name)?;
            let operators = preference
                .operators
                .iter()
                .map(|op| compiler.resolve(op, rule_name))
                .collect::<Result<SmallVec<[RuleId; 2]>, _>>()?;
            let resolved = PreferenceRule {
                option: preference.option,
                operators,
                precedence: preference.precedence,
                associativity: preference.associativity,
            };
            preference_specs.push((rule_name, rule, resolved));
        }

        // Goals last so every user rule, literal and skip list gets one.
        let mut goals: FastMap<RuleId, RuleId> = FastMap::default();
        let targets: Vec<RuleId> = compiler
            .rules
            .iter()
            .map(|rule| rule.id)
            .filter(|id| *id != empty && *id != end_of_text)
            .collect();
        for target in targets {
            let name = format_compact!(
                "{GOAL_RULE_PREFIX}{}",
                compiler.interner.resolve(&compiler.rules[target.index()].name)
            );
            let goal = compiler.add(&name, RuleBody::Goal(target));
            goals.insert(target, goal);
        }

        let mut rule_set = RuleSet {
            rules: compiler.rules,
            names: compiler.interner.into_reader(),
            by_name: compiler.by_name,
            goals,
            empty,
            end_of_text,
            skip,
            preferences: FastMap::default(),
            analysis: RuleAnalysis::default(),
        };

        for (rule_name, rule, preference) in preference_specs {
            if preference.option >= rule_set.option_count(rule) {
                return Err(GrammarError::InvalidPreference {
                    rule: rule_name.clone(),
                    option: preference.option,
                });
            }
            rule_set.preferences.entry(rule).or_default().push(preference);
        }

        rule_set.analysis = RuleAnalysis::compute(&rule_set);
        Ok(rule_set)
    }
}

/// Rules under construction, with interned names.
#[derive(Default)]
struct Compiler {
    rules: Vec<RuntimeRule>,
    interner: Rodeo,
    by_name: FastMap<lasso::Spur, RuleId>,
}

impl Compiler {
    fn lookup(&self, name: &str) -> Option<RuleId> {
        self.interner
            .get(name)
            .and_then(|spur| self.by_name.get(&spur).copied())
    }

    /// Append a rule; only user-visible names are registered for lookup.
    fn add(&mut self, name: &str, body: RuleBody) -> RuleId {
        let id = RuleId::new(u32::try_from(self.rules.len()).unwrap_or(u32::MAX));
        let spur = self.interner.get_or_intern(name);
        self.by_name.entry(spur).or_insert(id);
        self.rules.push(RuntimeRule {
            id,
            name: spur,
            body,
            is_skip: false,
        });
        id
    }

    fn resolve(&mut self, name: &str, from: &str) -> Result<RuleId, GrammarError> {
        if let Some(id) = self.lookup(name) {
            return Ok(id);
        }
        match literal_text(name) {
            Some(text) if !text.is_empty() => {
                let body = RuleBody::Terminal(TerminalPattern::Literal(text.into()));
                Ok(self.add(name, body))
            }
            _ => Err(GrammarError::UndefinedRule {
                name: name.into(),
                referenced_from: from.into(),
            }),
        }
    }

    fn sequence(
        &mut self,
        items: &[CompactString],
        from: &str,
        empty: RuleId,
    ) -> Result<SmallVec<[RuleId; 4]>, GrammarError> {
        if items.is_empty() {
            return Ok(smallvec![empty]);
        }
        items.iter().map(|item| self.resolve(item, from)).collect()
    }
}

fn check_bounds(name: &CompactString, min: u32, max: Option<u32>) -> Result<(), GrammarError> {
    match max {
        Some(max) if max == 0 || max < min => Err(GrammarError::InvalidListBounds {
            name: name.clone(),
            min,
            max,
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Associativity, RuleKind};

    #[test]
    fn test_literals_are_declared_on_first_use() {
        let rules = RuleSetBuilder::new()
            .concatenation("S", &["'a'", "B"])
            .literal("b")
            .concatenation("B", &["'b'"])
            .build()
            .unwrap();
        let a = rules.find("'a'").unwrap();
        assert_eq!(rules.rule(a).kind(), RuleKind::Terminal);
        assert!(matches!(
            rules.rule(a).terminal_pattern(),
            Some(TerminalPattern::Literal(text)) if text.as_str() == "a"
        ));
        assert!(rules.find("'b'").is_some());
    }

    #[test]
    fn test_undefined_rule_is_reported() {
        let err = RuleSetBuilder::new()
            .concatenation("S", &["Missing"])
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            GrammarError::UndefinedRule {
                name: "Missing".into(),
                referenced_from: "S".into()
            }
        );
    }

    #[test]
    fn test_duplicate_and_invalid_declarations() {
        let duplicate = RuleSetBuilder::new()
            .concatenation("S", &["'a'"])
            .optional("S", "'a'")
            .build();
        assert!(matches!(duplicate, Err(GrammarError::DuplicateRule { .. })));

        let pattern = RuleSetBuilder::new().pattern("N", "[0-9").build();
        assert!(matches!(pattern, Err(GrammarError::InvalidPattern { .. })));

        let bounds = RuleSetBuilder::new().list("L", "'a'", 3, Some(2)).build();
        assert!(matches!(bounds, Err(GrammarError::InvalidListBounds { min: 3, max: 2, .. })));

        let preference = RuleSetBuilder::new()
            .concatenation("S", &["'a'"])
            .preference("S", PreferenceOption::new(4, &["'a'"], 1, Associativity::Left))
            .build();
        assert!(matches!(preference, Err(GrammarError::InvalidPreference { option: 4, .. })));
    }

    #[test]
    fn test_skip_rules_are_wrapped_in_generated_list() {
        let rules = RuleSetBuilder::new()
            .concatenation("S", &["'a'"])
            .pattern("WS", r"\s+")
            .pattern("COMMENT", r"//[^\n]*")
            .skip("WS")
            .skip("COMMENT")
            .build()
            .unwrap();
        let skip = rules.skip_rule().unwrap();
        assert_eq!(rules.name(skip), SKIP_RULE_NAME);
        assert!(rules.rule(skip).is_skip());
        assert_eq!(rules.rule(rules.find("WS").unwrap()).kind(), RuleKind::Skip);
        let goal = rules.skip_goal().unwrap();
        assert_eq!(rules.goal_target(goal), Some(skip));
    }

    #[test]
    fn test_empty_sequences_match_empty() {
        let rules = RuleSetBuilder::new()
            .concatenation("E", &[])
            .build()
            .unwrap();
        let e = rules.find("E").unwrap();
        assert!(rules.is_nullable(e));
        assert_eq!(rules.first_terminals(e), &[rules.empty_rule()]);
    }

    #[test]
    fn test_embedded_goal_must_exist() {
        let inner = Arc::new(
            RuleSetBuilder::new()
                .concatenation("X", &["'x'"])
                .build()
                .unwrap(),
        );
        let ok = RuleSetBuilder::new()
            .embedded("E", Arc::clone(&inner), "X")
            .build()
            .unwrap();
        assert_eq!(ok.rule(ok.find("E").unwrap()).kind(), RuleKind::Embedded);

        let missing = RuleSetBuilder::new().embedded("E", inner, "Y").build();
        assert!(matches!(missing, Err(GrammarError::UnknownGoal { .. })));
    }
}
