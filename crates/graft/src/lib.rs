//! # Graft
//!
//! A scannerless, generalised parser that grows parse trees bottom-up from
//! the input and produces a shared packed parse tree.
//!
//! ## Overview
//!
//! - **Scannerless**: terminals are literals and regular expressions matched
//!   directly against the text; there is no separate lexer.
//! - **General**: any context-free grammar is accepted, including left
//!   recursion, right recursion, nullable rules and ambiguity.
//! - **Packed output**: every way the input can be derived is kept in one
//!   [`SharedPackedParseTree`], with identical sub-trees shared and
//!   competing derivations ordered by declared preferences.
//! - **Skip rules**: whitespace and comments are matched between any two
//!   terminals and kept in the tree as skip nodes.
//! - **Embedded grammars**: a rule may be matched by parsing with another
//!   rule set, for languages nested inside languages.
//!
//! ## Quick Start
//!
//! ```rust
//! use graft::Parser;
//! use graft::rule::{ChoiceKind, PreferenceOption, RuleSetBuilder};
//!
//! let rules = RuleSetBuilder::new()
//!     .choice(
//!         "expr",
//!         ChoiceKind::LongestPriority,
//!         &[&["expr", "'+'", "expr"], &["expr", "'*'", "expr"], &["num"]],
//!     )
//!     .preference("expr", PreferenceOption::left(0, &["'+'"], 1))
//!     .preference("expr", PreferenceOption::left(1, &["'*'"], 2))
//!     .pattern("num", "[0-9]+")
//!     .pattern("WS", r"\s+")
//!     .skip("WS")
//!     .build()
//!     .expect("valid rule set");
//!
//! let parser = Parser::new(rules);
//! let output = parser.parse("expr", "1 + 2 * 3").expect("parses");
//! let tree = &output.tree;
//!
//! // `+` has the lower precedence, so it ends up at the root.
//! let top = tree.non_skip_children(tree.root());
//! assert_eq!(tree.node(top[1]).text(), Some("+"));
//! assert_eq!(tree.matched_text(), "1 + 2 * 3");
//! ```
//!
//! ## Failures
//!
//! A failed parse reports the furthest position reached and the terminals
//! that would have allowed it to continue:
//!
//! ```rust
//! use graft::{ParseError, Parser};
//! use graft::rule::RuleSetBuilder;
//!
//! let rules = RuleSetBuilder::new()
//!     .separated_list("S", "'a'", "','", 1, None)
//!     .build()
//!     .expect("valid rule set");
//! let err = Parser::new(rules).parse("S", "a,").unwrap_err();
//! let failure = err.failure().expect("parse failure");
//! assert_eq!(failure.location.position, 2);
//! assert_eq!(failure.expected, vec!["'a'".to_string()]);
//! ```
//!
//! ## Feature Flags
//!
//! - `diagnostics`: [`miette`] integration for errors.
//! - `serialize`: `serde` support for rule definitions and parse trees.
//! - `parallel`: [`Parser::parse_many`] over a rayon thread pool.

pub mod error;
pub mod input;
pub mod rule;
pub mod runtime;
pub mod sppt;

pub use error::{GrammarError, ParseError, ParseFailure};
pub use input::{InputLocation, InputText};
pub use rule::{ChoiceKind, RuleId, RuleSet, RuleSetBuilder};
pub use runtime::{InterruptHandle, ParseMetrics, ParseOutput, Parser, RuntimeConfig};
pub use sppt::{SharedPackedParseTree, SpptAlternative, SpptNode, SpptNodeId};
