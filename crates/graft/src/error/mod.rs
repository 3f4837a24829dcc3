//! # Error Types
//!
//! Errors raised while compiling a rule set and while parsing.
//!
//! ## Overview
//!
//! - [`GrammarError`]: the rule set is malformed (undefined references,
//!   invalid patterns, impossible list bounds) or a requested goal does not
//!   exist.
//! - [`ParseError`]: the outcome of a failed [`parse`](crate::Parser::parse)
//!   call. A parse either succeeds completely or yields exactly one of these;
//!   there is no partial success.
//!
//! Terminal mismatches during scanning are never errors on their own. They
//! are recorded by the parse graph and only surface, aggregated, as the
//! expected set of a [`ParseFailure`].
//!
//! Broken internal invariants (an inconsistent stack graph, a graft into an
//! impossible state) indicate a bug in the engine and panic instead of
//! producing a value.
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, errors integrate with [`miette`]
//! for rich error reporting.

pub mod diagnostics;

use crate::input::InputLocation;
use crate::sppt::SharedPackedParseTree;
use compact_str::CompactString;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// A rule set could not be compiled, or a goal could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum GrammarError {
    #[error("Undefined rule '{name}' referenced from '{referenced_from}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::undefined_rule)))]
    UndefinedRule {
        name: CompactString,
        referenced_from: CompactString,
    },

    #[error("Invalid pattern for terminal '{name}': {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::invalid_pattern)))]
    InvalidPattern { name: CompactString, message: String },

    #[error("Invalid bounds for list '{name}': min {min}, max {max}")]
    #[cfg_attr(
        feature = "diagnostics",
        diagnostic(
            code(grammar::invalid_list_bounds),
            help("the maximum must be at least 1 and not below the minimum")
        )
    )]
    InvalidListBounds { name: CompactString, min: u32, max: u32 },

    #[error("Rule '{name}' is declared more than once")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::duplicate_rule)))]
    DuplicateRule { name: CompactString },

    #[error("Unknown goal rule '{name}'")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::unknown_goal)))]
    UnknownGoal { name: CompactString },

    #[error("Invalid preference on '{rule}': option {option} does not exist")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(grammar::invalid_preference)))]
    InvalidPreference { rule: CompactString, option: u32 },
}

/// Why a parse did not produce a tree.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum ParseError {
    /// No derivation of the goal covers the whole input.
    #[error("{0}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::parse_failed)))]
    ParseFailed(Box<ParseFailure>),

    /// The parse was cancelled through an
    /// [`InterruptHandle`](crate::InterruptHandle).
    #[error("Parse interrupted: {message}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::interrupted)))]
    Interrupted { message: String },

    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(transparent))]
    Grammar(#[from] GrammarError),

    /// The configured season limit was reached before growth finished.
    #[error("Parse exceeded the limit of {seasons} seasons")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(parser::season_limit)))]
    SeasonLimit { seasons: usize },
}

impl ParseError {
    /// The failure report, if this is a [`ParseError::ParseFailed`].
    #[must_use]
    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            Self::ParseFailed(failure) => Some(failure),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted { .. })
    }

    /// Terminal names expected at the failure point; empty for other variants.
    #[must_use]
    pub fn expected(&self) -> &[String] {
        self.failure().map_or(&[], |failure| failure.expected.as_slice())
    }
}

/// Details of a failed parse.
#[derive(Debug, Clone)]
pub struct ParseFailure {
    /// Furthest position at which a terminal was expected but not found.
    pub location: InputLocation,
    /// Input surrounding the failure point.
    pub context: String,
    /// Names of the rules that were still being grown when parsing stopped.
    pub active_rules: Vec<String>,
    /// Names of the terminals that would have allowed parsing to continue.
    pub expected: Vec<String>,
    /// Tree for the longest prefix of the input the goal could derive.
    pub longest_match: Option<Arc<SharedPackedParseTree>>,
}

impl ParseFailure {
    /// Format a list of expected terminals as a human-readable string.
    #[must_use]
    pub fn format_expected_list(expected: &[String]) -> String {
        match expected {
            [] => "nothing".to_string(),
            [only] => only.clone(),
            [first, second] => format!("{first} or {second}"),
            [init @ .., last] => format!("{}, or {last}", init.join(", ")),
        }
    }

    /// Suggest the expected terminal closest to what was actually written.
    #[must_use]
    pub fn did_you_mean(&self, actual: &str) -> Option<String> {
        let literals: Vec<String> = self
            .expected
            .iter()
            .filter_map(|name| {
                name.strip_prefix('\'')
                    .and_then(|rest| rest.strip_suffix('\''))
                    .map(str::to_string)
            })
            .collect();
        diagnostics::did_you_mean(actual, &literals)
            .map(|suggestion| format!("Did you mean '{suggestion}'?"))
    }

    /// Render the failure with the offending source line and a caret.
    #[must_use]
    pub fn format_with_context(&self, source: &str) -> String {
        diagnostics::format_failure_with_context(self, source)
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Parse failed at line {}, column {}: expected {}",
            self.location.line,
            self.location.column,
            Self::format_expected_list(&self.expected)
        )
    }
}

impl std::error::Error for ParseFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(expected: &[&str]) -> ParseFailure {
        ParseFailure {
            location: InputLocation::new(4, 1, 5, 0),
            context: "abc ".to_string(),
            active_rules: vec!["S".to_string()],
            expected: expected.iter().map(|s| (*s).to_string()).collect(),
            longest_match: None,
        }
    }

    #[test]
    fn test_format_expected_list() {
        let one = vec!["'a'".to_string()];
        let three = vec!["'a'".to_string(), "'b'".to_string(), "ID".to_string()];
        assert_eq!(ParseFailure::format_expected_list(&[]), "nothing");
        assert_eq!(ParseFailure::format_expected_list(&one), "'a'");
        assert_eq!(ParseFailure::format_expected_list(&three), "'a', 'b', or ID");
    }

    #[test]
    fn test_display_mentions_location_and_expected() {
        let err = ParseError::ParseFailed(Box::new(failure(&["'a'", "','"])));
        let message = err.to_string();
        assert!(message.contains("line 1, column 5"));
        assert!(message.contains("'a' or ','"));
        assert_eq!(err.expected().len(), 2);
        assert!(!err.is_interrupted());
    }

    #[test]
    fn test_did_you_mean_uses_literals_only() {
        let report = failure(&["'while'", "IDENT"]);
        assert_eq!(
            report.did_you_mean("whil"),
            Some("Did you mean 'while'?".to_string())
        );
        assert_eq!(report.did_you_mean("IDENT"), None);
    }
}
