//! Parse failures, interrupts, limits and expected-terminal queries

use graft::rule::{ChoiceKind, RuleSetBuilder};
use graft::{GrammarError, ParseError, Parser, RuleSet, RuntimeConfig};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn list_rules() -> RuleSet {
    RuleSetBuilder::new()
        .separated_list("S", "'a'", "','", 1, None)
        .build()
        .unwrap()
}

fn keyword_rules() -> RuleSet {
    RuleSetBuilder::new()
        .concatenation("S", &["'if'", "ID", "'then'", "ID"])
        .pattern("ID", "[a-z]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .build()
        .unwrap()
}

#[test]
fn test_failure_reports_furthest_position_and_expected_terminals() {
    let err = Parser::new(list_rules()).parse("S", "a,").unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.location.position, 2);
    assert_eq!((failure.location.line, failure.location.column), (1, 3));
    assert_eq!(failure.expected, vec!["'a'".to_string()]);
    assert_eq!(failure.active_rules, vec!["S".to_string()]);
    assert_eq!(failure.context, "a,");
    assert_eq!(
        err.to_string(),
        "Parse failed at line 1, column 3: expected 'a'"
    );
}

#[test]
fn test_failure_carries_longest_match() {
    let err = Parser::new(list_rules()).parse("S", "a,a;").unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.location.position, 3);
    let longest = failure.longest_match.as_ref().unwrap();
    assert_eq!(longest.matched_text(), "a,a");
    assert_eq!(longest.to_string_tree(), "S { 'a' ',' 'a' }");
}

#[test]
fn test_trailing_input_expects_end_of_text() {
    let rules = RuleSetBuilder::new()
        .concatenation("S", &["'a'"])
        .build()
        .unwrap();
    let err = Parser::new(rules).parse("S", "ab").unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.location.position, 1);
    assert_eq!(failure.expected, vec!["<EOT>".to_string()]);
}

#[test]
fn test_failure_formatting_with_context() {
    let source = "if a\nthen 1";
    let err = Parser::new(keyword_rules()).parse("S", source).unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.location.line, 2);
    assert_eq!(failure.location.column, 6);

    let report = failure.format_with_context(source);
    assert!(report.contains("2 | then 1"));
    assert!(report.contains("^"));
    assert!(report.contains("Expected one of: ID"));
}

#[test]
fn test_did_you_mean_for_misspelled_keyword() {
    let err = Parser::new(keyword_rules()).parse("S", "if a than b").unwrap_err();
    let failure = err.failure().unwrap();
    assert_eq!(failure.expected, vec!["'then'".to_string()]);
    assert_eq!(
        failure.did_you_mean("than"),
        Some("Did you mean 'then'?".to_string())
    );
}

#[test]
fn test_unknown_goal_is_a_grammar_error() {
    let err = Parser::new(list_rules()).parse("Missing", "a").unwrap_err();
    assert!(matches!(
        err,
        ParseError::Grammar(GrammarError::UnknownGoal { ref name }) if name.as_str() == "Missing"
    ));
    assert!(err.expected().is_empty());
}

#[test]
fn test_season_limit() {
    let config = RuntimeConfig {
        max_seasons: Some(2),
        ..RuntimeConfig::default()
    };
    let err = Parser::with_config(list_rules(), config)
        .parse("S", "a,a,a")
        .unwrap_err();
    assert!(matches!(err, ParseError::SeasonLimit { seasons: 2 }));
}

#[test]
fn test_interrupt_stops_a_running_parse() {
    let rules = RuleSetBuilder::new()
        .choice("S", ChoiceKind::Ambiguous, &[&["'a'"], &["S", "S"]])
        .build()
        .unwrap();
    let parser = Arc::new(Parser::new(rules));
    let handle = parser.interrupt_handle();
    let done = Arc::new(AtomicBool::new(false));

    let interrupter = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Acquire) {
                handle.interrupt("stopped by test");
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    let input = "a".repeat(400);
    let result = parser.parse("S", &input);
    done.store(true, Ordering::Release);
    interrupter.join().unwrap();

    let err = result.unwrap_err();
    assert!(err.is_interrupted());
    assert!(err.expected().is_empty());
    assert!(matches!(err, ParseError::Interrupted { ref message } if message == "stopped by test"));
}

#[test]
fn test_expected_at_list_positions() {
    let parser = Parser::new(list_rules());
    assert_eq!(parser.expected_at("S", "a,a", 0).unwrap(), vec!["'a'"]);
    assert_eq!(parser.expected_at("S", "a,a", 1).unwrap(), vec!["','"]);
    assert_eq!(parser.expected_at("S", "a,a", 2).unwrap(), vec!["'a'"]);
    assert_eq!(parser.expected_at("S", "a,a", 3).unwrap(), vec!["','"]);
}

#[test]
fn test_expected_at_after_skip() {
    let parser = Parser::new(keyword_rules());
    assert_eq!(
        parser.expected_at("S", "if a then b", 5).unwrap(),
        vec!["'then'"]
    );
    assert_eq!(parser.expected_at("S", "if a then b", 3).unwrap(), vec!["ID"]);
}

#[test]
fn test_expected_at_inside_a_token_is_empty() {
    let parser = Parser::new(keyword_rules());
    assert!(parser.expected_at("S", "if a then b", 1).unwrap().is_empty());
    assert!(parser.expected_at("S", "if a then b", 99).unwrap().is_empty());
}
