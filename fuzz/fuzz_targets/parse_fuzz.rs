#![no_main]
use graft::rule::{ChoiceKind, PreferenceOption, RuleSetBuilder};
use graft::{Parser, RuntimeConfig};
use libfuzzer_sys::fuzz_target;
use std::sync::OnceLock;

fn parser() -> &'static Parser {
    static PARSER: OnceLock<Parser> = OnceLock::new();
    PARSER.get_or_init(|| {
        let rules = RuleSetBuilder::new()
            .choice(
                "E",
                ChoiceKind::Ambiguous,
                &[&["E", "'+'", "E"], &["E", "'*'", "E"], &["'('", "E", "')'"], &["NUM"], &["E", "E"]],
            )
            .preference("E", PreferenceOption::left(0, &["'+'"], 1))
            .preference("E", PreferenceOption::left(1, &["'*'"], 2))
            .pattern("NUM", "[0-9]+")
            .pattern("WS", r"\s+")
            .skip("WS")
            .build()
            .unwrap();
        let config = RuntimeConfig {
            max_seasons: Some(4096),
            check_invariants: true,
            ..RuntimeConfig::default()
        };
        Parser::with_config(rules, config)
    })
}

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    if input.len() > 256 {
        return;
    }
    match parser().parse("E", input) {
        Ok(output) => assert_eq!(output.tree.matched_text(), input),
        Err(err) => {
            if let Some(failure) = err.failure() {
                assert!(failure.location.position <= input.len());
            }
        }
    }
});
