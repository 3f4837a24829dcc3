#![no_main]
use graft::Parser;
use graft::rule::RuleSetBuilder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&position, rest)) = data.split_first() else {
        return;
    };
    let Ok(input) = std::str::from_utf8(rest) else {
        return;
    };
    let rules = RuleSetBuilder::new()
        .concatenation("S", &["'if'", "ID", "'then'", "LIST"])
        .separated_list("LIST", "ID", "','", 1, None)
        .pattern("ID", "[a-z]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .build()
        .unwrap();
    let expected = Parser::new(rules)
        .expected_at("S", input, usize::from(position))
        .unwrap();
    assert!(expected.windows(2).all(|pair| pair[0] < pair[1]));
});
