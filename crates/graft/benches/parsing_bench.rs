use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use graft::rule::{ChoiceKind, PreferenceOption, RuleSetBuilder};
use graft::{Parser, RuleSet};
use std::hint::black_box;
use std::time::Duration;

fn expression_rules() -> RuleSet {
    RuleSetBuilder::new()
        .choice(
            "expr",
            ChoiceKind::Ambiguous,
            &[
                &["expr", "'+'", "expr"],
                &["expr", "'*'", "expr"],
                &["'('", "expr", "')'"],
                &["num"],
            ],
        )
        .preference("expr", PreferenceOption::left(0, &["'+'"], 1))
        .preference("expr", PreferenceOption::left(1, &["'*'"], 2))
        .pattern("num", "[0-9]+")
        .pattern("WS", r"\s+")
        .skip("WS")
        .build()
        .unwrap()
}

fn expression_input(terms: usize) -> String {
    (0..terms)
        .map(|i| if i % 3 == 0 { format!("({i} * 7)") } else { i.to_string() })
        .collect::<Vec<_>>()
        .join(" + ")
}

fn bench_full_parse(c: &mut Criterion) {
    let parser = Parser::new(expression_rules());
    let input = expression_input(8);

    c.bench_function("full_parse_small", |b| {
        b.iter(|| {
            black_box(parser.parse("expr", black_box(&input)).unwrap());
        });
    });
}

fn bench_list_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("separated_list");
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(2));

    let parser = Parser::new(
        RuleSetBuilder::new()
            .separated_list("S", "'a'", "','", 0, None)
            .build()
            .unwrap(),
    );
    for items in [10, 100, 1000] {
        let input = vec!["a"; items].join(",");
        group.bench_with_input(BenchmarkId::from_parameter(items), &input, |b, input| {
            b.iter(|| black_box(parser.parse("S", input).unwrap()));
        });
    }
    group.finish();
}

fn bench_ambiguous_forest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ambiguous_forest");
    let parser = Parser::new(
        RuleSetBuilder::new()
            .choice("S", ChoiceKind::Ambiguous, &[&["'a'"], &["S", "S"]])
            .build()
            .unwrap(),
    );
    for length in [8, 16, 32] {
        let input = "a".repeat(length);
        group.bench_with_input(BenchmarkId::from_parameter(length), &input, |b, input| {
            b.iter(|| black_box(parser.parse("S", input).unwrap().tree.count_trees()));
        });
    }
    group.finish();
}

fn bench_expected_at(c: &mut Criterion) {
    let parser = Parser::new(expression_rules());
    let input = expression_input(8);
    let position = input.len() / 2;

    c.bench_function("expected_at_midpoint", |b| {
        b.iter(|| black_box(parser.expected_at("expr", &input, black_box(position)).unwrap()));
    });
}

criterion_group!(
    benches,
    bench_full_parse,
    bench_list_scaling,
    bench_ambiguous_forest,
    bench_expected_at
);
criterion_main!(benches);
