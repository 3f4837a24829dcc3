//! # Diagnostic Utilities
//!
//! Helpers for turning a [`ParseFailure`] into a readable report:
//! "did you mean" suggestions, context extraction around an offset, and a
//! caret-annotated rendering of the failing line.

use crate::error::ParseFailure;

/// Suggest the candidate most similar to `actual`, if any is close enough.
///
/// # Example
///
/// ```rust
/// use graft::error::diagnostics::did_you_mean;
///
/// let expected = vec!["identifier".to_string(), "number".to_string()];
/// assert_eq!(did_you_mean("identifer", &expected), Some("identifier".to_string()));
/// ```
#[must_use]
pub fn did_you_mean(actual: &str, expected: &[String]) -> Option<String> {
    let actual_lower = actual.to_lowercase();
    let mut best_match: Option<(&String, f64)> = None;
    let threshold = 0.6;

    for candidate in expected {
        let similarity = string_similarity(&actual_lower, &candidate.to_lowercase());
        if similarity >= threshold {
            match best_match {
                None => best_match = Some((candidate, similarity)),
                Some((_, best_sim)) if similarity > best_sim => {
                    best_match = Some((candidate, similarity));
                }
                _ => {}
            }
        }
    }

    best_match.map(|(suggestion, _)| suggestion.clone())
}

/// Up to `max_suggestions` candidates, most similar first.
#[must_use]
pub fn suggest_terminals(actual: &str, expected: &[String], max_suggestions: usize) -> Vec<String> {
    let actual_lower = actual.to_lowercase();
    let mut candidates: Vec<(&String, f64)> = expected
        .iter()
        .map(|candidate| (candidate, string_similarity(&actual_lower, &candidate.to_lowercase())))
        .filter(|(_, sim)| *sim >= 0.4)
        .collect();

    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates
        .into_iter()
        .take(max_suggestions)
        .map(|(s, _)| s.clone())
        .collect()
}

/// Text around `[start, end)`, widened by up to `context_chars` bytes per side.
///
/// Returns `(before, span, after)`, always cut on char boundaries, or `None`
/// when the span lies outside `source`.
#[must_use]
pub fn extract_context(
    source: &str,
    start: usize,
    end: usize,
    context_chars: usize,
) -> Option<(String, String, String)> {
    if start > end || end > source.len() {
        return None;
    }
    let start = floor_boundary(source, start);
    let end = floor_boundary(source, end).max(start);
    let context_start = floor_boundary(source, start.saturating_sub(context_chars));
    let context_end = ceil_boundary(source, (end + context_chars).min(source.len()));

    Some((
        source[context_start..start].to_string(),
        source[start..end].to_string(),
        source[end..context_end].to_string(),
    ))
}

/// The failure message followed by the offending line, a caret under the
/// failure column, and the expected terminals.
#[must_use]
pub fn format_failure_with_context(failure: &ParseFailure, source: &str) -> String {
    let mut result = failure.to_string();

    let position = failure.location.position.min(source.len());
    let line_start = source[..floor_boundary(source, position)]
        .rfind('\n')
        .map_or(0, |i| i + 1);
    let line_end = source[line_start..]
        .find('\n')
        .map_or(source.len(), |i| line_start + i);
    let line_text = source[line_start..line_end].trim_end_matches('\r');

    let gutter = failure.location.line.to_string();
    result.push_str(&format!("\n{:width$} |", "", width = gutter.len()));
    result.push_str(&format!("\n{gutter} | {line_text}"));
    result.push_str(&format!(
        "\n{:width$} | {:pad$}^",
        "",
        "",
        width = gutter.len(),
        pad = failure.location.column.saturating_sub(1)
    ));

    if !failure.expected.is_empty() {
        result.push_str("\n\nExpected one of: ");
        result.push_str(&failure.expected.join(", "));
    }
    if !failure.active_rules.is_empty() {
        result.push_str("\nWhile parsing: ");
        result.push_str(&failure.active_rules.join(", "));
    }
    result
}

fn floor_boundary(source: &str, mut index: usize) -> usize {
    index = index.min(source.len());
    while !source.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_boundary(source: &str, mut index: usize) -> usize {
    index = index.min(source.len());
    while !source.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Similarity in `[0.0, 1.0]` derived from the Levenshtein distance.
fn string_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let distance = levenshtein_distance(s1, s2);
    let max_len = s1.chars().count().max(s2.chars().count());
    1.0 - (distance as f64 / max_len as f64)
}

fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s2_chars: Vec<char> = s2.chars().collect();
    let mut previous: Vec<usize> = (0..=s2_chars.len()).collect();
    let mut current = vec![0; s2_chars.len() + 1];

    for (i, c1) in s1.chars().enumerate() {
        current[0] = i + 1;
        for (j, c2) in s2_chars.iter().enumerate() {
            let cost = usize::from(c1 != *c2);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[s2_chars.len()]
}
