//! # Input Scanning
//!
//! Scannerless, character-level matching of terminals against the input.
//!
//! There is no token stream: the runtime asks, at a given byte offset,
//! whether one specific terminal matches there, and caches the answer.
//! [`InputText`] holds the text and a [`LineIndex`] for converting offsets
//! to line/column positions.
//!
//! Offsets are byte offsets into the UTF-8 input. Lines and columns are
//! 1-based; columns count characters, not bytes.

use crate::rule::TerminalPattern;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a piece of input lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct InputLocation {
    /// Byte offset of the first character.
    pub position: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, in characters.
    pub column: usize,
    /// Length in bytes.
    pub length: usize,
}

impl InputLocation {
    #[must_use]
    pub const fn new(position: usize, line: usize, column: usize, length: usize) -> Self {
        Self {
            position,
            line,
            column,
            length,
        }
    }

    /// Offset just past the end of this location.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.position + self.length
    }
}

impl fmt::Display for InputLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(feature = "diagnostics")]
impl From<InputLocation> for miette::SourceSpan {
    fn from(location: InputLocation) -> Self {
        (location.position, location.length).into()
    }
}

/// Byte offsets of line starts, for O(log n) offset to line lookups.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    #[must_use]
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(memchr::memchr_iter(b'\n', text.as_bytes()).map(|i| i + 1));
        Self { line_starts }
    }

    /// 1-based line and character column of `position`.
    #[must_use]
    pub fn line_col(&self, text: &str, position: usize) -> (usize, usize) {
        let position = position.min(text.len());
        let line = match self.line_starts.binary_search(&position) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let line_start = self.line_starts[line];
        let column = text
            .get(line_start..position)
            .map_or(position - line_start, |s| s.chars().count());
        (line + 1, column + 1)
    }

    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

/// The text being parsed.
#[derive(Debug, Clone)]
pub struct InputText {
    text: Arc<str>,
    line_index: LineIndex,
}

impl InputText {
    #[must_use]
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let line_index = LineIndex::new(&text);
        Self { text, line_index }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.text.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    #[must_use]
    pub fn is_end(&self, position: usize) -> bool {
        position >= self.text.len()
    }

    /// Length of the match of `pattern` at `position`, if it matches.
    ///
    /// `<EMPTY>` always matches with length zero; `<EOT>` matches with length
    /// zero only at the end of the input.
    #[must_use]
    pub fn try_match(&self, position: usize, pattern: &TerminalPattern) -> Option<usize> {
        let rest = self.text.get(position..)?;
        match pattern {
            TerminalPattern::Literal(literal) => {
                rest.starts_with(literal.as_str()).then_some(literal.len())
            }
            TerminalPattern::Pattern { regex, .. } => regex
                .find(rest)
                .filter(|found| found.start() == 0)
                .map(|found| found.end()),
            TerminalPattern::Empty => Some(0),
            TerminalPattern::EndOfText => rest.is_empty().then_some(0),
        }
    }

    /// Text in `[position, position + length)`.
    #[must_use]
    pub fn slice(&self, position: usize, length: usize) -> &str {
        self.text.get(position..position + length).unwrap_or("")
    }

    /// Location of `[position, position + length)` computed from the line index.
    #[must_use]
    pub fn location(&self, position: usize, length: usize) -> InputLocation {
        let (line, column) = self.line_index.line_col(&self.text, position);
        InputLocation::new(position, line, column, length)
    }

    /// Location of the text following `last`, whose matched text was `last_text`.
    ///
    /// Only `last_text` is scanned, so visiting leaves in document order costs
    /// time proportional to the input length overall.
    #[must_use]
    pub fn next_location(&self, last: InputLocation, last_text: &str, length: usize) -> InputLocation {
        next_location(last, last_text, length)
    }
}

/// Advance `last` over `last_text`, giving the location of the next `length` bytes.
#[must_use]
pub fn next_location(last: InputLocation, last_text: &str, length: usize) -> InputLocation {
    let position = last.position + last_text.len();
    let bytes = last_text.as_bytes();
    let newlines = memchr::memchr_iter(b'\n', bytes).count();
    if newlines == 0 {
        InputLocation::new(position, last.line, last.column + last_text.chars().count(), length)
    } else {
        let after_newline = memchr::memrchr(b'\n', bytes).map_or(0, |i| i + 1);
        let column = last_text[after_newline..].chars().count() + 1;
        InputLocation::new(position, last.line + newlines, column, length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(source: &str) -> TerminalPattern {
        TerminalPattern::Pattern {
            source: source.into(),
            regex: regex::Regex::new(&format!("^(?:{source})")).unwrap(),
        }
    }

    #[test]
    fn test_try_match_literal_and_pattern() {
        let input = InputText::new("let x1 = 42");
        assert_eq!(input.try_match(0, &TerminalPattern::Literal("let".into())), Some(3));
        assert_eq!(input.try_match(1, &TerminalPattern::Literal("let".into())), None);
        assert_eq!(input.try_match(4, &pattern("[a-z][a-z0-9]*")), Some(2));
        assert_eq!(input.try_match(9, &pattern("[0-9]+")), Some(2));
        assert_eq!(input.try_match(3, &pattern("[0-9]+")), None);
    }

    #[test]
    fn test_empty_and_end_of_text() {
        let input = InputText::new("ab");
        assert_eq!(input.try_match(1, &TerminalPattern::Empty), Some(0));
        assert_eq!(input.try_match(1, &TerminalPattern::EndOfText), None);
        assert_eq!(input.try_match(2, &TerminalPattern::EndOfText), Some(0));
        assert!(input.is_end(2));
        assert!(!input.is_end(1));
    }

    #[test]
    fn test_location_counts_lines_and_char_columns() {
        let input = InputText::new("ab\nçd\n\nx");
        assert_eq!(input.location(0, 1), InputLocation::new(0, 1, 1, 1));
        assert_eq!(input.location(3, 2), InputLocation::new(3, 2, 1, 2));
        // 'ç' is two bytes but one column.
        assert_eq!(input.location(5, 1), InputLocation::new(5, 2, 2, 1));
        assert_eq!(input.location(8, 1), InputLocation::new(8, 4, 1, 1));
    }

    #[test]
    fn test_next_location_agrees_with_line_index() {
        let text = "a bc\n  def\nç";
        let input = InputText::new(text);
        let pieces = ["a", " ", "bc", "\n  ", "def", "\n", "ç"];
        let mut location = input.location(0, pieces[0].len());
        for window in pieces.windows(2) {
            let next = input.next_location(location, window[0], window[1].len());
            assert_eq!(next, input.location(next.position, window[1].len()));
            location = next;
        }
        assert_eq!(location.end(), text.len());
    }
}
