use std::time::Duration;

/// Tuning knobs for the runtime parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Stop as soon as one goal spans the whole input instead of growing
    /// until no head can grow.
    ///
    /// Only valid for grammars known to be unambiguous: with this set, later
    /// derivations of the same input are never discovered.
    pub stop_at_first_goal: bool,
    /// Verify the stack graph's reference counts after every season.
    pub check_invariants: bool,
    /// Discard new growing nodes whose expected terminals cannot match at
    /// their next input position.
    pub lookahead_filtering: bool,
    /// Abort with [`ParseError::SeasonLimit`](crate::ParseError::SeasonLimit)
    /// after this many seasons.
    pub max_seasons: Option<usize>,
    /// Bytes of input captured on each side of a failure position.
    pub context_window: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stop_at_first_goal: false,
            check_invariants: cfg!(debug_assertions),
            lookahead_filtering: true,
            max_seasons: None,
            context_window: 20,
        }
    }
}

impl RuntimeConfig {
    /// Configuration for nested longest-match parses (skip runs, embedded
    /// grammars): always exhaustive and never limited on its own.
    #[must_use]
    pub(crate) fn nested(&self) -> Self {
        Self {
            stop_at_first_goal: false,
            max_seasons: None,
            ..self.clone()
        }
    }
}

/// Counters collected during one parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseMetrics {
    /// Number of distinct input positions processed.
    pub seasons: usize,
    /// Stack nodes created, leaves included.
    pub nodes_created: usize,
    /// Largest number of queued heads at a season boundary.
    pub max_heads: usize,
    /// Terminal match attempts against the input.
    pub leaves_scanned: usize,
    pub parse_time: Duration,
}
