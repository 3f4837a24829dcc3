use super::RuleId;
use compact_str::CompactString;
#[cfg(feature = "serialize")]
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Which side of an operator chain binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum Associativity {
    /// `a - b - c` groups as `(a - b) - c`.
    #[default]
    Left,
    /// `a ^ b ^ c` groups as `a ^ (b ^ c)`.
    Right,
    /// No grouping preference; only precedence applies.
    None,
}

/// An explicit preference declared on one option of a rule.
///
/// When several derivations of the same rule cover the same span, the one
/// whose top-level operator has the *lowest* precedence becomes the root,
/// so operators with higher precedence end up nested deeper and bind
/// tighter. Equal precedence is resolved by associativity.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct PreferenceOption {
    /// Index of the option (alternative) this preference applies to.
    pub option: u32,
    /// Names of the terminals acting as the option's operator.
    pub operators: Vec<CompactString>,
    pub precedence: u32,
    pub associativity: Associativity,
}

impl PreferenceOption {
    #[must_use]
    pub fn new(option: u32, operators: &[&str], precedence: u32, associativity: Associativity) -> Self {
        Self {
            option,
            operators: operators.iter().map(|op| CompactString::from(*op)).collect(),
            precedence,
            associativity,
        }
    }

    #[must_use]
    pub fn left(option: u32, operators: &[&str], precedence: u32) -> Self {
        Self::new(option, operators, precedence, Associativity::Left)
    }

    #[must_use]
    pub fn right(option: u32, operators: &[&str], precedence: u32) -> Self {
        Self::new(option, operators, precedence, Associativity::Right)
    }
}

/// A [`PreferenceOption`] with operator names resolved to rule ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreferenceRule {
    pub option: u32,
    pub operators: SmallVec<[RuleId; 2]>,
    pub precedence: u32,
    pub associativity: Associativity,
}

impl PreferenceRule {
    #[must_use]
    pub fn matches(&self, option: u32, operator: RuleId) -> bool {
        self.option == option && self.operators.contains(&operator)
    }
}
