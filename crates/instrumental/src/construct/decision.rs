//! Two-outcome decisions.

use serde::{Deserialize, Serialize};

use super::{Origin, TagSet};

/// What produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DecisionKind {
    /// Condition of an `if`, `while`, ternary or `assert`
    #[default]
    Test,
    /// A tracked comparison
    Comparison,
}

impl DecisionKind {
    /// Name used in reports
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Test => "Decision",
            Self::Comparison => "Comparison",
        }
    }
}

/// Outcomes of a single test expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BooleanDecision {
    /// Where the construct came from
    pub origin: Origin,
    /// What produced the decision
    pub kind: DecisionKind,
    when_true: TagSet,
    when_false: TagSet,
}

impl BooleanDecision {
    /// Create an empty decision
    #[must_use]
    pub fn new(origin: Origin, kind: DecisionKind) -> Self {
        Self {
            origin,
            kind,
            when_true: TagSet::new(),
            when_false: TagSet::new(),
        }
    }

    /// Record the truth value the test evaluated to
    pub fn record(&mut self, value: bool, tag: &str) {
        let bucket = if value {
            &mut self.when_true
        } else {
            &mut self.when_false
        };
        bucket.insert(tag.to_string());
    }

    /// Tags of runs where the test was true
    #[must_use]
    pub const fn was_true(&self) -> &TagSet {
        &self.when_true
    }

    /// Tags of runs where the test was false
    #[must_use]
    pub const fn was_false(&self) -> &TagSet {
        &self.when_false
    }

    /// Number of outcomes with at least one tag
    #[must_use]
    pub fn hit(&self) -> usize {
        usize::from(!self.when_true.is_empty()) + usize::from(!self.when_false.is_empty())
    }

    pub(crate) fn merge(&mut self, other: &Self) {
        self.when_true.extend(other.when_true.iter().cloned());
        self.when_false.extend(other.when_false.iter().cloned());
    }
}
