//! Construct model.
//!
//! A construct is one instrumented boolean unit of a module: an `and` chain,
//! an `or` chain, or a single two-outcome decision. Each owns an outcome
//! table mapping reachable outcomes to the set of tags (execution
//! identifiers) under which they were observed. Tables only grow: recording
//! and merging add tags, nothing removes them.

mod decision;
mod label;
mod logical;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use decision::{BooleanDecision, DecisionKind};
pub use label::Label;
pub use logical::{LogicalAnd, LogicalOr, PinTable};

use crate::pragma::Pragma;
use crate::result::{InstrumentalError, InstrumentalResult};

/// Tags recorded against one outcome
pub type TagSet = BTreeSet<String>;

const LITERAL_WARNING: &str =
    "** One or more conditions may not be reachable due to the presence of a literal in the decision";

/// Identity and source of a construct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Origin {
    /// Module the construct belongs to
    pub modulename: String,
    /// Label within the module
    pub label: Label,
    /// Rendered source of the expression
    pub source: String,
    /// Pragmas applicable to the construct's line
    #[serde(default)]
    pub pragmas: BTreeSet<Pragma>,
}

impl Origin {
    /// Create an origin without pragmas
    #[must_use]
    pub fn new(modulename: impl Into<String>, label: Label, source: impl Into<String>) -> Self {
        Self {
            modulename: modulename.into(),
            label,
            source: source.into(),
            pragmas: BTreeSet::new(),
        }
    }

    /// Attach pragmas
    #[must_use]
    pub fn with_pragmas(mut self, pragmas: BTreeSet<Pragma>) -> Self {
        self.pragmas = pragmas;
        self
    }
}

/// An instrumented boolean unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "construct")]
pub enum Construct {
    /// `a and b and ...`
    LogicalAnd(LogicalAnd),
    /// `a or b or ...`
    LogicalOr(LogicalOr),
    /// A single test or comparison
    BooleanDecision(BooleanDecision),
}

fn format_tags(tags: &TagSet, indent: usize) -> String {
    let padding = format!("\n{}", " ".repeat(indent));
    tags.iter().map(String::as_str).collect::<Vec<_>>().join(&padding)
}

impl Construct {
    /// Identity and source
    #[must_use]
    pub const fn origin(&self) -> &Origin {
        match self {
            Self::LogicalAnd(c) => &c.origin,
            Self::LogicalOr(c) => &c.origin,
            Self::BooleanDecision(c) => &c.origin,
        }
    }

    /// Owning module
    #[must_use]
    pub fn modulename(&self) -> &str {
        &self.origin().modulename
    }

    /// Label within the module
    #[must_use]
    pub const fn label(&self) -> Label {
        self.origin().label
    }

    /// Source line
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.origin().label.line()
    }

    /// Rendered source
    #[must_use]
    pub fn source(&self) -> &str {
        &self.origin().source
    }

    /// Name used in reports
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::LogicalAnd(_) => "LogicalAnd",
            Self::LogicalOr(_) => "LogicalOr",
            Self::BooleanDecision(c) => c.kind.as_str(),
        }
    }

    /// Operand count of a chain
    #[must_use]
    pub const fn pin_count(&self) -> Option<usize> {
        match self {
            Self::LogicalAnd(c) => Some(c.table().pins()),
            Self::LogicalOr(c) => Some(c.table().pins()),
            Self::BooleanDecision(_) => None,
        }
    }

    /// Whether this construct is the decision of its line
    #[must_use]
    pub const fn is_decision(&self) -> bool {
        match self {
            Self::BooleanDecision(_) => true,
            Self::LogicalAnd(_) | Self::LogicalOr(_) => self.label().is_first(),
        }
    }

    /// Operand positions holding literals
    #[must_use]
    pub fn literal_pins(&self) -> Option<&BTreeSet<usize>> {
        match self {
            Self::LogicalAnd(c) => Some(c.table().literal_pins()),
            Self::LogicalOr(c) => Some(c.table().literal_pins()),
            Self::BooleanDecision(_) => None,
        }
    }

    /// Record an operand value of a chain
    pub fn record_pin(&mut self, value: bool, pin: usize, tag: &str) -> InstrumentalResult<()> {
        match self {
            Self::LogicalAnd(c) => c.record(value, pin, tag),
            Self::LogicalOr(c) => c.record(value, pin, tag),
            Self::BooleanDecision(c) => Err(InstrumentalError::evaluation_order(
                &c.origin.modulename,
                c.origin.label,
                format!("pin {pin} recorded on a single decision"),
            )),
        }
    }

    /// Record the value of a decision
    pub fn record_decision(&mut self, value: bool, tag: &str) -> InstrumentalResult<()> {
        match self {
            Self::BooleanDecision(c) => {
                c.record(value, tag);
                Ok(())
            }
            Self::LogicalAnd(_) | Self::LogicalOr(_) => Err(InstrumentalError::evaluation_order(
                self.modulename(),
                self.label(),
                "decision recorded on an operand chain",
            )),
        }
    }

    /// Descriptions of every outcome with its tags, in outcome order
    #[must_use]
    pub fn outcomes(&self) -> Vec<(String, &TagSet)> {
        match self {
            Self::LogicalAnd(c) => c
                .table()
                .buckets()
                .map(|(bucket, tags)| (c.description(bucket), tags))
                .collect(),
            Self::LogicalOr(c) => c
                .table()
                .buckets()
                .map(|(bucket, tags)| (c.description(bucket), tags))
                .collect(),
            Self::BooleanDecision(c) => {
                vec![("T".to_string(), c.was_true()), ("F".to_string(), c.was_false())]
            }
        }
    }

    /// Number of reachable outcomes
    #[must_use]
    pub fn number_of_conditions(&self) -> usize {
        match self {
            Self::LogicalAnd(c) => c.table().len(),
            Self::LogicalOr(c) => c.table().len(),
            Self::BooleanDecision(_) => 2,
        }
    }

    /// Number of outcomes observed at least once
    #[must_use]
    pub fn number_of_conditions_hit(&self) -> usize {
        match self {
            Self::LogicalAnd(c) => c.table().hit(),
            Self::LogicalOr(c) => c.table().hit(),
            Self::BooleanDecision(c) => c.hit(),
        }
    }

    /// Number of outcomes never observed
    #[must_use]
    pub fn conditions_missed(&self) -> usize {
        self.number_of_conditions() - self.number_of_conditions_hit()
    }

    /// Tags of runs where the whole construct evaluated true
    #[must_use]
    pub fn was_true(&self) -> TagSet {
        match self {
            Self::LogicalAnd(c) => c.was_true(),
            Self::LogicalOr(c) => c.was_true(),
            Self::BooleanDecision(c) => c.was_true().clone(),
        }
    }

    /// Tags of runs where the whole construct evaluated false
    #[must_use]
    pub fn was_false(&self) -> TagSet {
        match self {
            Self::LogicalAnd(c) => c.was_false(),
            Self::LogicalOr(c) => c.was_false(),
            Self::BooleanDecision(c) => c.was_false().clone(),
        }
    }

    fn header(&self, kind: &str) -> String {
        format!(
            "{kind} -> {}:{} < {} >",
            self.modulename(),
            self.label(),
            self.source()
        )
    }

    /// Multi-line report block listing every outcome with its tags
    #[must_use]
    pub fn result(&self) -> String {
        let mut lines = vec![self.header(self.kind_name())];
        if self.literal_pins().is_some_and(|pins| !pins.is_empty()) {
            lines.push(String::new());
            lines.push(LITERAL_WARNING.to_string());
        }
        lines.push(String::new());
        for (description, tags) in self.outcomes() {
            let indent = description.len() + 5;
            lines.push(format!("{description} ==> {}", format_tags(tags, indent)));
        }
        lines.join("\n")
    }

    /// Report block of the construct viewed as a whole decision
    #[must_use]
    pub fn decision_result(&self) -> String {
        [
            self.header(DecisionKind::Test.as_str()),
            String::new(),
            format!("T ==> {}", format_tags(&self.was_true(), 6)),
            format!("F ==> {}", format_tags(&self.was_false(), 6)),
        ]
        .join("\n")
    }

    /// Whether two constructs have the same kind and pin count
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::LogicalAnd(a), Self::LogicalAnd(b)) => a.table().pins() == b.table().pins(),
            (Self::LogicalOr(a), Self::LogicalOr(b)) => a.table().pins() == b.table().pins(),
            (Self::BooleanDecision(a), Self::BooleanDecision(b)) => a.kind == b.kind,
            _ => false,
        }
    }

    /// Union another construct's outcomes into this one
    pub fn merge_outcomes(&mut self, other: &Self) -> InstrumentalResult<()> {
        let mismatch = |this: &Self, message: String| {
            InstrumentalError::construct_mismatch(this.modulename(), this.label(), message)
        };
        if !self.same_shape(other) {
            let message = format!("{} cannot merge with {}", self.kind_name(), other.kind_name());
            return Err(mismatch(self, message));
        }
        let result = match (&mut *self, other) {
            (Self::LogicalAnd(a), Self::LogicalAnd(b)) => a.table_mut().merge(b.table()),
            (Self::LogicalOr(a), Self::LogicalOr(b)) => a.table_mut().merge(b.table()),
            (Self::BooleanDecision(a), Self::BooleanDecision(b)) => {
                a.merge(b);
                Ok(())
            }
            _ => Err("construct kinds differ".to_string()),
        };
        result.map_err(|message| mismatch(self, message))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn and3() -> Construct {
        Construct::LogicalAnd(LogicalAnd::new(
            Origin::new("pkg.mod", Label::new(3, 1), "a and b and c"),
            3,
            BTreeSet::new(),
        ))
    }

    fn decision() -> Construct {
        Construct::BooleanDecision(BooleanDecision::new(
            Origin::new("pkg.mod", Label::new(5, 1), "x"),
            DecisionKind::Test,
        ))
    }

    #[test]
    fn test_result_block() {
        let mut construct = and3();
        construct.record_pin(true, 0, "alpha").unwrap();
        construct.record_pin(false, 1, "alpha").unwrap();
        construct.record_pin(false, 0, "beta").unwrap();
        construct.record_pin(false, 0, "gamma").unwrap();

        let expected = concat!(
            "LogicalAnd -> pkg.mod:3.1 < a and b and c >\n",
            "\n",
            "T T T ==> \n",
            "F * * ==> beta\n",
            "          gamma\n",
            "T F * ==> alpha\n",
            "T T F ==> ",
        );
        assert_eq!(construct.result(), expected);
    }

    #[test]
    fn test_literal_warning() {
        let construct = Construct::LogicalOr(LogicalOr::new(
            Origin::new("m", Label::new(1, 1), "a or True"),
            2,
            BTreeSet::from([1]),
        ));
        assert!(construct.result().contains("literal"));
        assert!(!and3().result().contains("literal"));
    }

    #[test]
    fn test_decision_result_views_chain_as_whole() {
        let mut construct = and3();
        construct.record_pin(false, 0, "f").unwrap();
        for pin in 0..3 {
            construct.record_pin(true, pin, "t").unwrap();
        }
        let text = construct.decision_result();
        assert!(text.starts_with("Decision -> pkg.mod:3.1"));
        assert!(text.contains("T ==> t"));
        assert!(text.contains("F ==> f"));
    }

    #[test]
    fn test_statistics() {
        let mut construct = decision();
        assert_eq!(construct.number_of_conditions(), 2);
        assert_eq!(construct.conditions_missed(), 2);
        construct.record_decision(true, "t").unwrap();
        assert_eq!(construct.number_of_conditions_hit(), 1);
        assert_eq!(construct.conditions_missed(), 1);
    }

    #[test]
    fn test_wrong_tap_kind_is_error() {
        assert!(decision().record_pin(true, 0, "t").is_err());
        assert!(and3().record_decision(true, "t").is_err());
    }

    #[test]
    fn test_merge_outcomes() {
        let mut left = and3();
        let mut right = and3();
        left.record_pin(false, 0, "l").unwrap();
        right.record_pin(false, 2, "r").unwrap();
        right.record_pin(false, 0, "r").unwrap();
        left.merge_outcomes(&right).unwrap();
        assert_eq!(left.number_of_conditions_hit(), 2);
        assert_eq!(left.was_false().len(), 2);
    }

    #[test]
    fn test_merge_rejects_different_kinds() {
        let mut left = and3();
        let err = left.merge_outcomes(&decision()).unwrap_err();
        assert!(matches!(err, InstrumentalError::ConstructMismatch { .. }));

        let mut wider = Construct::LogicalAnd(LogicalAnd::new(
            Origin::new("pkg.mod", Label::new(3, 1), "a and b"),
            2,
            BTreeSet::new(),
        ));
        assert!(wider.merge_outcomes(&and3()).is_err());
    }

    #[test]
    fn test_is_decision() {
        assert!(and3().is_decision());
        let nested = Construct::LogicalOr(LogicalOr::new(
            Origin::new("m", Label::new(3, 2), "b or c"),
            2,
            BTreeSet::new(),
        ));
        assert!(!nested.is_decision());
        assert!(decision().is_decision());
    }

    #[test]
    fn test_serde_round_trip_keeps_kind() {
        let mut construct = and3();
        construct.record_pin(false, 1, "tag").unwrap();
        let json = serde_json::to_string(&construct).unwrap();
        assert!(json.contains("\"construct\":\"LogicalAnd\""));
        let back: Construct = serde_json::from_str(&json).unwrap();
        assert_eq!(back, construct);
    }
}
