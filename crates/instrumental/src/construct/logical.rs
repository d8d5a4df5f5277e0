//! Outcome tables for `and` / `or` chains.
//!
//! A chain of `n` operands short-circuits, so only `n + 1` operand
//! combinations are observable. Each gets one bucket:
//!
//! | bucket      | `and`                                   | `or`                                   |
//! |-------------|-----------------------------------------|----------------------------------------|
//! | `0`         | every operand true                      | operand 0 true                         |
//! | `k < n`     | operand `k - 1` first false (`k >= 1`)  | operand `k` first true                 |
//! | `n`         | only the last operand false             | every operand false                    |

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Origin, TagSet};
use crate::result::{InstrumentalError, InstrumentalResult};

/// Bucket storage shared by both chain kinds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinTable {
    pins: usize,
    literal_pins: BTreeSet<usize>,
    conditions: Vec<TagSet>,
}

impl PinTable {
    /// Create an empty table for `pins` operands
    #[must_use]
    pub fn new(pins: usize, literal_pins: BTreeSet<usize>) -> Self {
        Self {
            pins,
            literal_pins,
            conditions: vec![TagSet::new(); pins + 1],
        }
    }

    /// Number of operands
    #[must_use]
    pub const fn pins(&self) -> usize {
        self.pins
    }

    /// Operand positions holding literal constants
    #[must_use]
    pub const fn literal_pins(&self) -> &BTreeSet<usize> {
        &self.literal_pins
    }

    /// Tags recorded against a bucket
    #[must_use]
    pub fn tags(&self, bucket: usize) -> Option<&TagSet> {
        self.conditions.get(bucket)
    }

    /// Buckets with their tags, in bucket order
    pub fn buckets(&self) -> impl Iterator<Item = (usize, &TagSet)> + '_ {
        self.conditions.iter().enumerate()
    }

    /// Number of buckets
    #[must_use]
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Whether the table has no buckets
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Number of buckets with at least one tag
    #[must_use]
    pub fn hit(&self) -> usize {
        self.conditions.iter().filter(|tags| !tags.is_empty()).count()
    }

    fn insert(&mut self, bucket: usize, tag: &str) {
        if let Some(tags) = self.conditions.get_mut(bucket) {
            tags.insert(tag.to_string());
        }
    }

    fn union(&self, buckets: impl Iterator<Item = usize>) -> TagSet {
        buckets
            .filter_map(|bucket| self.conditions.get(bucket))
            .flat_map(|tags| tags.iter().cloned())
            .collect()
    }

    fn check_pin(&self, origin: &Origin, pin: usize) -> InstrumentalResult<()> {
        if pin < self.pins {
            Ok(())
        } else {
            Err(InstrumentalError::evaluation_order(
                &origin.modulename,
                origin.label,
                format!("pin {pin} recorded on a chain of {} operands", self.pins),
            ))
        }
    }

    /// Union another table into this one
    pub fn merge(&mut self, other: &Self) -> Result<(), String> {
        if self.pins != other.pins {
            return Err(format!(
                "pin count differs ({} != {})",
                self.pins, other.pins
            ));
        }
        for (mine, theirs) in self.conditions.iter_mut().zip(&other.conditions) {
            mine.extend(theirs.iter().cloned());
        }
        self.literal_pins.extend(other.literal_pins.iter().copied());
        Ok(())
    }
}

fn pattern(symbols: impl IntoIterator<Item = char>) -> String {
    let mut out = String::new();
    for symbol in symbols {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(symbol);
    }
    out
}

/// Outcomes of an `and` chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalAnd {
    /// Where the construct came from
    pub origin: Origin,
    table: PinTable,
}

impl LogicalAnd {
    /// Create an empty construct
    #[must_use]
    pub fn new(origin: Origin, pins: usize, literal_pins: BTreeSet<usize>) -> Self {
        Self {
            origin,
            table: PinTable::new(pins, literal_pins),
        }
    }

    /// Bucket table
    #[must_use]
    pub const fn table(&self) -> &PinTable {
        &self.table
    }

    /// Record the truth value seen for an operand
    pub fn record(&mut self, value: bool, pin: usize, tag: &str) -> InstrumentalResult<()> {
        self.table.check_pin(&self.origin, pin)?;
        let last = self.table.pins - 1;
        if pin < last {
            if !value {
                self.table.insert(pin + 1, tag);
            }
        } else if value {
            self.table.insert(0, tag);
        } else {
            self.table.insert(self.table.pins, tag);
        }
        Ok(())
    }

    /// Per-operand pattern of a bucket, e.g. `T F *`
    #[must_use]
    pub fn description(&self, bucket: usize) -> String {
        let pins = self.table.pins;
        if bucket == 0 {
            return pattern(std::iter::repeat('T').take(pins));
        }
        let trues = bucket - 1;
        let rest = pins.saturating_sub(bucket);
        pattern(
            std::iter::repeat('T')
                .take(trues)
                .chain(std::iter::once('F'))
                .chain(std::iter::repeat('*').take(rest)),
        )
    }

    /// Tags of runs where the chain was true
    #[must_use]
    pub fn was_true(&self) -> TagSet {
        self.table.union(std::iter::once(0))
    }

    /// Tags of runs where the chain was false
    #[must_use]
    pub fn was_false(&self) -> TagSet {
        self.table.union(1..=self.table.pins)
    }

    pub(crate) fn table_mut(&mut self) -> &mut PinTable {
        &mut self.table
    }
}

/// Outcomes of an `or` chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalOr {
    /// Where the construct came from
    pub origin: Origin,
    table: PinTable,
}

impl LogicalOr {
    /// Create an empty construct
    #[must_use]
    pub fn new(origin: Origin, pins: usize, literal_pins: BTreeSet<usize>) -> Self {
        Self {
            origin,
            table: PinTable::new(pins, literal_pins),
        }
    }

    /// Bucket table
    #[must_use]
    pub const fn table(&self) -> &PinTable {
        &self.table
    }

    /// Record the truth value seen for an operand
    pub fn record(&mut self, value: bool, pin: usize, tag: &str) -> InstrumentalResult<()> {
        self.table.check_pin(&self.origin, pin)?;
        let last = self.table.pins - 1;
        if pin < last {
            if value {
                self.table.insert(pin, tag);
            }
        } else if value {
            self.table.insert(pin, tag);
        } else {
            self.table.insert(self.table.pins, tag);
        }
        Ok(())
    }

    /// Per-operand pattern of a bucket, e.g. `F T *`
    #[must_use]
    pub fn description(&self, bucket: usize) -> String {
        let pins = self.table.pins;
        if bucket >= pins {
            return pattern(std::iter::repeat('F').take(pins));
        }
        pattern(
            std::iter::repeat('F')
                .take(bucket)
                .chain(std::iter::once('T'))
                .chain(std::iter::repeat('*').take(pins - bucket - 1)),
        )
    }

    /// Tags of runs where the chain was true
    #[must_use]
    pub fn was_true(&self) -> TagSet {
        self.table.union(0..self.table.pins)
    }

    /// Tags of runs where the chain was false
    #[must_use]
    pub fn was_false(&self) -> TagSet {
        self.table.union(std::iter::once(self.table.pins))
    }

    pub(crate) fn table_mut(&mut self) -> &mut PinTable {
        &mut self.table
    }
}
