//! Construct labels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::result::InstrumentalError;

/// Identifies the n-th construct discovered on a source line.
///
/// Rendered `"<line>.<index>"` with indices starting at 1. Labels depend only
/// on the source text and the traversal order, so runs from separate
/// processes can be merged by label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    line: u32,
    index: u32,
}

impl Label {
    /// Create a label
    #[inline]
    #[must_use]
    pub const fn new(line: u32, index: u32) -> Self {
        Self { line, index }
    }

    /// Source line
    #[inline]
    #[must_use]
    pub const fn line(self) -> u32 {
        self.line
    }

    /// Position among the constructs of its line
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Whether this is the outermost construct of its line
    #[inline]
    #[must_use]
    pub const fn is_first(self) -> bool {
        self.index == 1
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.line, self.index)
    }
}

impl FromStr for Label {
    type Err = InstrumentalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InstrumentalError::serialization(format!("invalid label '{s}'"));
        let (line, index) = s.split_once('.').ok_or_else(invalid)?;
        let line = line.parse().map_err(|_| invalid())?;
        let index: u32 = index.parse().map_err(|_| invalid())?;
        if index == 0 {
            return Err(invalid());
        }
        Ok(Self::new(line, index))
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
