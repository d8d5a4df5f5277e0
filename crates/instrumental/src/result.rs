//! Result and error types for Instrumental.

use std::path::PathBuf;

use thiserror::Error;

use crate::construct::Label;
use crate::syntax::ParseError;

/// Result type for Instrumental operations
pub type InstrumentalResult<T> = Result<T, InstrumentalError>;

/// Errors that can occur in Instrumental
#[derive(Debug, Error)]
pub enum InstrumentalError {
    /// Source text could not be parsed
    #[error("Failed to parse {modulename}: {source}")]
    Parse {
        /// Module being parsed
        modulename: String,
        /// Underlying syntax error
        #[source]
        source: ParseError,
    },

    /// Source or store file could not be read or written
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Path that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Store or cache serialization failed
    #[error("Serialization failed: {message}")]
    Serialization {
        /// Error message
        message: String,
    },

    /// A tap reported an outcome the construct cannot have produced
    #[error("Evaluation order violated at {modulename}:{label}: {message}")]
    EvaluationOrder {
        /// Module of the construct
        modulename: String,
        /// Construct label
        label: Label,
        /// What was observed
        message: String,
    },

    /// A tap referenced a construct the recorder does not know
    #[error("Unknown construct {modulename}:{label}")]
    UnknownConstruct {
        /// Module of the construct
        modulename: String,
        /// Construct label
        label: Label,
    },

    /// Two recorders disagree on the shape of a construct
    #[error("Cannot merge {modulename}:{label}: {message}")]
    ConstructMismatch {
        /// Module of the construct
        modulename: String,
        /// Construct label
        label: Label,
        /// How the constructs differ
        message: String,
    },

    /// Two recorders were produced from different source text
    #[error("Source of {modulename} changed between runs ({left} != {right})")]
    SourceDrift {
        /// Module whose digest differs
        modulename: String,
        /// Digest on the receiving side
        left: String,
        /// Digest on the merged side
        right: String,
    },

    /// The rewriter found a construct the metadata does not describe
    #[error("Metadata for {modulename} does not match its tree at {label}: {message}")]
    MetadataMismatch {
        /// Module being instrumented
        modulename: String,
        /// Label allocated by the rewriter
        label: Label,
        /// Error message
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },
}

impl InstrumentalError {
    /// Create an I/O error for a path
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an evaluation-order error
    #[must_use]
    pub fn evaluation_order(
        modulename: impl Into<String>,
        label: Label,
        message: impl Into<String>,
    ) -> Self {
        Self::EvaluationOrder {
            modulename: modulename.into(),
            label,
            message: message.into(),
        }
    }

    /// Create a construct mismatch error
    #[must_use]
    pub fn construct_mismatch(
        modulename: impl Into<String>,
        label: Label,
        message: impl Into<String>,
    ) -> Self {
        Self::ConstructMismatch {
            modulename: modulename.into(),
            label,
            message: message.into(),
        }
    }

    /// Create a metadata mismatch error
    #[must_use]
    pub fn metadata_mismatch(
        modulename: impl Into<String>,
        label: Label,
        message: impl Into<String>,
    ) -> Self {
        Self::MetadataMismatch {
            modulename: modulename.into(),
            label,
            message: message.into(),
        }
    }

    /// Whether this error signals a defect in the instrumentation itself
    #[must_use]
    pub const fn is_internal_consistency(&self) -> bool {
        matches!(
            self,
            Self::EvaluationOrder { .. }
                | Self::UnknownConstruct { .. }
                | Self::MetadataMismatch { .. }
        )
    }
}

impl From<serde_json::Error> for InstrumentalError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluation_order_is_internal() {
        let err = InstrumentalError::evaluation_order("m", Label::new(3, 1), "pin 7 of 2");
        assert!(err.is_internal_consistency());
        assert!(err.to_string().contains("m:3.1"));
    }

    #[test]
    fn test_config_error_is_not_internal() {
        let err = InstrumentalError::config("bad");
        assert!(!err.is_internal_consistency());
        assert!(err.to_string().contains("Configuration"));
    }

    #[test]
    fn test_io_error_names_path() {
        let err = InstrumentalError::io(
            "/tmp/missing.py",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.to_string().contains("/tmp/missing.py"));
    }
}
