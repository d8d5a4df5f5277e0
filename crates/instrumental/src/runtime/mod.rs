//! Reference host runtime.
//!
//! A tree-walking interpreter that executes plain or instrumented module
//! trees. Calls on the recorder binding dispatch into an
//! [`ExecutionRecorder`](crate::recorder::ExecutionRecorder) supplied by the
//! caller.

mod interp;
mod value;

use thiserror::Error;

use crate::result::InstrumentalError;

pub use interp::Interpreter;
pub use value::{exception_matches, Builtin, Function, FunctionBody, Value, EXCEPTION_TYPES};

/// Errors that abort execution
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A host exception nothing caught
    #[error("{kind}: {message}")]
    Exception {
        /// Exception class
        kind: String,
        /// Exception message
        message: String,
    },

    /// A construct the runtime does not execute
    #[error("line {line}: {what} not supported")]
    Unsupported {
        /// Line of the construct
        line: u32,
        /// What was encountered
        what: String,
    },

    /// The recorder rejected a tap
    #[error("instrumentation failed: {0}")]
    Instrumentation(#[from] InstrumentalError),
}

impl RuntimeError {
    /// Create a host exception
    #[must_use]
    pub fn exception(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Exception {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-construct error
    #[must_use]
    pub fn unsupported(line: u32, what: impl Into<String>) -> Self {
        Self::Unsupported {
            line,
            what: what.into(),
        }
    }

    /// Whether this is a host exception of class `kind`
    #[must_use]
    pub fn is_exception(&self, kind: &str) -> bool {
        matches!(self, Self::Exception { kind: k, .. } if k == kind)
    }
}

/// Result type of the runtime
pub type RuntimeResult<T> = Result<T, RuntimeError>;
