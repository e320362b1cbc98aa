//! Engine errors.

use crate::{Position, Value};
use thiserror::Error;

/// The result type of fallible engine operations.
pub type TernResult<T> = Result<T, TernError>;

/// An error raised while parsing or executing a script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TernError {
    /// The source failed to parse.
    #[error("SyntaxError: {message} at {position}")]
    Syntax {
        /// Description of the problem.
        message: String,
        /// Where the parser gave up.
        position: Position,
    },

    /// An unbound identifier was read or assigned.
    #[error("ReferenceError: {0}")]
    Reference(String),

    /// An operation was applied to a value of the wrong kind.
    #[error("TypeError: {0}")]
    Type(String),

    /// A resource limit was exceeded.
    #[error("RangeError: {0}")]
    Range(String),

    /// A value escaped the script as an exception.
    #[error("Uncaught {0}")]
    Thrown(Value),

    /// The embedding host failed while servicing a hook.
    #[error("HostError: {0}")]
    Host(String),

    /// Execution was cancelled from outside the script.
    #[error("execution cancelled")]
    Cancelled,
}

impl TernError {
    /// Creates a syntax error.
    pub fn syntax(message: impl Into<String>, position: Position) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
        }
    }

    /// Returns `true` for [`TernError::Cancelled`].
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
