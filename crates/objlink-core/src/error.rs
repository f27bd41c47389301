//! Errors raised by remote method implementations.

use thiserror::Error;

/// Failure of a remote method body.
///
/// Implementations of `RemoteObject::invoke` return this; the dispatcher
/// wraps it and the session reports its text as the error payload.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvokeError {
    /// Wrong number of positional arguments
    #[error("{method}() takes {expected} argument(s) but {got} were given")]
    Arity {
        method: String,
        expected: usize,
        got: usize,
    },

    /// Argument present but of the wrong shape
    #[error("argument {index} of {method}() must be {expected}")]
    InvalidArgument {
        method: String,
        index: usize,
        expected: &'static str,
    },

    /// `invoke` was reached with a name outside the capability table
    #[error("{class} has no method {method}")]
    UnknownMethod { class: &'static str, method: String },

    /// The method ran and failed
    #[error("{0}")]
    Failed(String),
}

impl InvokeError {
    /// Creates a failure from any displayable error.
    pub fn failed<E: std::fmt::Display>(err: E) -> Self {
        Self::Failed(err.to_string())
    }

    /// Creates the fallback error for an unhandled method name.
    pub fn unknown(class: &'static str, method: &str) -> Self {
        Self::UnknownMethod {
            class,
            method: method.to_string(),
        }
    }
}

/// Result type for remote method bodies.
pub type InvokeResult<T> = Result<T, InvokeError>;
