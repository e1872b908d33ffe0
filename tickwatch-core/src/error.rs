//! Error types for the engine.
//!
//! Nothing in the engine is fatal to the host. Errors surface in two places:
//! expression compilation (returned from constructors) and evaluation
//! (returned by evaluators, then caught and logged by the watcher that ran
//! them).

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The expression could not be parsed.
    #[error("invalid expression `{expression}`: {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// The expression has no setter (e.g. a literal).
    #[error("expression `{0}` is not assignable")]
    NotAssignable(String),

    /// A property was read from something that is not an object or array.
    #[error("cannot read property `{key}` of {found}")]
    NotAnObject { key: String, found: &'static str },

    /// An evaluator or setter reported a failure.
    #[error("{0}")]
    Eval(String),

    /// Configuration could not be deserialized.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    /// Build an evaluation error from any message.
    pub fn eval(message: impl Into<String>) -> Self {
        Self::Eval(message.into())
    }

    pub(crate) fn invalid(expression: &str, reason: impl Into<String>) -> Self {
        Self::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
