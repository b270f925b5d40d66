use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuthzError {
    #[error("syntax error at line {line}: {reason}")]
    Syntax { line: usize, reason: String },

    #[error("unrecognized access letter {letter:?} in {access:?}")]
    InvalidAccess { access: String, letter: char },

    #[error("invalid pattern {pattern:?}: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("invalid rule path {path:?}: {reason}")]
    InvalidRulePath { path: String, reason: String },

    #[error("reference to undefined group @{0}")]
    UnknownGroup(String),

    #[error("reference to undefined alias &{0}")]
    UnknownAlias(String),

    #[error("circular definition: {0}")]
    Cycle(String),

    #[error("alias {0:?} is defined multiple times")]
    DuplicateAlias(String),

    #[error("failed to lock authorization model for read/write: {0}")]
    LockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for AuthzError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        AuthzError::LockError(err.to_string())
    }
}
