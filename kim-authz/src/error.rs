//! Errors raised while compiling resources into the authorization model.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// A rule effect other than `Allow` or `Deny`.
    InvalidEffect { rule: usize, value: String },
    /// A rule with no usable actions.
    InvalidRule { rule: usize, message: String },
    /// The statement document is not valid JSON or has malformed entries.
    InvalidStatement(String),
    /// A resource pattern that cannot be compiled.
    InvalidPattern { pattern: String, message: String },
}

impl fmt::Display for AuthzError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthzError::InvalidEffect { rule, value } => {
                write!(f, "rule {rule}: invalid effect '{value}' (expected Allow or Deny)")
            }
            AuthzError::InvalidRule { rule, message } => write!(f, "rule {rule}: {message}"),
            AuthzError::InvalidStatement(msg) => write!(f, "invalid statement: {msg}"),
            AuthzError::InvalidPattern { pattern, message } => {
                write!(f, "invalid resource pattern '{pattern}': {message}")
            }
        }
    }
}

impl std::error::Error for AuthzError {}
