//! Error types for resource store operations.

use std::fmt;

use kim_api::ObjectKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The resource does not exist.
    NotFound { kind: &'static str, key: ObjectKey },
    /// A create targeted an existing resource.
    AlreadyExists { kind: &'static str, key: ObjectKey },
    /// Optimistic concurrency check failed: the caller wrote from a stale
    /// resource version.
    Conflict {
        kind: &'static str,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },
    /// The resource was rejected by validation or could not be decoded.
    Invalid(String),
    /// Reading manifests failed.
    Io(String),
    /// The backing store is temporarily unavailable.
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Conflict { .. } | StoreError::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::NotFound { kind, key } => write!(f, "{kind} {key} not found"),
            StoreError::AlreadyExists { kind, key } => write!(f, "{kind} {key} already exists"),
            StoreError::Conflict {
                kind,
                key,
                expected,
                actual,
            } => write!(
                f,
                "{kind} {key} was modified: expected resource version {expected}, found {actual}"
            ),
            StoreError::Invalid(msg) => write!(f, "invalid resource: {msg}"),
            StoreError::Io(msg) => write!(f, "manifest i/o error: {msg}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<kim_api::ValidationError> for StoreError {
    fn from(err: kim_api::ValidationError) -> Self {
        StoreError::Invalid(err.to_string())
    }
}
