use std::fmt;

use kim_authz::AuthzError;
use kim_store::StoreError;

/// Reconcile failure.
#[derive(Debug)]
pub enum Error {
    /// Reading or writing the resource store failed.
    Store(StoreError),
    /// The resource spec cannot be compiled. Retrying does not help until
    /// the spec changes.
    Invalid(String),
    /// The model rejected the update; a fresh reconcile will converge.
    TransientSync(String),
}

impl Error {
    /// Whether the failure should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Store(StoreError::Invalid(_)) => false,
            Error::Store(_) => true,
            Error::Invalid(_) => false,
            Error::TransientSync(_) => true,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(e) => write!(f, "store error: {e}"),
            Error::Invalid(msg) => write!(f, "invalid spec: {msg}"),
            Error::TransientSync(msg) => write!(f, "model sync failed: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Store(err)
    }
}

impl From<AuthzError> for Error {
    fn from(err: AuthzError) -> Self {
        Error::Invalid(err.to_string())
    }
}

impl From<kim_api::ValidationError> for Error {
    fn from(err: kim_api::ValidationError) -> Self {
        Error::Invalid(err.to_string())
    }
}
