//! Error types returned to the protocol engine.

use std::fmt;

use kim_store::StoreError;

/// Failure resolving an opaque subject identifier or username to a User.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Not hex, not UTF-8, or not of the form `name/namespace`.
    InvalidIdentifier(String),
    NotFound(String),
    Store(String),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::InvalidIdentifier(msg) => write!(f, "invalid identifier: {msg}"),
            IdentityError::NotFound(who) => write!(f, "user {who} not found"),
            IdentityError::Store(msg) => write!(f, "user lookup failed: {msg}"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<StoreError> for IdentityError {
    fn from(err: StoreError) -> Self {
        IdentityError::Store(err.to_string())
    }
}

/// Storage adapter error.
///
/// [`StorageError::error_code`] gives the OAuth 2.0 (RFC 6749 §5.2) or
/// device grant (RFC 8628 §3.5) error code the protocol engine should send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    ClientNotFound(String),
    /// Client authentication failed or the client may not use this flow.
    InvalidClient(String),
    /// Any end-user authentication failure. Carries no detail on purpose.
    InvalidCredentials,
    /// The policy engine denied the request.
    AuthorizationDenied {
        subject: String,
        resource: String,
        action: String,
    },
    InvalidRequest(String),
    /// Unknown, expired, revoked or mismatched code or refresh token.
    InvalidGrant(String),
    InvalidIdentifier(String),
    NotFound(String),
    AuthorizationPending,
    /// The end user denied the device authorization.
    AccessDenied,
    ExpiredToken,
    Internal(String),
}

impl StorageError {
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::ClientNotFound(_) | StorageError::InvalidClient(_) => "invalid_client",
            StorageError::InvalidCredentials | StorageError::InvalidGrant(_) => "invalid_grant",
            StorageError::AuthorizationDenied { .. } | StorageError::AccessDenied => "access_denied",
            StorageError::InvalidRequest(_)
            | StorageError::InvalidIdentifier(_)
            | StorageError::NotFound(_) => "invalid_request",
            StorageError::AuthorizationPending => "authorization_pending",
            StorageError::ExpiredToken => "expired_token",
            StorageError::Internal(_) => "server_error",
        }
    }

    fn description(&self) -> String {
        match self {
            StorageError::ClientNotFound(id) => format!("client '{id}' not found"),
            StorageError::InvalidClient(msg)
            | StorageError::InvalidRequest(msg)
            | StorageError::InvalidGrant(msg)
            | StorageError::InvalidIdentifier(msg)
            | StorageError::Internal(msg) => msg.clone(),
            StorageError::NotFound(what) => format!("{what} not found"),
            StorageError::InvalidCredentials => "invalid username or password".to_string(),
            StorageError::AuthorizationDenied {
                subject,
                resource,
                action,
            } => format!("{subject} may not {action} on {resource}"),
            StorageError::AuthorizationPending => "authorization pending".to_string(),
            StorageError::AccessDenied => "the user denied the request".to_string(),
            StorageError::ExpiredToken => "the device code has expired".to_string(),
        }
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.description())
    }
}

impl std::error::Error for StorageError {}

impl From<IdentityError> for StorageError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidIdentifier(msg) => StorageError::InvalidIdentifier(msg),
            IdentityError::NotFound(who) => StorageError::NotFound(format!("user {who}")),
            IdentityError::Store(msg) => StorageError::Internal(msg),
        }
    }
}

impl From<StoreError> for StorageError {
    fn from(err: StoreError) -> Self {
        StorageError::Internal(err.to_string())
    }
}
