//! Mapping between protocol subject identifiers and User resources.
//!
//! A subject identifier is the hex encoding of `"<name>/<namespace>"`. The
//! same `name/namespace` string is the login username.

use std::sync::Arc;

use kim_api::{ObjectKey, User};
use kim_store::Api;

use crate::error::IdentityError;

const SEPARATOR: char = '/';

/// Username form of a key: `name/namespace`.
pub fn username(key: &ObjectKey) -> String {
    format!("{}{SEPARATOR}{}", key.name, key.namespace)
}

/// Parse a `name/namespace` username. Exactly one separator with a
/// non-empty part on each side is accepted.
pub fn parse_username(username: &str) -> Result<ObjectKey, IdentityError> {
    let invalid = || IdentityError::InvalidIdentifier(format!("'{username}' is not name/namespace"));
    let (name, namespace) = username.split_once(SEPARATOR).ok_or_else(invalid)?;
    if name.is_empty() || namespace.is_empty() || namespace.contains(SEPARATOR) {
        return Err(invalid());
    }
    Ok(ObjectKey::new(namespace, name))
}

pub fn encode_subject(key: &ObjectKey) -> String {
    hex::encode(username(key))
}

/// Decode an opaque subject identifier back to a key.
pub fn decode_subject(opaque_id: &str) -> Result<ObjectKey, IdentityError> {
    let bytes = hex::decode(opaque_id)
        .map_err(|e| IdentityError::InvalidIdentifier(format!("not hex: {e}")))?;
    let decoded = String::from_utf8(bytes)
        .map_err(|_| IdentityError::InvalidIdentifier("not UTF-8".to_string()))?;
    parse_username(&decoded)
}

/// Looks up User resources by username or subject identifier.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn Api<User>>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn Api<User>>) -> Self {
        Self { users }
    }

    pub async fn resolve(&self, key: &ObjectKey) -> Result<User, IdentityError> {
        self.users
            .get(key)
            .await?
            .ok_or_else(|| IdentityError::NotFound(key.to_string()))
    }

    pub async fn resolve_by_username(&self, username: &str) -> Result<User, IdentityError> {
        let key = parse_username(username)?;
        self.resolve(&key).await
    }

    pub async fn resolve_by_opaque_id(&self, opaque_id: &str) -> Result<User, IdentityError> {
        let key = decode_subject(opaque_id)?;
        self.resolve(&key).await
    }
}
