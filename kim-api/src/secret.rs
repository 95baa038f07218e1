use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::meta::ObjectMeta;

/// Data key holding an argon2 PHC string for password authentication.
pub const PASSWORD_HASH_KEY: &str = "password-hash";

/// Out-of-band credential material referenced by `User.spec.secretName`.
#[derive(Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Secret {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Secret {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            data: BTreeMap::new(),
        }
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn password_hash(&self) -> Option<&str> {
        self.data.get(PASSWORD_HASH_KEY).map(String::as_str)
    }
}

// Values are credential material; only keys are printed.
impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secret")
            .field("metadata", &self.metadata)
            .field("data", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}
