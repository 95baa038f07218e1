use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Namespace used when a manifest omits one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Identity of a namespaced resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Standard object metadata.
///
/// `resource_version` is assigned by the store on every write (spec or
/// status) and is used for optimistic concurrency. `generation` only moves
/// when the spec is written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub generation: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// `(field, message)` pairs for a name that is not a DNS-1123 subdomain
    /// or a namespace that is not a DNS-1123 label.
    pub fn identity_problems(&self) -> Vec<(String, String)> {
        let mut problems = Vec::new();
        if let Err(message) = check_dns1123(&self.name, MAX_NAME_LEN, true) {
            problems.push(("metadata.name".to_string(), message));
        }
        if let Err(message) = check_dns1123(&self.namespace, MAX_NAMESPACE_LEN, false) {
            problems.push(("metadata.namespace".to_string(), message));
        }
        problems
    }
}

const MAX_NAME_LEN: usize = 253;
const MAX_NAMESPACE_LEN: usize = 63;

fn check_dns1123(value: &str, max_len: usize, allow_dots: bool) -> Result<(), String> {
    if value.is_empty() {
        return Err("must not be empty".to_string());
    }
    if value.len() > max_len {
        return Err(format!("must be at most {max_len} characters"));
    }
    let labels: Vec<&str> = if allow_dots {
        value.split('.').collect()
    } else {
        vec![value]
    };
    for label in labels {
        let alnum = |c: u8| c.is_ascii_lowercase() || c.is_ascii_digit();
        let bytes = label.as_bytes();
        let ok = match (bytes.first(), bytes.last()) {
            (Some(&first), Some(&last)) => {
                alnum(first) && alnum(last) && bytes.iter().all(|&c| alnum(c) || c == b'-')
            }
            _ => false,
        };
        if !ok {
            return Err(format!(
                "'{value}' must consist of lower case alphanumerics or '-', starting and ending with an alphanumeric"
            ));
        }
    }
    Ok(())
}
