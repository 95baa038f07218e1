use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{ObjectKey, ObjectMeta};
use crate::policy::{Rule, SubjectRef};

/// Reference from a Role to a Policy it composes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct PolicyRef {
    #[garde(length(min = 1))]
    pub name: String,
    /// Defaults to the role's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub namespace: Option<String>,
}

impl PolicyRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn resolve(&self, default_namespace: &str) -> ObjectKey {
        ObjectKey::new(
            self.namespace.as_deref().unwrap_or(default_namespace),
            &self.name,
        )
    }
}

/// A Role binds subjects to permissions given either as direct rules, as
/// references to Policies, or both. Roles may reference Policies but
/// Policies never reference Roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    #[serde(rename = "desc", default)]
    #[garde(skip)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(dive)]
    pub rules: Vec<Rule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(dive)]
    pub policy_refs: Vec<PolicyRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(dive)]
    pub subjects: Vec<SubjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RoleStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Role {
    pub metadata: ObjectMeta,
    pub spec: RoleSpec,
    #[serde(default)]
    pub status: RoleStatus,
}

impl Role {
    pub fn new(namespace: &str, name: &str, spec: RoleSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: RoleStatus::default(),
        }
    }
}
