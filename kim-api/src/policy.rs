use std::fmt;
use std::str::FromStr;

use garde::Validate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::condition::Condition;
use crate::meta::{ObjectKey, ObjectMeta};

/// Effect of a rule. Stored as a string on the resource so that unknown
/// values survive deserialisation and are rejected by validation instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Effect {
    Allow,
    Deny,
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allow" => Ok(Effect::Allow),
            "Deny" => Ok(Effect::Deny),
            other => Err(format!("unknown effect '{other}', expected Allow or Deny")),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Allow => f.write_str("Allow"),
            Effect::Deny => f.write_str("Deny"),
        }
    }
}

#[allow(clippy::ptr_arg)]
fn validate_effect(value: &String, _ctx: &()) -> garde::Result {
    value
        .parse::<Effect>()
        .map(|_| ())
        .map_err(garde::Error::new)
}

/// A single (resource pattern, actions, effect) tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct Rule {
    /// Resource pattern, `:`-separated, `*` wildcards allowed.
    #[garde(length(min = 1))]
    pub resource: String,
    #[garde(length(min = 1), inner(length(min = 1)))]
    pub actions: Vec<String>,
    #[garde(custom(validate_effect))]
    pub effect: String,
}

impl Rule {
    pub fn new(resource: impl Into<String>, actions: &[&str], effect: Effect) -> Self {
        Self {
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            effect: effect.to_string(),
        }
    }

    pub fn effect(&self) -> Result<Effect, String> {
        self.effect.parse()
    }
}

/// Reference to a User a policy or role is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct SubjectRef {
    #[garde(length(min = 1))]
    pub name: String,
    /// Defaults to the namespace of the referring resource.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub namespace: Option<String>,
}

impl SubjectRef {
    pub fn new(name: impl Into<String>, namespace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_string),
        }
    }

    pub fn resolve(&self, default_namespace: &str) -> ObjectKey {
        ObjectKey::new(
            self.namespace.as_deref().unwrap_or(default_namespace),
            &self.name,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(rename = "desc", default)]
    #[garde(skip)]
    pub description: String,
    /// JSON policy document, retained verbatim for audit and export.
    #[serde(default)]
    #[garde(skip)]
    pub statement: String,
    #[serde(default)]
    #[garde(dive)]
    pub rules: Vec<Rule>,
    /// Users this policy is attached to directly.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[garde(dive)]
    pub subjects: Vec<SubjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PolicyStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Policy {
    pub metadata: ObjectMeta,
    pub spec: PolicySpec,
    #[serde(default)]
    pub status: PolicyStatus,
}

impl Policy {
    pub fn new(namespace: &str, name: &str, spec: PolicySpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: PolicyStatus::default(),
        }
    }
}
