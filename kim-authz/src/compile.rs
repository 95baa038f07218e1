//! Compilation of resource rules into matchable form.

use std::fmt;

use kim_api::{Effect, ObjectKey, PolicySpec, Rule};

use crate::error::AuthzError;
use crate::pattern::ResourcePattern;
use crate::statement::parse_statement;

/// Action wildcard.
pub const ANY_ACTION: &str = "*";

/// Which kind of resource a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Policy,
    Role,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Policy => f.write_str("Policy"),
            SourceKind::Role => f.write_str("Role"),
        }
    }
}

/// Where a compiled rule came from, for audit output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleSource {
    pub kind: SourceKind,
    pub key: ObjectKey,
    pub index: usize,
}

impl fmt::Display for RuleSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} rule {}", self.kind, self.key, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledRule {
    pub pattern: ResourcePattern,
    pub actions: Vec<String>,
    pub effect: Effect,
    pub source: RuleSource,
}

impl CompiledRule {
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        self.actions
            .iter()
            .any(|a| a == ANY_ACTION || a == action)
            && self.pattern.matches(resource)
    }
}

/// Compile a rule list. Every rule must have a known effect, at least one
/// non-empty action and a valid resource pattern.
pub fn compile_rules(
    rules: &[Rule],
    kind: SourceKind,
    key: &ObjectKey,
) -> Result<Vec<CompiledRule>, AuthzError> {
    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            let effect = rule.effect().map_err(|_| AuthzError::InvalidEffect {
                rule: index,
                value: rule.effect.clone(),
            })?;
            if rule.actions.is_empty() || rule.actions.iter().any(String::is_empty) {
                return Err(AuthzError::InvalidRule {
                    rule: index,
                    message: "actions must be non-empty".to_string(),
                });
            }
            let mut actions = rule.actions.clone();
            actions.sort();
            actions.dedup();
            Ok(CompiledRule {
                pattern: ResourcePattern::parse(&rule.resource)?,
                actions,
                effect,
                source: RuleSource {
                    kind,
                    key: key.clone(),
                    index,
                },
            })
        })
        .collect()
}

/// Compile a Policy spec: explicit `rules` first, then rules derived from
/// the statement document.
pub fn compile_policy(spec: &PolicySpec, key: &ObjectKey) -> Result<Vec<CompiledRule>, AuthzError> {
    let mut rules = spec.rules.clone();
    rules.extend(parse_statement(&spec.statement)?);
    compile_rules(&rules, SourceKind::Policy, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> ObjectKey {
        ObjectKey::new("default", "p")
    }

    #[test]
    fn unknown_effect_names_the_rule() {
        let rules = vec![
            Rule::new("doc:1", &["read"], Effect::Allow),
            Rule {
                resource: "doc:2".into(),
                actions: vec!["read".into()],
                effect: "allow".into(),
            },
        ];
        let err = compile_rules(&rules, SourceKind::Policy, &key()).unwrap_err();
        assert_eq!(
            err,
            AuthzError::InvalidEffect {
                rule: 1,
                value: "allow".into()
            }
        );
    }

    #[test]
    fn action_wildcard_matches_any_action() {
        let compiled = compile_rules(
            &[Rule::new("doc:*", &["*"], Effect::Allow)],
            SourceKind::Role,
            &key(),
        )
        .unwrap();
        assert!(compiled[0].matches("doc:1", "delete"));
        assert!(!compiled[0].matches("img:1", "delete"));
    }

    #[test]
    fn statement_rules_follow_explicit_rules() {
        let spec = PolicySpec {
            statement: r#"{"Statement": [{"Effect": "Deny", "Action": "write", "Resource": "doc:1"}]}"#
                .into(),
            rules: vec![Rule::new("doc:1", &["read"], Effect::Allow)],
            ..Default::default()
        };
        let compiled = compile_policy(&spec, &key()).unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[1].effect, Effect::Deny);
        assert_eq!(compiled[1].source.index, 1);
    }
}
