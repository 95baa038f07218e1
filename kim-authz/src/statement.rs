//! Policy statement documents.
//!
//! The statement is kept verbatim on the Policy for audit and export. When it
//! carries an IAM-style `Statement` list, each entry also contributes rules:
//!
//! ```json
//! {"Statement": [{"Effect": "Allow", "Action": ["read"], "Resource": "doc:*"}]}
//! ```

use kim_api::{Effect, Rule};
use serde::Deserialize;

use crate::error::AuthzError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(v) => vec![v],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entries {
    One(Entry),
    Many(Vec<Entry>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Entry {
    effect: String,
    action: OneOrMany,
    resource: OneOrMany,
}

/// Parse a statement document and derive its rules.
///
/// An empty statement yields no rules. A non-empty statement must be valid
/// JSON; documents without a `Statement` key are accepted and contribute
/// nothing.
pub fn parse_statement(statement: &str) -> Result<Vec<Rule>, AuthzError> {
    if statement.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: serde_json::Value = serde_json::from_str(statement)
        .map_err(|e| AuthzError::InvalidStatement(e.to_string()))?;
    let Some(entries) = document.get("Statement") else {
        return Ok(Vec::new());
    };
    let entries: Entries = serde_json::from_value(entries.clone())
        .map_err(|e| AuthzError::InvalidStatement(format!("Statement: {e}")))?;
    let entries = match entries {
        Entries::One(entry) => vec![entry],
        Entries::Many(entries) => entries,
    };

    let mut rules = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        let effect: Effect = entry
            .effect
            .parse()
            .map_err(|e| AuthzError::InvalidStatement(format!("Statement[{index}]: {e}")))?;
        let actions = entry.action.into_vec();
        if actions.is_empty() {
            return Err(AuthzError::InvalidStatement(format!(
                "Statement[{index}]: Action is empty"
            )));
        }
        for resource in entry.resource.into_vec() {
            rules.push(Rule {
                resource,
                actions: actions.clone(),
                effect: effect.to_string(),
            });
        }
    }
    Ok(rules)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_statement_has_no_rules() {
        assert!(parse_statement("").unwrap().is_empty());
        assert!(parse_statement("  ").unwrap().is_empty());
    }

    #[test]
    fn opaque_documents_are_accepted() {
        assert!(parse_statement(r#"{"Version": "2012-10-17"}"#)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            parse_statement("{not json"),
            Err(AuthzError::InvalidStatement(_))
        ));
    }

    #[test]
    fn derives_one_rule_per_resource() {
        let rules = parse_statement(
            r#"{"Statement": [
                {"Effect": "Allow", "Action": ["read", "list"], "Resource": ["doc:1", "doc:2"]},
                {"Effect": "Deny", "Action": "delete", "Resource": "doc:*"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].actions, vec!["read", "list"]);
        assert_eq!(rules[2].effect, "Deny");
    }

    #[test]
    fn single_entry_statement() {
        let rules =
            parse_statement(r#"{"Statement": {"Effect": "Allow", "Action": "read", "Resource": "*"}}"#)
                .unwrap();
        assert_eq!(rules.len(), 1);
    }

    #[test]
    fn unknown_effect_in_statement_is_rejected() {
        let err = parse_statement(
            r#"{"Statement": [{"Effect": "Maybe", "Action": "read", "Resource": "*"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, AuthzError::InvalidStatement(_)));
    }
}
