use std::path::PathBuf;
use std::sync::Arc;

use colored::Colorize;
use kim_api::ObjectKey;
use kim_authz::{AuthzModel, Decision, Explanation, PolicyEngine};
use kim_controller::{reconcile_all, Context};
use kim_oidc::{decode_subject, parse_username};

use super::{load_store, CommandResult};

pub struct CheckOptions {
    pub manifests: PathBuf,
    /// `name/namespace`, or a hex subject identifier.
    pub subject: String,
    pub resource: String,
    pub action: String,
}

pub struct CheckOutcome {
    pub subject: ObjectKey,
    pub explanation: Explanation,
    /// Resources that failed to reconcile and contribute nothing.
    pub failures: Vec<(ObjectKey, String)>,
}

/// Reconcile the bundle once and evaluate the request.
pub async fn evaluate(options: &CheckOptions) -> CommandResult<CheckOutcome> {
    let subject = match parse_username(&options.subject) {
        Ok(key) => key,
        Err(e) => decode_subject(&options.subject).map_err(|_| e)?,
    };
    let store = load_store(&options.manifests)?;
    let model = Arc::new(AuthzModel::new());
    let ctx = Arc::new(Context::from_store(&store, model.clone()));
    let failures = reconcile_all(&ctx)
        .await?
        .into_iter()
        .map(|(key, e)| (key, e.to_string()))
        .collect();
    let explanation = PolicyEngine::new(model).explain(&subject, &options.resource, &options.action);
    Ok(CheckOutcome {
        subject,
        explanation,
        failures,
    })
}

pub async fn run(options: CheckOptions) -> CommandResult<Decision> {
    let outcome = evaluate(&options).await?;
    for (key, error) in &outcome.failures {
        println!("{} {key} not applied: {error}", "!".yellow());
    }
    let decision = outcome.explanation.decision;
    let verdict = match decision {
        Decision::Allow => "ALLOW".green().bold(),
        Decision::Deny => "DENY".red().bold(),
    };
    println!(
        "{verdict} {} {} on {}",
        outcome.subject, options.action, options.resource
    );
    for source in &outcome.explanation.allowed_by {
        println!("  {} {source}", "allowed by".green());
    }
    for source in &outcome.explanation.denied_by {
        println!("  {} {source}", "denied by".red());
    }
    if outcome.explanation.allowed_by.is_empty() && outcome.explanation.denied_by.is_empty() {
        println!("  no matching rule");
    }
    Ok(decision)
}
