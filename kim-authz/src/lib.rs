//! Effective authorization model and policy evaluation.
//!
//! Reconcilers compile Policies and Roles into fragments
//! ([`compile_policy`], [`compile_rules`]) and swap them into the shared
//! [`AuthzModel`]. [`PolicyEngine`] answers allow/deny queries against it:
//! an explicit `Deny` overrides any `Allow`, and no matching rule means
//! `Deny`.

pub mod cache;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod pattern;
pub mod statement;

pub use cache::{CacheKey, DecisionCache};
pub use compile::{compile_policy, compile_rules, CompiledRule, RuleSource, SourceKind, ANY_ACTION};
pub use config::EngineConfig;
pub use engine::{Decision, Explanation, PolicyEngine};
pub use error::AuthzError;
pub use model::{ApplyOutcome, AuthzModel, PolicyFragment, Reachable, RoleFragment};
pub use pattern::ResourcePattern;
pub use statement::parse_statement;
