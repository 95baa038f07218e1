//! Declarative resource schemas for kim (`iam.kim.io/v1`).
//!
//! Operators describe [`Policy`], [`Role`] and [`User`] resources; the
//! reconcilers turn Policies and Roles into the effective authorization
//! model, and the identity provider reads Users (and the [`Secret`] they
//! reference) on the login and userinfo paths.

pub mod condition;
pub mod meta;
pub mod policy;
pub mod resource;
pub mod role;
pub mod secret;
pub mod user;
pub mod validation;

pub use condition::{
    find_condition, set_condition, Condition, ConditionStatus, CONDITION_POLICIES_RESOLVED,
    CONDITION_SYNCED, MAX_CONDITIONS,
};
pub use meta::{ObjectKey, ObjectMeta, DEFAULT_NAMESPACE};
pub use policy::{Effect, Policy, PolicySpec, PolicyStatus, Rule, SubjectRef};
pub use resource::{HasConditions, Resource};
pub use role::{PolicyRef, Role, RoleSpec, RoleStatus};
pub use secret::{Secret, PASSWORD_HASH_KEY};
pub use user::{Claim, User, UserSpec};
pub use validation::ValidationError;

/// API group of the kim resources.
pub const GROUP: &str = "iam.kim.io";

/// API version of the kim resources.
pub const VERSION: &str = "v1";
