use std::fmt::Debug;

use garde::Validate;

use crate::condition::Condition;
use crate::meta::{ObjectKey, ObjectMeta};
use crate::policy::Policy;
use crate::role::Role;
use crate::secret::Secret;
use crate::user::User;
use crate::validation::ValidationError;

/// Common behaviour of every stored resource kind.
pub trait Resource: Clone + Debug + Send + Sync + 'static {
    const KIND: &'static str;

    fn metadata(&self) -> &ObjectMeta;
    fn metadata_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ObjectKey {
        self.metadata().key()
    }

    /// Copy the status subresource of `other` onto `self`.
    fn copy_status_from(&mut self, _other: &Self) {}

    /// Validate the spec.
    fn validate_spec(&self) -> Result<(), ValidationError> {
        Ok(())
    }

    /// Validate the object identity, then the spec.
    fn validate(&self) -> Result<(), ValidationError> {
        let problems = self.metadata().identity_problems();
        if !problems.is_empty() {
            return Err(ValidationError {
                resource: describe(self),
                fields: problems,
            });
        }
        self.validate_spec()
    }
}

/// Resources whose status carries conditions.
pub trait HasConditions: Resource {
    fn conditions(&self) -> &[Condition];
    fn conditions_mut(&mut self) -> &mut Vec<Condition>;
}

fn describe<R: Resource>(resource: &R) -> String {
    format!("{} {}", R::KIND, resource.key())
}

impl Resource for Policy {
    const KIND: &'static str = "Policy";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }

    fn validate_spec(&self) -> Result<(), ValidationError> {
        self.spec
            .validate()
            .map_err(|report| ValidationError::from_report(describe(self), &report))
    }
}

impl HasConditions for Policy {
    fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.conditions
    }
}

impl Resource for Role {
    const KIND: &'static str = "Role";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn copy_status_from(&mut self, other: &Self) {
        self.status = other.status.clone();
    }

    fn validate_spec(&self) -> Result<(), ValidationError> {
        self.spec
            .validate()
            .map_err(|report| ValidationError::from_report(describe(self), &report))
    }
}

impl HasConditions for Role {
    fn conditions(&self) -> &[Condition] {
        &self.status.conditions
    }

    fn conditions_mut(&mut self) -> &mut Vec<Condition> {
        &mut self.status.conditions
    }
}

impl Resource for User {
    const KIND: &'static str = "User";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }

    fn validate_spec(&self) -> Result<(), ValidationError> {
        self.spec
            .validate()
            .map_err(|report| ValidationError::from_report(describe(self), &report))
    }
}

impl Resource for Secret {
    const KIND: &'static str = "Secret";

    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn metadata_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
