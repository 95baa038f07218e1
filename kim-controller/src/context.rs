use std::sync::Arc;

use kim_api::{Policy, Role};
use kim_authz::AuthzModel;
use kim_store::{Api, Store};

/// Shared state handed to every reconcile.
pub struct Context {
    pub policies: Arc<dyn Api<Policy>>,
    pub roles: Arc<dyn Api<Role>>,
    pub model: Arc<AuthzModel>,
}

impl Context {
    pub fn new(
        policies: Arc<dyn Api<Policy>>,
        roles: Arc<dyn Api<Role>>,
        model: Arc<AuthzModel>,
    ) -> Self {
        Self {
            policies,
            roles,
            model,
        }
    }

    pub fn from_store(store: &Store, model: Arc<AuthzModel>) -> Self {
        Self::new(store.policies(), store.roles(), model)
    }
}
