//! Policy evaluation.

use std::fmt;
use std::sync::Arc;

use kim_api::{Effect, ObjectKey};

use crate::cache::{CacheKey, DecisionCache};
use crate::compile::RuleSource;
use crate::config::EngineConfig;
use crate::model::AuthzModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("Allow"),
            Decision::Deny => f.write_str("Deny"),
        }
    }
}

/// A decision together with the rules that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Explanation {
    pub decision: Decision,
    pub allowed_by: Vec<RuleSource>,
    pub denied_by: Vec<RuleSource>,
}

/// Answers `(subject, resource, action)` queries against the model.
///
/// Evaluation never performs I/O and never fails: no matching rule means
/// `Deny`, and any matching `Deny` rule wins over every `Allow`.
#[derive(Clone)]
pub struct PolicyEngine {
    model: Arc<AuthzModel>,
    cache: Option<Arc<DecisionCache>>,
}

impl PolicyEngine {
    pub fn new(model: Arc<AuthzModel>) -> Self {
        Self { model, cache: None }
    }

    pub fn with_cache(mut self, cache: DecisionCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    pub fn from_config(model: Arc<AuthzModel>, config: &EngineConfig) -> Self {
        let engine = Self::new(model);
        if config.cache_enabled {
            engine.with_cache(DecisionCache::with_capacity(
                config.cache_ttl,
                config.cache_capacity,
            ))
        } else {
            engine
        }
    }

    pub fn model(&self) -> &Arc<AuthzModel> {
        &self.model
    }

    pub fn evaluate(&self, subject: &ObjectKey, resource: &str, action: &str) -> Decision {
        // Read the revision first: a concurrent change stamps the result as
        // outdated rather than caching it as current.
        let revision = self.model.revision();
        let cache_key = self
            .cache
            .as_ref()
            .map(|_| CacheKey::new(subject, resource, action));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(decision) = cache.get(key, revision) {
                return decision;
            }
        }

        let decision = self.decide(subject, resource, action);
        tracing::trace!(subject = %subject, resource, action, decision = %decision, "evaluated");

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            cache.set(key, decision, revision);
        }
        decision
    }

    fn decide(&self, subject: &ObjectKey, resource: &str, action: &str) -> Decision {
        let reachable = self.model.reachable(subject);
        let mut allowed = false;
        for rule in reachable.rules() {
            if !rule.matches(resource, action) {
                continue;
            }
            match rule.effect {
                Effect::Deny => return Decision::Deny,
                Effect::Allow => allowed = true,
            }
        }
        if allowed {
            Decision::Allow
        } else {
            Decision::Deny
        }
    }

    /// Evaluate and report every matching rule. Bypasses the cache.
    pub fn explain(&self, subject: &ObjectKey, resource: &str, action: &str) -> Explanation {
        let reachable = self.model.reachable(subject);
        let mut allowed_by = Vec::new();
        let mut denied_by = Vec::new();
        for rule in reachable.rules().filter(|r| r.matches(resource, action)) {
            match rule.effect {
                Effect::Allow => allowed_by.push(rule.source.clone()),
                Effect::Deny => denied_by.push(rule.source.clone()),
            }
        }
        let decision = if denied_by.is_empty() && !allowed_by.is_empty() {
            Decision::Allow
        } else {
            Decision::Deny
        };
        Explanation {
            decision,
            allowed_by,
            denied_by,
        }
    }

    /// Roles bound to `subject`.
    pub fn roles_for(&self, subject: &ObjectKey) -> Vec<ObjectKey> {
        self.model.roles_for(subject)
    }
}
