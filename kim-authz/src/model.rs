//! The effective authorization model.
//!
//! Each reconciled Policy and Role owns one immutable fragment. A reconcile
//! builds a fresh fragment and swaps it into the map in one step, so a reader
//! sees either the old or the new fragment for a key and never a mix. The
//! subject index only narrows the search; fragment membership is checked on
//! every read, which keeps evaluation correct while the index catches up.
//!
//! Lock order: a fragment map shard may be held while the subject or
//! reference index is updated, never the other way round. Readers copy index
//! entries out before touching fragment maps.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kim_api::ObjectKey;

use crate::compile::{CompiledRule, SourceKind};

/// Compiled contribution of one Policy.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyFragment {
    pub key: ObjectKey,
    pub resource_version: u64,
    pub rules: Vec<CompiledRule>,
    /// Users the policy is attached to directly.
    pub subjects: BTreeSet<ObjectKey>,
}

impl PolicyFragment {
    fn same_content(&self, other: &Self) -> bool {
        self.rules == other.rules && self.subjects == other.subjects
    }
}

/// Compiled contribution of one Role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleFragment {
    pub key: ObjectKey,
    pub resource_version: u64,
    pub rules: Vec<CompiledRule>,
    /// Policies composed into the role, resolved at evaluation time.
    pub policy_refs: BTreeSet<ObjectKey>,
    pub subjects: BTreeSet<ObjectKey>,
}

impl RoleFragment {
    fn same_content(&self, other: &Self) -> bool {
        self.rules == other.rules
            && self.policy_refs == other.policy_refs
            && self.subjects == other.subjects
    }
}

/// Result of writing a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Same content as the stored fragment; nothing observable changed.
    Unchanged,
    /// The fragment was built from an older resource version than the one
    /// stored and was dropped.
    Stale { current: u64 },
}

#[derive(Debug, Clone, Default)]
struct Bindings {
    policies: BTreeSet<ObjectKey>,
    roles: BTreeSet<ObjectKey>,
}

impl Bindings {
    fn set_for(&mut self, kind: SourceKind) -> &mut BTreeSet<ObjectKey> {
        match kind {
            SourceKind::Policy => &mut self.policies,
            SourceKind::Role => &mut self.roles,
        }
    }

    fn is_empty(&self) -> bool {
        self.policies.is_empty() && self.roles.is_empty()
    }
}

/// Everything reachable from one subject.
#[derive(Debug, Default)]
pub struct Reachable {
    pub policies: Vec<Arc<PolicyFragment>>,
    pub roles: Vec<Arc<RoleFragment>>,
}

impl Reachable {
    pub fn rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.policies
            .iter()
            .flat_map(|p| p.rules.iter())
            .chain(self.roles.iter().flat_map(|r| r.rules.iter()))
    }
}

#[derive(Default)]
pub struct AuthzModel {
    policies: DashMap<ObjectKey, Arc<PolicyFragment>>,
    roles: DashMap<ObjectKey, Arc<RoleFragment>>,
    subjects: DashMap<ObjectKey, Bindings>,
    /// Policy -> roles that reference it.
    policy_roles: DashMap<ObjectKey, BTreeSet<ObjectKey>>,
    revision: AtomicU64,
}

impl AuthzModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }

    pub fn apply_policy(&self, fragment: PolicyFragment) -> ApplyOutcome {
        let fragment = Arc::new(fragment);
        match self.policies.entry(fragment.key.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().clone();
                if fragment.resource_version < current.resource_version {
                    return ApplyOutcome::Stale {
                        current: current.resource_version,
                    };
                }
                if current.same_content(&fragment) {
                    slot.insert(fragment);
                    return ApplyOutcome::Unchanged;
                }
                slot.insert(fragment.clone());
                self.rebind(
                    &fragment.key,
                    SourceKind::Policy,
                    &current.subjects,
                    &fragment.subjects,
                );
            }
            Entry::Vacant(slot) => {
                let _guard = slot.insert(fragment.clone());
                self.rebind(
                    &fragment.key,
                    SourceKind::Policy,
                    &BTreeSet::new(),
                    &fragment.subjects,
                );
            }
        }
        self.bump();
        ApplyOutcome::Applied
    }

    /// Drop a policy's contribution. Returns whether anything was removed.
    pub fn remove_policy(&self, key: &ObjectKey) -> bool {
        let Entry::Occupied(slot) = self.policies.entry(key.clone()) else {
            return false;
        };
        let (_, removed) = slot.remove_entry();
        self.rebind(key, SourceKind::Policy, &removed.subjects, &BTreeSet::new());
        self.bump();
        true
    }

    pub fn apply_role(&self, fragment: RoleFragment) -> ApplyOutcome {
        let fragment = Arc::new(fragment);
        match self.roles.entry(fragment.key.clone()) {
            Entry::Occupied(mut slot) => {
                let current = slot.get().clone();
                if fragment.resource_version < current.resource_version {
                    return ApplyOutcome::Stale {
                        current: current.resource_version,
                    };
                }
                if current.same_content(&fragment) {
                    slot.insert(fragment);
                    return ApplyOutcome::Unchanged;
                }
                slot.insert(fragment.clone());
                self.rebind(
                    &fragment.key,
                    SourceKind::Role,
                    &current.subjects,
                    &fragment.subjects,
                );
                self.relink(&fragment.key, &current.policy_refs, &fragment.policy_refs);
            }
            Entry::Vacant(slot) => {
                let _guard = slot.insert(fragment.clone());
                let empty = BTreeSet::new();
                self.rebind(&fragment.key, SourceKind::Role, &empty, &fragment.subjects);
                self.relink(&fragment.key, &empty, &fragment.policy_refs);
            }
        }
        self.bump();
        ApplyOutcome::Applied
    }

    pub fn remove_role(&self, key: &ObjectKey) -> bool {
        let Entry::Occupied(slot) = self.roles.entry(key.clone()) else {
            return false;
        };
        let (_, removed) = slot.remove_entry();
        let empty = BTreeSet::new();
        self.rebind(key, SourceKind::Role, &removed.subjects, &empty);
        self.relink(key, &removed.policy_refs, &empty);
        self.bump();
        true
    }

    fn rebind(
        &self,
        source: &ObjectKey,
        kind: SourceKind,
        old: &BTreeSet<ObjectKey>,
        new: &BTreeSet<ObjectKey>,
    ) {
        for subject in new.difference(old) {
            self.subjects
                .entry(subject.clone())
                .or_default()
                .set_for(kind)
                .insert(source.clone());
        }
        for subject in old.difference(new) {
            if let Entry::Occupied(mut entry) = self.subjects.entry(subject.clone()) {
                entry.get_mut().set_for(kind).remove(source);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
    }

    fn relink(&self, role: &ObjectKey, old: &BTreeSet<ObjectKey>, new: &BTreeSet<ObjectKey>) {
        for policy in new.difference(old) {
            self.policy_roles
                .entry(policy.clone())
                .or_default()
                .insert(role.clone());
        }
        for policy in old.difference(new) {
            if let Entry::Occupied(mut entry) = self.policy_roles.entry(policy.clone()) {
                entry.get_mut().remove(role);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
    }

    pub fn policy(&self, key: &ObjectKey) -> Option<Arc<PolicyFragment>> {
        self.policies.get(key).map(|f| f.value().clone())
    }

    pub fn role(&self, key: &ObjectKey) -> Option<Arc<RoleFragment>> {
        self.roles.get(key).map(|f| f.value().clone())
    }

    pub fn policy_keys(&self) -> Vec<ObjectKey> {
        self.policies.iter().map(|f| f.key().clone()).collect()
    }

    pub fn role_keys(&self) -> Vec<ObjectKey> {
        self.roles.iter().map(|f| f.key().clone()).collect()
    }

    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// Roles whose `policyRefs` name `policy`, whether or not it exists.
    pub fn roles_referencing(&self, policy: &ObjectKey) -> Vec<ObjectKey> {
        self.policy_roles
            .get(policy)
            .map(|roles| roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Roles bound to `subject`.
    pub fn roles_for(&self, subject: &ObjectKey) -> Vec<ObjectKey> {
        let candidates = match self.subjects.get(subject) {
            Some(bindings) => bindings.roles.clone(),
            None => return Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|key| {
                self.role(key)
                    .is_some_and(|role| role.subjects.contains(subject))
            })
            .collect()
    }

    /// Collect the fragments whose rules apply to `subject`: policies attached
    /// directly, roles bound to it, and the policies those roles reference.
    pub fn reachable(&self, subject: &ObjectKey) -> Reachable {
        let bindings = match self.subjects.get(subject) {
            Some(bindings) => bindings.clone(),
            None => return Reachable::default(),
        };

        let mut policies = BTreeMap::new();
        for key in &bindings.policies {
            if let Some(fragment) = self.policy(key) {
                if fragment.subjects.contains(subject) {
                    policies.insert(key.clone(), fragment);
                }
            }
        }

        let mut roles = Vec::new();
        for key in &bindings.roles {
            let Some(role) = self.role(key) else {
                continue;
            };
            if !role.subjects.contains(subject) {
                continue;
            }
            for policy_key in &role.policy_refs {
                if policies.contains_key(policy_key) {
                    continue;
                }
                if let Some(fragment) = self.policy(policy_key) {
                    policies.insert(policy_key.clone(), fragment);
                }
            }
            roles.push(role);
        }

        Reachable {
            policies: policies.into_values().collect(),
            roles,
        }
    }
}

#[cfg(test)]
mod tests {
    use kim_api::{Effect, Rule};

    use super::*;
    use crate::compile::compile_rules;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new("default", name)
    }

    fn policy(name: &str, version: u64, subjects: &[&str]) -> PolicyFragment {
        PolicyFragment {
            key: key(name),
            resource_version: version,
            rules: compile_rules(
                &[Rule::new("doc:1", &["read"], Effect::Allow)],
                SourceKind::Policy,
                &key(name),
            )
            .unwrap(),
            subjects: subjects.iter().map(|s| key(s)).collect(),
        }
    }

    #[test]
    fn older_fragment_is_rejected() {
        let model = AuthzModel::new();
        assert_eq!(model.apply_policy(policy("p", 5, &["u1"])), ApplyOutcome::Applied);
        assert_eq!(
            model.apply_policy(policy("p", 3, &["u2"])),
            ApplyOutcome::Stale { current: 5 }
        );
        assert_eq!(model.reachable(&key("u1")).policies.len(), 1);
        assert!(model.reachable(&key("u2")).policies.is_empty());
    }

    #[test]
    fn identical_fragment_keeps_revision() {
        let model = AuthzModel::new();
        model.apply_policy(policy("p", 1, &["u1"]));
        let revision = model.revision();
        assert_eq!(model.apply_policy(policy("p", 2, &["u1"])), ApplyOutcome::Unchanged);
        assert_eq!(model.revision(), revision);
        assert_eq!(model.policy(&key("p")).unwrap().resource_version, 2);
    }

    #[test]
    fn subject_index_follows_rebinding() {
        let model = AuthzModel::new();
        model.apply_policy(policy("p", 1, &["u1"]));
        model.apply_policy(policy("p", 2, &["u2"]));
        assert!(model.reachable(&key("u1")).policies.is_empty());
        assert_eq!(model.reachable(&key("u2")).policies.len(), 1);

        assert!(model.remove_policy(&key("p")));
        assert!(!model.remove_policy(&key("p")));
        assert!(model.reachable(&key("u2")).policies.is_empty());
    }

    #[test]
    fn roles_reach_referenced_policies() {
        let model = AuthzModel::new();
        model.apply_policy(policy("p", 1, &[]));
        model.apply_role(RoleFragment {
            key: key("r"),
            resource_version: 2,
            rules: Vec::new(),
            policy_refs: [key("p"), key("missing")].into_iter().collect(),
            subjects: [key("u1")].into_iter().collect(),
        });

        let reachable = model.reachable(&key("u1"));
        assert_eq!(reachable.policies.len(), 1);
        assert_eq!(reachable.roles.len(), 1);
        assert_eq!(model.roles_referencing(&key("p")), vec![key("r")]);
        assert_eq!(model.roles_referencing(&key("missing")), vec![key("r")]);
        assert_eq!(model.roles_for(&key("u1")), vec![key("r")]);

        model.remove_role(&key("r"));
        assert!(model.roles_referencing(&key("p")).is_empty());
        assert!(model.roles_for(&key("u1")).is_empty());
    }
}
