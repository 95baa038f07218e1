//! In-memory resource store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use kim_api::{ObjectKey, Policy, Resource, Role, Secret, User};
use tokio::sync::broadcast;

use crate::api::{Api, BoxFuture, EventKind, WatchEvent};
use crate::error::StoreError;

const WATCH_CAPACITY: usize = 1024;

/// Storage for one resource kind.
///
/// Every write takes the next value of the revision counter shared by all
/// collections of a [`Store`], so resource versions are unique and increase
/// across kinds.
pub struct Collection<R: Resource> {
    objects: DashMap<ObjectKey, R>,
    revision: Arc<AtomicU64>,
    events: broadcast::Sender<WatchEvent>,
}

impl<R: Resource> Collection<R> {
    pub fn new(revision: Arc<AtomicU64>) -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            objects: DashMap::new(),
            revision,
            events,
        }
    }

    fn next_version(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn notify(&self, key: ObjectKey, kind: EventKind, resource_version: u64) {
        // No subscribers is not an error.
        let _ = self.events.send(WatchEvent {
            key,
            kind,
            resource_version,
        });
    }

    fn conflict(key: ObjectKey, expected: u64, actual: u64) -> StoreError {
        StoreError::Conflict {
            kind: R::KIND,
            key,
            expected,
            actual,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn get_sync(&self, key: &ObjectKey) -> Option<R> {
        self.objects.get(key).map(|r| r.value().clone())
    }

    pub fn list_sync(&self) -> Vec<R> {
        let mut items: Vec<R> = self.objects.iter().map(|r| r.value().clone()).collect();
        items.sort_by_key(|r| r.key());
        items
    }

    pub fn create_sync(&self, mut resource: R) -> Result<R, StoreError> {
        resource.validate()?;
        let key = resource.key();
        let stored = match self.objects.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::AlreadyExists {
                    kind: R::KIND,
                    key,
                })
            }
            Entry::Vacant(slot) => {
                let meta = resource.metadata_mut();
                meta.resource_version = self.next_version();
                meta.generation = 1;
                meta.uid = Some(uuid::Uuid::new_v4().to_string());
                meta.creation_timestamp = Some(Utc::now());
                slot.insert(resource.clone());
                resource
            }
        };
        tracing::debug!(kind = R::KIND, key = %key, rv = stored.metadata().resource_version, "created");
        self.notify(key, EventKind::Applied, stored.metadata().resource_version);
        Ok(stored)
    }

    pub fn update_sync(&self, mut resource: R) -> Result<R, StoreError> {
        resource.validate()?;
        let key = resource.key();
        let stored = match self.objects.entry(key.clone()) {
            Entry::Vacant(_) => {
                return Err(StoreError::NotFound {
                    kind: R::KIND,
                    key,
                })
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get();
                let actual = current.metadata().resource_version;
                let expected = resource.metadata().resource_version;
                if expected != actual {
                    return Err(Self::conflict(key, expected, actual));
                }
                Self::carry_over(&mut resource, current);
                resource.metadata_mut().resource_version = self.next_version();
                slot.insert(resource.clone());
                resource
            }
        };
        self.notify(key, EventKind::Applied, stored.metadata().resource_version);
        Ok(stored)
    }

    pub fn apply_sync(&self, mut resource: R) -> Result<R, StoreError> {
        resource.validate()?;
        let key = resource.key();
        let stored = match self.objects.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let meta = resource.metadata_mut();
                meta.resource_version = self.next_version();
                meta.generation = 1;
                meta.uid = Some(uuid::Uuid::new_v4().to_string());
                meta.creation_timestamp = Some(Utc::now());
                slot.insert(resource.clone());
                resource
            }
            Entry::Occupied(mut slot) => {
                Self::carry_over(&mut resource, slot.get());
                resource.metadata_mut().resource_version = self.next_version();
                slot.insert(resource.clone());
                resource
            }
        };
        tracing::debug!(kind = R::KIND, key = %key, rv = stored.metadata().resource_version, "applied");
        self.notify(key, EventKind::Applied, stored.metadata().resource_version);
        Ok(stored)
    }

    pub fn delete_sync(&self, key: &ObjectKey) -> Result<(), StoreError> {
        if self.objects.remove(key).is_none() {
            return Err(StoreError::NotFound {
                kind: R::KIND,
                key: key.clone(),
            });
        }
        let version = self.next_version();
        tracing::debug!(kind = R::KIND, key = %key, rv = version, "deleted");
        self.notify(key.clone(), EventKind::Deleted, version);
        Ok(())
    }

    pub fn replace_status_sync(&self, resource: R) -> Result<R, StoreError> {
        let key = resource.key();
        match self.objects.entry(key.clone()) {
            Entry::Vacant(_) => Err(StoreError::NotFound {
                kind: R::KIND,
                key,
            }),
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                let actual = current.metadata().resource_version;
                let expected = resource.metadata().resource_version;
                if expected != actual {
                    return Err(Self::conflict(key, expected, actual));
                }
                current.copy_status_from(&resource);
                current.metadata_mut().resource_version = self.next_version();
                Ok(current.clone())
            }
        }
    }

    /// Keep server-owned metadata and the status of `current` on a spec write.
    fn carry_over(incoming: &mut R, current: &R) {
        incoming.copy_status_from(current);
        let current_meta = current.metadata();
        let meta = incoming.metadata_mut();
        meta.uid = current_meta.uid.clone();
        meta.creation_timestamp = current_meta.creation_timestamp;
        meta.generation = current_meta.generation + 1;
    }
}

impl<R: Resource> Api<R> for Collection<R> {
    fn get<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<Option<R>, StoreError>> {
        Box::pin(async move { Ok(self.get_sync(key)) })
    }

    fn list(&self) -> BoxFuture<'_, Result<Vec<R>, StoreError>> {
        Box::pin(async move { Ok(self.list_sync()) })
    }

    fn create(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>> {
        Box::pin(async move { self.create_sync(resource) })
    }

    fn update(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>> {
        Box::pin(async move { self.update_sync(resource) })
    }

    fn apply(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>> {
        Box::pin(async move { self.apply_sync(resource) })
    }

    fn delete<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.delete_sync(key) })
    }

    fn replace_status(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>> {
        Box::pin(async move { self.replace_status_sync(resource) })
    }

    fn watch(&self) -> broadcast::Receiver<WatchEvent> {
        self.events.subscribe()
    }
}

/// All resource kinds of one control plane, sharing a revision counter.
#[derive(Clone)]
pub struct Store {
    revision: Arc<AtomicU64>,
    policies: Arc<Collection<Policy>>,
    roles: Arc<Collection<Role>>,
    users: Arc<Collection<User>>,
    secrets: Arc<Collection<Secret>>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        let revision = Arc::new(AtomicU64::new(0));
        Self {
            policies: Arc::new(Collection::new(revision.clone())),
            roles: Arc::new(Collection::new(revision.clone())),
            users: Arc::new(Collection::new(revision.clone())),
            secrets: Arc::new(Collection::new(revision.clone())),
            revision,
        }
    }

    /// Latest resource version handed out by any collection.
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn policies(&self) -> Arc<Collection<Policy>> {
        self.policies.clone()
    }

    pub fn roles(&self) -> Arc<Collection<Role>> {
        self.roles.clone()
    }

    pub fn users(&self) -> Arc<Collection<User>> {
        self.users.clone()
    }

    pub fn secrets(&self) -> Arc<Collection<Secret>> {
        self.secrets.clone()
    }
}
