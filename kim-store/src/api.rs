//! The read/write contract the reconcilers and the identity provider use to
//! reach declarative resources.

use std::future::Future;
use std::pin::Pin;

use kim_api::{ObjectKey, Resource};
use tokio::sync::broadcast;

use crate::error::StoreError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What happened to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Created or spec updated.
    Applied,
    Deleted,
}

/// Change notification for a single resource key.
///
/// Events carry the key only; consumers always re-read the latest state, so
/// coalescing several events for the same key is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub key: ObjectKey,
    pub kind: EventKind,
    pub resource_version: u64,
}

/// Typed access to one resource kind.
///
/// Writes are versioned: `update` and `replace_status` fail with
/// [`StoreError::Conflict`] when the supplied `resource_version` is not the
/// stored one. Status writes do not emit watch events.
pub trait Api<R: Resource>: Send + Sync + 'static {
    /// Fetch a resource. A missing resource is `Ok(None)`.
    fn get<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<Option<R>, StoreError>>;

    fn list(&self) -> BoxFuture<'_, Result<Vec<R>, StoreError>>;

    fn create(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>>;

    /// Replace the spec of an existing resource (version-checked).
    fn update(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>>;

    /// Create or replace the spec regardless of version.
    fn apply(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>>;

    /// Delete a resource. Deleting a missing resource is `NotFound`.
    fn delete<'a>(&'a self, key: &'a ObjectKey) -> BoxFuture<'a, Result<(), StoreError>>;

    /// Replace the status subresource (version-checked).
    fn replace_status(&self, resource: R) -> BoxFuture<'_, Result<R, StoreError>>;

    /// Subscribe to change notifications.
    fn watch(&self) -> broadcast::Receiver<WatchEvent>;
}
