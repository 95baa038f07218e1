//! Resource storage and change notification for kim.
//!
//! [`Api`] is the contract reconcilers and the identity provider program
//! against; [`Store`] is the in-process implementation backing the manager
//! and the tests.

pub mod api;
pub mod error;
pub mod manifest;
pub mod memory;

pub use api::{Api, BoxFuture, EventKind, WatchEvent};
pub use error::StoreError;
pub use manifest::{load_manifests, parse_manifests, Manifest};
pub use memory::{Collection, Store};
