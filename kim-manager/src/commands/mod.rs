//! Command implementations for the `kim` CLI.

use std::path::Path;

use kim_store::{load_manifests, Store};

/// Offline evaluation against a manifest bundle (`kim check`).
pub mod check;

/// Long-running manager (`kim run`).
pub mod run;

/// JSON schema export (`kim schema`).
pub mod schema;

/// Subject identifier conversion (`kim subject`).
pub mod subject;

pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Fresh in-memory store holding every resource found under `path`.
pub fn load_store(path: &Path) -> CommandResult<Store> {
    let store = Store::new();
    let applied = store.apply_manifests(load_manifests(path)?)?;
    tracing::info!(path = %path.display(), resources = applied, "manifests loaded");
    Ok(store)
}
