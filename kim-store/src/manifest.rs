//! Loading resources from YAML manifests.
//!
//! A manifest file may hold several documents separated by `---`; each one
//! names its type through the `kind` field. Empty documents are skipped.

use std::path::{Path, PathBuf};

use kim_api::{Policy, Resource, Role, Secret, User};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::memory::Store;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Manifest {
    Policy(Policy),
    Role(Role),
    User(User),
    Secret(Secret),
}

impl Manifest {
    pub fn kind(&self) -> &'static str {
        match self {
            Manifest::Policy(_) => Policy::KIND,
            Manifest::Role(_) => Role::KIND,
            Manifest::User(_) => User::KIND,
            Manifest::Secret(_) => Secret::KIND,
        }
    }
}

/// Parse every document of a multi-document YAML string.
pub fn parse_manifests(source: &str) -> Result<Vec<Manifest>, StoreError> {
    let mut manifests = Vec::new();
    for (index, document) in serde_yaml::Deserializer::from_str(source).enumerate() {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| StoreError::Invalid(format!("document {index}: {e}")))?;
        if value.is_null() {
            continue;
        }
        let manifest = serde_yaml::from_value(value)
            .map_err(|e| StoreError::Invalid(format!("document {index}: {e}")))?;
        manifests.push(manifest);
    }
    Ok(manifests)
}

/// Load manifests from a file, or from every `.yaml`/`.yml` file of a
/// directory in lexical order.
pub fn load_manifests(path: impl AsRef<Path>) -> Result<Vec<Manifest>, StoreError> {
    let path = path.as_ref();
    let files = if path.is_dir() {
        let mut files: Vec<PathBuf> = std::fs::read_dir(path)
            .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|ext| ext.to_str()),
                    Some("yaml" | "yml")
                )
            })
            .collect();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut manifests = Vec::new();
    for file in files {
        let source = std::fs::read_to_string(&file)
            .map_err(|e| StoreError::Io(format!("{}: {e}", file.display())))?;
        let parsed = parse_manifests(&source).map_err(|e| match e {
            StoreError::Invalid(msg) => StoreError::Invalid(format!("{}: {msg}", file.display())),
            other => other,
        })?;
        tracing::debug!(file = %file.display(), count = parsed.len(), "manifests parsed");
        manifests.extend(parsed);
    }
    Ok(manifests)
}

impl Store {
    /// Apply manifests in order. Every manifest is validated before any is
    /// written, so a bad file leaves the store untouched.
    pub fn apply_manifests(&self, manifests: Vec<Manifest>) -> Result<usize, StoreError> {
        for manifest in &manifests {
            match manifest {
                Manifest::Policy(r) => r.validate()?,
                Manifest::Role(r) => r.validate()?,
                Manifest::User(r) => r.validate()?,
                Manifest::Secret(r) => r.validate()?,
            }
        }
        let count = manifests.len();
        for manifest in manifests {
            match manifest {
                Manifest::Policy(r) => {
                    self.policies().apply_sync(r)?;
                }
                Manifest::Role(r) => {
                    self.roles().apply_sync(r)?;
                }
                Manifest::User(r) => {
                    self.users().apply_sync(r)?;
                }
                Manifest::Secret(r) => {
                    self.secrets().apply_sync(r)?;
                }
            }
        }
        tracing::info!(count, "manifests applied");
        Ok(count)
    }
}
