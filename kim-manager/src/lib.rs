//! # kim-manager
//!
//! The `kim` binary.
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kim run` | Load manifests, run the reconcilers and hold the storage adapter |
//! | `kim subject encode/decode` | Convert between `name/namespace` and subject identifiers |
//! | `kim check` | Evaluate one request against a manifest bundle offline |
//! | `kim hash-password` | Hash a password for a Secret manifest |
//! | `kim schema` | Print the JSON schema of a resource kind |

pub mod commands;
