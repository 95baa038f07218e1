//! Identity resolution and the OpenID provider storage adapter.
//!
//! Subjects are Users addressed by a hex-encoded `name/namespace`
//! identifier ([`encode_subject`], [`IdentityResolver`]). [`Storage`]
//! implements the capability traits an OpenID provider engine needs for
//! the authorization code, refresh token and device flows, and runs every
//! token issuance through the [`kim_authz::PolicyEngine`].
//!
//! # Example
//!
//! ```ignore
//! let store = Store::new();
//! let engine = PolicyEngine::new(Arc::new(AuthzModel::new()));
//! let key = Arc::new(SigningKey::generate("kim-1")?);
//! let storage = Storage::from_store(StorageConfig::default(), &store, engine, key)?;
//!
//! let subject = storage.authenticate("alice/team-a", "password").await?;
//! ```

pub mod auth_request;
pub mod capability;
pub mod claims;
pub mod client;
pub mod config;
pub mod device;
pub mod error;
pub mod identity;
pub mod keys;
pub mod storage;
pub mod token;

pub use auth_request::{AuthRequest, AuthRequestParams, CodeChallenge, CodeChallengeMethod};
pub use capability::{
    AuthRequestStorage, ClaimsStorage, ClientStore, DeviceStorage, KeyStorage, StorageResult,
    TokenStorage,
};
pub use claims::{project, UserInfo, IDENTITY_SCOPES, ROLES_CLAIM};
pub use client::{hash_password, AuthMethod, Client, ClientRegistry, GrantType, ResponseType};
pub use config::{ClientConfig, ClientKind, StorageConfig, DEFAULT_ACTION, MAX_TTL};
pub use device::{DeviceAuthorization, DeviceCodeResponse, DeviceState};
pub use error::{IdentityError, StorageError};
pub use identity::{decode_subject, encode_subject, parse_username, username, IdentityResolver};
pub use keys::{KeySet, SigningKey};
pub use storage::Storage;
pub use token::{Introspection, TokenRequest, TokenSet};
