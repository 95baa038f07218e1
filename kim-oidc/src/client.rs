use std::collections::BTreeSet;
use std::sync::{Arc, OnceLock};

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use dashmap::DashMap;

use crate::error::StorageError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationType {
    Native,
    Web,
}

/// How the client authenticates at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    ClientSecretBasic,
    ClientSecretPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    DeviceCode,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::DeviceCode => "urn:ietf:params:oauth:grant-type:device_code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResponseType {
    Code,
    IdToken,
    IdTokenToken,
}

impl std::str::FromStr for ResponseType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ResponseType::Code),
            "id_token" => Ok(ResponseType::IdToken),
            "id_token token" => Ok(ResponseType::IdTokenToken),
            other => Err(StorageError::InvalidRequest(format!(
                "unsupported response_type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenType {
    Bearer,
    Jwt,
}

/// A registered OAuth 2.0 / OpenID Connect client.
#[derive(Debug, Clone)]
pub struct Client {
    pub id: String,
    /// Argon2 PHC hash of the client secret; `None` for public clients.
    secret_hash: Option<String>,
    pub redirect_uris: Vec<String>,
    pub post_logout_redirect_uris: Vec<String>,
    pub application_type: ApplicationType,
    pub auth_method: AuthMethod,
    pub grant_types: BTreeSet<GrantType>,
    pub response_types: BTreeSet<ResponseType>,
    pub access_token_type: AccessTokenType,
    /// Allows non-https redirect URIs.
    pub dev_mode: bool,
}

impl Client {
    /// Public client (no secret) for native and device-bound applications.
    pub fn native(id: impl Into<String>, redirect_uris: Vec<String>) -> Self {
        Self {
            id: id.into(),
            secret_hash: None,
            redirect_uris,
            post_logout_redirect_uris: Vec::new(),
            application_type: ApplicationType::Native,
            auth_method: AuthMethod::None,
            grant_types: [
                GrantType::AuthorizationCode,
                GrantType::RefreshToken,
                GrantType::DeviceCode,
            ]
            .into_iter()
            .collect(),
            response_types: [ResponseType::Code].into_iter().collect(),
            access_token_type: AccessTokenType::Bearer,
            dev_mode: false,
        }
    }

    /// Confidential client. The secret is hashed with argon2.
    pub fn web(
        id: impl Into<String>,
        secret: &str,
        redirect_uris: Vec<String>,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id: id.into(),
            secret_hash: Some(hash_password(secret)?),
            redirect_uris,
            post_logout_redirect_uris: Vec::new(),
            application_type: ApplicationType::Web,
            auth_method: AuthMethod::ClientSecretBasic,
            grant_types: [GrantType::AuthorizationCode, GrantType::RefreshToken]
                .into_iter()
                .collect(),
            response_types: [ResponseType::Code].into_iter().collect(),
            access_token_type: AccessTokenType::Bearer,
            dev_mode: false,
        })
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    pub fn with_grant_type(mut self, grant: GrantType) -> Self {
        self.grant_types.insert(grant);
        self
    }

    pub fn with_post_logout_redirect_uris(mut self, uris: Vec<String>) -> Self {
        self.post_logout_redirect_uris = uris;
        self
    }

    pub fn is_confidential(&self) -> bool {
        self.secret_hash.is_some()
    }

    pub fn allows_grant(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }

    /// Exact-match redirect URI check. Outside dev mode only https and
    /// loopback http URIs are accepted, and native clients may also use
    /// custom schemes.
    pub fn is_redirect_allowed(&self, uri: &str) -> bool {
        if !self.redirect_uris.iter().any(|u| u == uri) {
            return false;
        }
        if self.dev_mode || uri.starts_with("https://") {
            return true;
        }
        if uri.starts_with("http://localhost") || uri.starts_with("http://127.0.0.1") {
            return true;
        }
        self.application_type == ApplicationType::Native && !uri.starts_with("http://")
    }

    async fn verify_secret(&self, secret: &str) -> bool {
        let Some(hash) = self.secret_hash.clone() else {
            return false;
        };
        verify_password(Some(hash), secret.to_string()).await
    }
}

/// Argon2id PHC string for a password or client secret.
pub fn hash_password(password: &str) -> Result<String, StorageError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StorageError::Internal(format!("failed to hash secret: {e}")))
}

const DUMMY_PASSWORD: &str = "kim-dummy-credential";

/// Hash checked when there is no real one, so every login costs one argon2
/// verification.
fn dummy_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password(DUMMY_PASSWORD).ok())
        .as_deref()
}

fn verify_blocking(hash: Option<&str>, password: &str) -> bool {
    match hash.and_then(|h| PasswordHash::new(h).ok()) {
        Some(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        None => {
            if let Some(parsed) = dummy_hash().and_then(|h| PasswordHash::new(h).ok()) {
                let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
            }
            false
        }
    }
}

/// Argon2 verification on the blocking pool. A missing or unparsable hash
/// still pays for a verification and always fails.
pub(crate) async fn verify_password(hash: Option<String>, password: String) -> bool {
    tokio::task::spawn_blocking(move || verify_blocking(hash.as_deref(), &password))
        .await
        .unwrap_or(false)
}

/// Registry of OAuth 2.0 clients.
#[derive(Default)]
pub struct ClientRegistry {
    clients: DashMap<String, Arc<Client>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client, replacing any client with the same id.
    pub fn register(&self, client: Client) {
        tracing::debug!(client_id = %client.id, "client registered");
        self.clients.insert(client.id.clone(), Arc::new(client));
    }

    pub fn with_client(self, client: Client) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, client_id: &str) -> Result<Arc<Client>, StorageError> {
        self.clients
            .get(client_id)
            .map(|c| Arc::clone(c.value()))
            .ok_or_else(|| StorageError::ClientNotFound(client_id.to_string()))
    }

    /// Check confidential client credentials.
    ///
    /// Unknown clients stay `ClientNotFound`; public clients and wrong
    /// secrets are `InvalidClient`.
    pub async fn authenticate(
        &self,
        client_id: &str,
        secret: &str,
    ) -> Result<Arc<Client>, StorageError> {
        let client = self.get(client_id)?;
        if !client.is_confidential() {
            return Err(StorageError::InvalidClient(format!(
                "client '{client_id}' is public"
            )));
        }
        if client.verify_secret(secret).await {
            Ok(client)
        } else {
            tracing::debug!(client_id, "client secret rejected");
            Err(StorageError::InvalidClient(
                "client authentication failed".to_string(),
            ))
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_hash_burns_a_verification_and_fails() {
        assert!(dummy_hash().is_some());
        assert!(!verify_password(None, DUMMY_PASSWORD.to_string()).await);
        assert!(!verify_password(Some("not-a-phc-string".into()), DUMMY_PASSWORD.to_string()).await);

        let hash = hash_password("secret").unwrap();
        assert!(verify_password(Some(hash.clone()), "secret".into()).await);
        assert!(!verify_password(Some(hash), "wrong".into()).await);
    }

    #[tokio::test]
    async fn web_client_secret_is_verified() {
        let registry = ClientRegistry::new().with_client(
            Client::web("web", "secret", vec!["https://app/cb".into()]).unwrap(),
        );
        assert!(registry.authenticate("web", "secret").await.is_ok());
        assert!(matches!(
            registry.authenticate("web", "nope").await,
            Err(StorageError::InvalidClient(_))
        ));
        assert!(matches!(
            registry.authenticate("ghost", "secret").await,
            Err(StorageError::ClientNotFound(_))
        ));
    }

    #[tokio::test]
    async fn native_client_cannot_authenticate_with_secret() {
        let registry =
            ClientRegistry::new().with_client(Client::native("native", vec!["kim://cb".into()]));
        assert!(matches!(
            registry.authenticate("native", "").await,
            Err(StorageError::InvalidClient(_))
        ));
        assert!(registry.get("native").unwrap().allows_grant(GrantType::DeviceCode));
    }

    #[test]
    fn redirect_rules() {
        let native = Client::native(
            "native",
            vec![
                "kim://cb".into(),
                "http://localhost:9999/cb".into(),
                "http://example.com/cb".into(),
            ],
        );
        assert!(native.is_redirect_allowed("kim://cb"));
        assert!(native.is_redirect_allowed("http://localhost:9999/cb"));
        assert!(!native.is_redirect_allowed("http://example.com/cb"));
        assert!(!native.is_redirect_allowed("kim://other"));
        assert!(native
            .with_dev_mode(true)
            .is_redirect_allowed("http://example.com/cb"));
    }
}
