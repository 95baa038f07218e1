//! The storage adapter handed to the OpenID provider engine.

use std::sync::Arc;

use kim_api::{ObjectKey, Secret, User};
use kim_authz::PolicyEngine;
use kim_store::{Api, BoxFuture, Store};
use serde_json::{Map, Value};

use crate::auth_request::{AuthRequest, AuthRequestParams, AuthRequestStore};
use crate::capability::{
    AuthRequestStorage, ClaimsStorage, ClientStore, DeviceStorage, KeyStorage, StorageResult,
    TokenStorage,
};
use crate::claims::{self, is_identity_scope, UserInfo, ROLES_CLAIM};
use crate::client::{verify_password, Client, ClientRegistry, GrantType};
use crate::config::StorageConfig;
use crate::device::{DeviceAuthorization, DeviceCodeResponse, DeviceStore};
use crate::error::StorageError;
use crate::identity::{decode_subject, encode_subject, IdentityResolver};
use crate::keys::SigningKey;
use crate::token::{Introspection, TokenRequest, TokenSet, TokenStore};

const PASSWORD_AMR: &str = "pwd";

/// Composition root for every storage capability.
pub struct Storage {
    config: StorageConfig,
    clients: Arc<ClientRegistry>,
    identity: IdentityResolver,
    secrets: Arc<dyn Api<Secret>>,
    engine: PolicyEngine,
    auth_requests: AuthRequestStore,
    tokens: TokenStore,
    devices: DeviceStore,
    key: Arc<SigningKey>,
}

impl Storage {
    /// Build the adapter. Clients listed in `config` are registered.
    pub fn new(
        config: StorageConfig,
        users: Arc<dyn Api<User>>,
        secrets: Arc<dyn Api<Secret>>,
        engine: PolicyEngine,
        key: Arc<SigningKey>,
    ) -> Result<Self, StorageError> {
        let clients = Arc::new(config.client_registry()?);
        tracing::info!(
            issuer = %config.issuer,
            clients = clients.len(),
            "storage adapter ready"
        );
        Ok(Self {
            auth_requests: AuthRequestStore::new(config.auth_request_ttl),
            tokens: TokenStore::new(config.access_token_ttl, config.refresh_token_ttl),
            devices: DeviceStore::new(config.device_lifetime, config.device_poll_interval),
            identity: IdentityResolver::new(users),
            config,
            clients,
            secrets,
            engine,
            key,
        })
    }

    pub fn from_store(
        config: StorageConfig,
        store: &Store,
        engine: PolicyEngine,
        key: Arc<SigningKey>,
    ) -> Result<Self, StorageError> {
        Self::new(config, store.users(), store.secrets(), engine, key)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn clients(&self) -> &Arc<ClientRegistry> {
        &self.clients
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    /// Verify a `name/namespace` username and password. Returns the hex
    /// subject identifier.
    ///
    /// Every failure is reported as `InvalidCredentials`.
    pub async fn authenticate(&self, username: &str, password: &str) -> StorageResult<String> {
        let user = match self.identity.resolve_by_username(username).await {
            Ok(user) => user,
            Err(e) => {
                tracing::debug!(error = %e, "login rejected");
                verify_password(None, password.to_string()).await;
                return Err(StorageError::InvalidCredentials);
            }
        };
        let key = user.metadata.key();
        let secret_key = ObjectKey::new(key.namespace.clone(), user.spec.secret_name.clone());
        let hash = match self.secrets.get(&secret_key).await {
            Ok(secret) => secret.and_then(|s| s.password_hash().map(str::to_string)),
            Err(e) => {
                tracing::warn!(user = %key, error = %e, "secret lookup failed during login");
                None
            }
        };
        if hash.is_none() {
            tracing::debug!(user = %key, secret = %secret_key, "no password hash for user");
        }
        if verify_password(hash, password.to_string()).await {
            tracing::info!(user = %key, "user authenticated");
            Ok(encode_subject(&key))
        } else {
            tracing::debug!(user = %key, "login rejected");
            Err(StorageError::InvalidCredentials)
        }
    }

    /// Run the policy engine for a token request.
    ///
    /// Every non-identity scope is an action checked against every audience.
    /// A request with only identity scopes checks the configured default
    /// action. An undecodable subject is denied.
    pub fn authorize(&self, request: &TokenRequest) -> StorageResult<()> {
        let mut actions: Vec<&str> = request
            .scopes
            .iter()
            .map(String::as_str)
            .filter(|s| !is_identity_scope(s))
            .collect();
        if actions.is_empty() {
            actions.push(&self.config.default_action);
        }
        let resources: Vec<&str> = if request.audience.is_empty() {
            vec![request.client_id.as_str()]
        } else {
            request.audience.iter().map(String::as_str).collect()
        };
        let denied = |resource: &str, action: &str| StorageError::AuthorizationDenied {
            subject: request.subject.clone(),
            resource: resource.to_string(),
            action: action.to_string(),
        };

        let subject = match decode_subject(&request.subject) {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!(subject = %request.subject, error = %e, "token request for undecodable subject");
                return Err(denied(resources[0], actions[0]));
            }
        };
        for &resource in &resources {
            for &action in &actions {
                let decision = self.engine.evaluate(&subject, resource, action);
                if !decision.is_allowed() {
                    tracing::info!(
                        subject = %subject,
                        client_id = %request.client_id,
                        resource,
                        action,
                        decision = %decision,
                        "token issuance denied"
                    );
                    return Err(denied(resource, action));
                }
            }
        }
        tracing::debug!(subject = %subject, client_id = %request.client_id, "token issuance allowed");
        Ok(())
    }

    fn issue(&self, request: &TokenRequest, client: &Client) -> TokenSet {
        if client.allows_grant(GrantType::RefreshToken) {
            let (access, refresh) = self.tokens.issue_pair(request);
            TokenSet {
                access_token: access.token,
                refresh_token: Some(refresh.token),
                expires_at: access.expires_at,
                scopes: access.scopes,
            }
        } else {
            let access = self.tokens.issue_access(request);
            TokenSet {
                access_token: access.token,
                refresh_token: None,
                expires_at: access.expires_at,
                scopes: access.scopes,
            }
        }
    }

    /// Drop expired auth requests, tokens and device records.
    pub fn purge_expired(&self) -> usize {
        let purged = self.auth_requests.purge_expired()
            + self.tokens.purge_expired()
            + self.devices.purge_expired();
        if purged > 0 {
            tracing::debug!(purged, "expired storage entries removed");
        }
        purged
    }
}

impl ClientStore for Storage {
    fn client_by_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, StorageResult<Arc<Client>>> {
        self.clients.client_by_id(client_id)
    }

    fn authorize_client<'a>(
        &'a self,
        client_id: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, StorageResult<Arc<Client>>> {
        self.clients.authorize_client(client_id, secret)
    }
}

impl AuthRequestStorage for Storage {
    fn create_auth_request(&self, params: AuthRequestParams) -> BoxFuture<'_, StorageResult<AuthRequest>> {
        Box::pin(async move {
            let client = self.clients.get(&params.client_id)?;
            let response_type = params.response_type.parse()?;
            if !client.response_types.contains(&response_type) {
                return Err(StorageError::InvalidRequest(format!(
                    "response_type '{}' not allowed for client '{}'",
                    params.response_type, client.id
                )));
            }
            if !client.allows_grant(GrantType::AuthorizationCode) {
                return Err(StorageError::InvalidRequest(format!(
                    "client '{}' may not use the authorization code grant",
                    client.id
                )));
            }
            if !client.is_redirect_allowed(&params.redirect_uri) {
                return Err(StorageError::InvalidRequest(format!(
                    "redirect_uri '{}' is not registered",
                    params.redirect_uri
                )));
            }
            let request = self.auth_requests.create(params, response_type);
            tracing::debug!(auth_request = %request.id, client_id = %request.client_id, "auth request created");
            Ok(request)
        })
    }

    fn auth_request_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<AuthRequest>> {
        Box::pin(async move { self.auth_requests.get(id) })
    }

    fn auth_request_by_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, StorageResult<AuthRequest>> {
        Box::pin(async move { self.auth_requests.get_by_code(code) })
    }

    fn save_auth_code<'a>(&'a self, id: &'a str, code: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move { self.auth_requests.save_code(id, code) })
    }

    fn check_username_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        auth_request_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.auth_requests.get(auth_request_id)?;
            let subject = self.authenticate(username, password).await?;
            self.auth_requests
                .complete(auth_request_id, subject, &[PASSWORD_AMR])
        })
    }

    fn delete_auth_request<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.auth_requests.delete(id);
            Ok(())
        })
    }
}

impl TokenStorage for Storage {
    fn create_access_token<'a>(&'a self, request: &'a TokenRequest) -> BoxFuture<'a, StorageResult<TokenSet>> {
        Box::pin(async move {
            self.clients.get(&request.client_id)?;
            self.authorize(request)?;
            let access = self.tokens.issue_access(request);
            Ok(TokenSet {
                access_token: access.token,
                refresh_token: None,
                expires_at: access.expires_at,
                scopes: access.scopes,
            })
        })
    }

    fn create_access_and_refresh_tokens<'a>(
        &'a self,
        request: &'a TokenRequest,
        current_refresh_token: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<TokenSet>> {
        Box::pin(async move {
            let client = self.clients.get(&request.client_id)?;
            if let Some(current) = current_refresh_token {
                let old = self.tokens.refresh_token(current, &request.client_id)?;
                if old.subject != request.subject {
                    return Err(StorageError::InvalidGrant(
                        "refresh token belongs to another subject".to_string(),
                    ));
                }
                self.authorize(request)?;
                self.tokens.rotate(current, &request.client_id)?;
            } else {
                self.authorize(request)?;
            }
            let (access, refresh) = self.tokens.issue_pair(request);
            tracing::debug!(client_id = %client.id, "issued access and refresh token");
            Ok(TokenSet {
                access_token: access.token,
                refresh_token: Some(refresh.token),
                expires_at: access.expires_at,
                scopes: access.scopes,
            })
        })
    }

    fn token_request_by_refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        client_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<TokenRequest>> {
        Box::pin(async move {
            let request = self.tokens.refresh_token(refresh_token, client_id)?.to_request();
            self.authorize(&request)?;
            Ok(request)
        })
    }

    fn revoke_token<'a>(&'a self, token: &'a str, client_id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move { self.tokens.revoke(token, client_id) })
    }

    fn terminate_session<'a>(&'a self, subject: &'a str, client_id: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            let removed = self.tokens.terminate_session(subject, client_id);
            tracing::debug!(client_id, removed, "session terminated");
            Ok(())
        })
    }

    fn introspect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StorageResult<Introspection>> {
        Box::pin(async move {
            Ok(self
                .tokens
                .access_token(token)
                .map(|t| Introspection::from(&t))
                .unwrap_or_else(Introspection::inactive))
        })
    }
}

impl DeviceStorage for Storage {
    fn create_device_authorization<'a>(
        &'a self,
        client_id: &'a str,
        scopes: Vec<String>,
    ) -> BoxFuture<'a, StorageResult<DeviceCodeResponse>> {
        Box::pin(async move {
            let client = self.clients.get(client_id)?;
            if !client.allows_grant(GrantType::DeviceCode) {
                return Err(StorageError::InvalidClient(format!(
                    "client '{client_id}' may not use the device grant"
                )));
            }
            let record = self
                .devices
                .create(client_id, scopes, vec![client_id.to_string()]);
            tracing::debug!(client_id, user_code = %record.user_code, "device authorization created");
            Ok(self.devices.response(&record))
        })
    }

    fn device_authorization_by_user_code<'a>(
        &'a self,
        user_code: &'a str,
    ) -> BoxFuture<'a, StorageResult<DeviceAuthorization>> {
        Box::pin(async move { self.devices.by_user_code(user_code) })
    }

    fn approve_device_authorization<'a>(
        &'a self,
        user_code: &'a str,
        subject: &'a str,
    ) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.identity.resolve_by_opaque_id(subject).await?;
            self.devices.approve(user_code, subject.to_string())?;
            tracing::info!(user_code, "device authorization approved");
            Ok(())
        })
    }

    fn deny_device_authorization<'a>(&'a self, user_code: &'a str) -> BoxFuture<'a, StorageResult<()>> {
        Box::pin(async move {
            self.devices.deny(user_code)?;
            tracing::info!(user_code, "device authorization denied");
            Ok(())
        })
    }

    fn poll_device_authorization<'a>(
        &'a self,
        device_code: &'a str,
        client_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<TokenSet>> {
        Box::pin(async move {
            let client = self.clients.get(client_id)?;
            self.devices.poll(device_code, client_id, |record, subject| {
                let request = TokenRequest {
                    subject: subject.to_string(),
                    client_id: record.client_id.clone(),
                    scopes: record.scopes.clone(),
                    audience: record.audience.clone(),
                    auth_time: chrono::Utc::now(),
                    amr: vec![PASSWORD_AMR.to_string()],
                };
                self.authorize(&request)?;
                Ok(self.issue(&request, &client))
            })
        })
    }
}

impl KeyStorage for Storage {
    fn signing_key(&self) -> BoxFuture<'_, StorageResult<Arc<SigningKey>>> {
        Box::pin(async move { Ok(Arc::clone(&self.key)) })
    }
}

impl ClaimsStorage for Storage {
    fn userinfo<'a>(&'a self, subject: &'a str, scopes: &'a [String]) -> BoxFuture<'a, StorageResult<UserInfo>> {
        Box::pin(async move {
            let user = self.identity.resolve_by_opaque_id(subject).await?;
            Ok(claims::project(subject, &user.spec.claim, scopes))
        })
    }

    fn userinfo_from_token<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StorageResult<UserInfo>> {
        Box::pin(async move {
            let access = self
                .tokens
                .access_token(token)
                .ok_or_else(|| StorageError::InvalidGrant("invalid access token".to_string()))?;
            self.userinfo(&access.subject, &access.scopes).await
        })
    }

    fn private_claims<'a>(
        &'a self,
        subject: &'a str,
        _scopes: &'a [String],
    ) -> BoxFuture<'a, StorageResult<Map<String, Value>>> {
        Box::pin(async move {
            let key = decode_subject(subject)?;
            let roles: Vec<Value> = self
                .engine
                .roles_for(&key)
                .iter()
                .map(|role| Value::String(role.to_string()))
                .collect();
            let mut claims = Map::new();
            if !roles.is_empty() {
                claims.insert(ROLES_CLAIM.to_string(), Value::Array(roles));
            }
            Ok(claims)
        })
    }
}
