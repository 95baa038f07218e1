//! Capability traits the protocol engine consumes, one per concern.
//!
//! [`Storage`](crate::Storage) implements all of them; each can also be
//! implemented or mocked on its own.

use std::sync::Arc;

use kim_store::BoxFuture;
use serde_json::{Map, Value};

use crate::auth_request::{AuthRequest, AuthRequestParams};
use crate::claims::UserInfo;
use crate::client::{Client, ClientRegistry};
use crate::device::{DeviceAuthorization, DeviceCodeResponse};
use crate::error::StorageError;
use crate::keys::SigningKey;
use crate::token::{Introspection, TokenRequest, TokenSet};

pub type StorageResult<T> = Result<T, StorageError>;

pub trait ClientStore: Send + Sync {
    fn client_by_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, StorageResult<Arc<Client>>>;

    /// Verify confidential client credentials.
    fn authorize_client<'a>(
        &'a self,
        client_id: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, StorageResult<Arc<Client>>>;
}

impl ClientStore for ClientRegistry {
    fn client_by_id<'a>(&'a self, client_id: &'a str) -> BoxFuture<'a, StorageResult<Arc<Client>>> {
        Box::pin(async move { self.get(client_id) })
    }

    fn authorize_client<'a>(
        &'a self,
        client_id: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, StorageResult<Arc<Client>>> {
        Box::pin(self.authenticate(client_id, secret))
    }
}

pub trait AuthRequestStorage: Send + Sync {
    fn create_auth_request(&self, params: AuthRequestParams) -> BoxFuture<'_, StorageResult<AuthRequest>>;

    fn auth_request_by_id<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<AuthRequest>>;

    fn auth_request_by_code<'a>(&'a self, code: &'a str) -> BoxFuture<'a, StorageResult<AuthRequest>>;

    fn save_auth_code<'a>(&'a self, id: &'a str, code: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    /// Authenticate the end user and bind them to the auth request.
    fn check_username_password<'a>(
        &'a self,
        username: &'a str,
        password: &'a str,
        auth_request_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<()>>;

    fn delete_auth_request<'a>(&'a self, id: &'a str) -> BoxFuture<'a, StorageResult<()>>;
}

pub trait TokenStorage: Send + Sync {
    fn create_access_token<'a>(&'a self, request: &'a TokenRequest) -> BoxFuture<'a, StorageResult<TokenSet>>;

    /// Mint an access and refresh token. With `current_refresh_token` this is
    /// a refresh: the presented token is validated and consumed.
    fn create_access_and_refresh_tokens<'a>(
        &'a self,
        request: &'a TokenRequest,
        current_refresh_token: Option<&'a str>,
    ) -> BoxFuture<'a, StorageResult<TokenSet>>;

    fn token_request_by_refresh_token<'a>(
        &'a self,
        refresh_token: &'a str,
        client_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<TokenRequest>>;

    fn revoke_token<'a>(&'a self, token: &'a str, client_id: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    fn terminate_session<'a>(&'a self, subject: &'a str, client_id: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    fn introspect<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StorageResult<Introspection>>;
}

pub trait DeviceStorage: Send + Sync {
    fn create_device_authorization<'a>(
        &'a self,
        client_id: &'a str,
        scopes: Vec<String>,
    ) -> BoxFuture<'a, StorageResult<DeviceCodeResponse>>;

    fn device_authorization_by_user_code<'a>(
        &'a self,
        user_code: &'a str,
    ) -> BoxFuture<'a, StorageResult<DeviceAuthorization>>;

    fn approve_device_authorization<'a>(
        &'a self,
        user_code: &'a str,
        subject: &'a str,
    ) -> BoxFuture<'a, StorageResult<()>>;

    fn deny_device_authorization<'a>(&'a self, user_code: &'a str) -> BoxFuture<'a, StorageResult<()>>;

    fn poll_device_authorization<'a>(
        &'a self,
        device_code: &'a str,
        client_id: &'a str,
    ) -> BoxFuture<'a, StorageResult<TokenSet>>;
}

pub trait KeyStorage: Send + Sync {
    fn signing_key(&self) -> BoxFuture<'_, StorageResult<Arc<SigningKey>>>;
}

pub trait ClaimsStorage: Send + Sync {
    fn userinfo<'a>(&'a self, subject: &'a str, scopes: &'a [String]) -> BoxFuture<'a, StorageResult<UserInfo>>;

    fn userinfo_from_token<'a>(&'a self, token: &'a str) -> BoxFuture<'a, StorageResult<UserInfo>>;

    /// Claims outside OIDC Core added to ID and access tokens.
    fn private_claims<'a>(
        &'a self,
        subject: &'a str,
        scopes: &'a [String],
    ) -> BoxFuture<'a, StorageResult<Map<String, Value>>>;
}
