//! Opaque access and refresh tokens.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::RngCore;
use serde::Serialize;

use crate::error::StorageError;

const TOKEN_BYTES: usize = 32;

/// Random base64url handle.
pub(crate) fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Saturates at the largest representable instant.
pub(crate) fn expires_in(ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Everything needed to mint tokens for one subject and client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    /// Hex subject identifier.
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub auth_time: DateTime<Utc>,
    pub amr: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub token: String,
    pub subject: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub auth_time: DateTime<Utc>,
    pub amr: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub access_token: String,
}

impl RefreshToken {
    /// The request a redeemed refresh token stands for.
    pub fn to_request(&self) -> TokenRequest {
        TokenRequest {
            subject: self.subject.clone(),
            client_id: self.client_id.clone(),
            scopes: self.scopes.clone(),
            audience: self.audience.clone(),
            auth_time: self.auth_time,
            amr: self.amr.clone(),
        }
    }
}

/// Tokens handed back to the protocol engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub scopes: Vec<String>,
}

/// RFC 7662 style view of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Introspection {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aud: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            client_id: None,
            scope: None,
            aud: Vec::new(),
            exp: None,
        }
    }
}

impl From<&AccessToken> for Introspection {
    fn from(token: &AccessToken) -> Self {
        Self {
            active: true,
            sub: Some(token.subject.clone()),
            client_id: Some(token.client_id.clone()),
            scope: Some(token.scopes.join(" ")),
            aud: token.audience.clone(),
            exp: Some(token.expires_at.timestamp()),
        }
    }
}

/// In-memory token table.
///
/// Refresh tokens are single use: [`TokenStore::rotate`] removes the
/// presented token and its access token before a new pair is minted.
pub struct TokenStore {
    access: DashMap<String, AccessToken>,
    refresh: DashMap<String, RefreshToken>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenStore {
    pub fn new(access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            access: DashMap::new(),
            refresh: DashMap::new(),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn issue_access(&self, request: &TokenRequest) -> AccessToken {
        self.insert_access(request, None)
    }

    pub fn issue_pair(&self, request: &TokenRequest) -> (AccessToken, RefreshToken) {
        let refresh_handle = random_token();
        let access = self.insert_access(request, Some(refresh_handle.clone()));
        let refresh = RefreshToken {
            token: refresh_handle.clone(),
            subject: request.subject.clone(),
            client_id: request.client_id.clone(),
            scopes: request.scopes.clone(),
            audience: request.audience.clone(),
            auth_time: request.auth_time,
            amr: request.amr.clone(),
            expires_at: expires_in(self.refresh_ttl),
            access_token: access.token.clone(),
        };
        self.refresh.insert(refresh_handle, refresh.clone());
        (access, refresh)
    }

    fn insert_access(&self, request: &TokenRequest, refresh: Option<String>) -> AccessToken {
        let token = AccessToken {
            token: random_token(),
            subject: request.subject.clone(),
            client_id: request.client_id.clone(),
            scopes: request.scopes.clone(),
            audience: request.audience.clone(),
            expires_at: expires_in(self.access_ttl),
            refresh_token: refresh,
        };
        self.access.insert(token.token.clone(), token.clone());
        token
    }

    /// Look up a refresh token presented by `client_id` without consuming it.
    pub fn refresh_token(&self, token: &str, client_id: &str) -> Result<RefreshToken, StorageError> {
        let invalid = || StorageError::InvalidGrant("invalid refresh token".to_string());
        let found = self.refresh.get(token).map(|t| t.value().clone()).ok_or_else(invalid)?;
        if found.client_id != client_id {
            return Err(invalid());
        }
        if found.expires_at <= Utc::now() {
            self.refresh.remove(token);
            return Err(StorageError::InvalidGrant("refresh token expired".to_string()));
        }
        Ok(found)
    }

    /// Consume a refresh token. Only one concurrent caller wins.
    pub fn rotate(&self, token: &str, client_id: &str) -> Result<RefreshToken, StorageError> {
        self.refresh_token(token, client_id)?;
        let (_, old) = self
            .refresh
            .remove(token)
            .ok_or_else(|| StorageError::InvalidGrant("refresh token already used".to_string()))?;
        self.access.remove(&old.access_token);
        Ok(old)
    }

    /// Active access token by handle.
    pub fn access_token(&self, token: &str) -> Option<AccessToken> {
        let found = self.access.get(token).map(|t| t.value().clone())?;
        if found.expires_at <= Utc::now() {
            self.access.remove(token);
            return None;
        }
        Some(found)
    }

    /// Revoke an access or refresh token issued to `client_id`.
    ///
    /// Unknown tokens are not an error (RFC 7009 §2.2). Revoking a refresh
    /// token also revokes its access token.
    pub fn revoke(&self, token: &str, client_id: &str) -> Result<(), StorageError> {
        if let Some(owner) = self.refresh.get(token).map(|t| t.client_id.clone()) {
            if owner != client_id {
                return Err(StorageError::InvalidClient(
                    "token was issued to another client".to_string(),
                ));
            }
            if let Some((_, old)) = self.refresh.remove(token) {
                self.access.remove(&old.access_token);
            }
            return Ok(());
        }
        if let Some(owner) = self.access.get(token).map(|t| t.client_id.clone()) {
            if owner != client_id {
                return Err(StorageError::InvalidClient(
                    "token was issued to another client".to_string(),
                ));
            }
            self.access.remove(token);
        }
        Ok(())
    }

    /// Drop every token of `subject` issued to `client_id`.
    pub fn terminate_session(&self, subject: &str, client_id: &str) -> usize {
        let before = self.access.len() + self.refresh.len();
        self.access
            .retain(|_, t| !(t.subject == subject && t.client_id == client_id));
        self.refresh
            .retain(|_, t| !(t.subject == subject && t.client_id == client_id));
        before.saturating_sub(self.access.len() + self.refresh.len())
    }

    /// Remove expired tokens. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.access.len() + self.refresh.len();
        self.access.retain(|_, t| t.expires_at > now);
        self.refresh.retain(|_, t| t.expires_at > now);
        before.saturating_sub(self.access.len() + self.refresh.len())
    }
}
