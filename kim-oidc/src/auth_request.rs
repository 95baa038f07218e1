//! Pending authorization-code requests.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::client::ResponseType;
use crate::error::StorageError;
use crate::token::{expires_in, TokenRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "plain")]
    Plain,
    S256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

/// Parameters of an incoming authorization request.
#[derive(Debug, Clone, Default)]
pub struct AuthRequestParams {
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
    pub login_hint: Option<String>,
    pub max_age: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub response_type: ResponseType,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
    pub login_hint: Option<String>,
    pub max_age: Option<Duration>,
    /// Hex subject, set once the user has authenticated.
    pub subject: Option<String>,
    pub auth_time: Option<DateTime<Utc>>,
    pub amr: Vec<String>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl AuthRequest {
    /// Token request for a completed authorization. `None` until the user
    /// has logged in.
    pub fn token_request(&self) -> Option<TokenRequest> {
        let subject = self.subject.clone().filter(|_| self.done)?;
        Some(TokenRequest {
            subject,
            client_id: self.client_id.clone(),
            scopes: self.scopes.clone(),
            audience: self.audience.clone(),
            auth_time: self.auth_time.unwrap_or(self.created_at),
            amr: self.amr.clone(),
        })
    }
}

pub struct AuthRequestStore {
    requests: DashMap<String, AuthRequest>,
    /// code -> request id
    codes: DashMap<String, String>,
    lifetime: Duration,
}

impl AuthRequestStore {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            requests: DashMap::new(),
            codes: DashMap::new(),
            lifetime,
        }
    }

    /// Store a request. `response_type` must already be validated by the
    /// caller.
    pub fn create(&self, params: AuthRequestParams, response_type: ResponseType) -> AuthRequest {
        let now = Utc::now();
        let audience = if params.audience.is_empty() {
            vec![params.client_id.clone()]
        } else {
            params.audience
        };
        let request = AuthRequest {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: params.client_id,
            redirect_uri: params.redirect_uri,
            response_type,
            scopes: params.scopes,
            audience,
            state: params.state,
            nonce: params.nonce,
            code_challenge: params.code_challenge,
            login_hint: params.login_hint,
            max_age: params.max_age,
            subject: None,
            auth_time: None,
            amr: Vec::new(),
            done: false,
            created_at: now,
            expires_at: expires_in(self.lifetime),
        };
        self.requests.insert(request.id.clone(), request.clone());
        request
    }

    pub fn get(&self, id: &str) -> Result<AuthRequest, StorageError> {
        let request = self
            .requests
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::NotFound(format!("auth request {id}")))?;
        if request.expires_at <= Utc::now() {
            self.delete(id);
            return Err(StorageError::InvalidRequest(format!(
                "auth request {id} expired"
            )));
        }
        Ok(request)
    }

    pub fn get_by_code(&self, code: &str) -> Result<AuthRequest, StorageError> {
        let id = self
            .codes
            .get(code)
            .map(|c| c.value().clone())
            .ok_or_else(|| StorageError::InvalidGrant("unknown authorization code".to_string()))?;
        self.get(&id)
            .map_err(|_| StorageError::InvalidGrant("authorization code expired".to_string()))
    }

    pub fn save_code(&self, id: &str, code: &str) -> Result<(), StorageError> {
        self.get(id)?;
        self.codes.insert(code.to_string(), id.to_string());
        Ok(())
    }

    /// Bind the authenticated subject and mark the request done.
    pub fn complete(&self, id: &str, subject: String, amr: &[&str]) -> Result<(), StorageError> {
        self.get(id)?;
        let mut request = self
            .requests
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(format!("auth request {id}")))?;
        request.subject = Some(subject);
        request.auth_time = Some(Utc::now());
        request.amr = amr.iter().map(|s| s.to_string()).collect();
        request.done = true;
        Ok(())
    }

    /// Remove a request and any codes pointing at it.
    pub fn delete(&self, id: &str) {
        self.requests.remove(id);
        self.codes.retain(|_, request_id| request_id != id);
    }

    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = self
            .requests
            .iter()
            .filter(|r| r.expires_at <= now)
            .map(|r| r.key().clone())
            .collect();
        for id in &expired {
            self.delete(id);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> AuthRequestParams {
        AuthRequestParams {
            client_id: "web".into(),
            redirect_uri: "https://app/cb".into(),
            response_type: "code".into(),
            scopes: vec!["openid".into()],
            ..Default::default()
        }
    }

    #[test]
    fn code_lookup_after_completion() {
        let store = AuthRequestStore::new(Duration::from_secs(60));
        let request = store.create(params(), ResponseType::Code);
        assert_eq!(request.audience, vec!["web".to_string()]);
        assert!(request.token_request().is_none());

        store.complete(&request.id, "abcd".into(), &["pwd"]).unwrap();
        store.save_code(&request.id, "code-1").unwrap();
        let found = store.get_by_code("code-1").unwrap();
        assert!(found.done);
        assert_eq!(found.token_request().unwrap().subject, "abcd");

        store.delete(&request.id);
        assert!(matches!(
            store.get_by_code("code-1"),
            Err(StorageError::InvalidGrant(_))
        ));
    }

    #[test]
    fn expired_requests_are_rejected() {
        let store = AuthRequestStore::new(Duration::ZERO);
        let request = store.create(params(), ResponseType::Code);
        assert!(matches!(
            store.get(&request.id),
            Err(StorageError::InvalidRequest(_))
        ));
        assert!(store.is_empty());
    }
}
