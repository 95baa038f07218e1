//! Device authorization grant (RFC 8628) records.
//!
//! A record moves from `Pending` to exactly one terminal state. Once
//! terminal, every poll returns the same outcome.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;

use crate::error::StorageError;
use crate::token::{expires_in, random_token, TokenSet};

/// Consonants only, so codes never spell words and survive case folding.
pub const USER_CODE_ALPHABET: &[u8] = b"BCDFGHJKLMNPQRSTVWXZ";
const USER_CODE_HALF: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Pending,
    /// Approved by the user; tokens not minted yet.
    Approved { subject: String },
    Denied,
    Expired,
    Completed(TokenSet),
}

impl DeviceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeviceState::Denied | DeviceState::Expired | DeviceState::Completed(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub audience: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: DeviceState,
}

/// Response of the device authorization endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub expires_in: u64,
    pub interval: u64,
}

/// Generate a `XXXX-XXXX` user code.
pub fn generate_user_code() -> String {
    let mut rng = rand::thread_rng();
    let mut pick = || USER_CODE_ALPHABET[rng.gen_range(0..USER_CODE_ALPHABET.len())] as char;
    let first: String = (0..USER_CODE_HALF).map(|_| pick()).collect();
    let second: String = (0..USER_CODE_HALF).map(|_| pick()).collect();
    format!("{first}-{second}")
}

/// Canonical form of user input: upper case, separators and spaces
/// dropped, dash re-inserted.
pub fn normalize_user_code(input: &str) -> Option<String> {
    let chars: String = input
        .chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if chars.len() != USER_CODE_HALF * 2
        || !chars.bytes().all(|b| USER_CODE_ALPHABET.contains(&b))
    {
        return None;
    }
    let (first, second) = chars.split_at(USER_CODE_HALF);
    Some(format!("{first}-{second}"))
}

pub struct DeviceStore {
    by_device_code: DashMap<String, DeviceAuthorization>,
    /// user code -> device code
    by_user_code: DashMap<String, String>,
    lifetime: Duration,
    poll_interval: Duration,
}

impl DeviceStore {
    pub fn new(lifetime: Duration, poll_interval: Duration) -> Self {
        Self {
            by_device_code: DashMap::new(),
            by_user_code: DashMap::new(),
            lifetime,
            poll_interval,
        }
    }

    pub fn create(
        &self,
        client_id: &str,
        scopes: Vec<String>,
        audience: Vec<String>,
    ) -> DeviceAuthorization {
        let device_code = random_token();
        let user_code = loop {
            let candidate = generate_user_code();
            if let Entry::Vacant(slot) = self.by_user_code.entry(candidate.clone()) {
                slot.insert(device_code.clone());
                break candidate;
            }
        };
        let record = DeviceAuthorization {
            device_code: device_code.clone(),
            user_code,
            client_id: client_id.to_string(),
            scopes,
            audience,
            created_at: Utc::now(),
            expires_at: expires_in(self.lifetime),
            state: DeviceState::Pending,
        };
        self.by_device_code.insert(device_code, record.clone());
        record
    }

    pub fn response(&self, record: &DeviceAuthorization) -> DeviceCodeResponse {
        DeviceCodeResponse {
            device_code: record.device_code.clone(),
            user_code: record.user_code.clone(),
            expires_in: self.lifetime.as_secs(),
            interval: self.poll_interval.as_secs(),
        }
    }

    pub fn by_user_code(&self, user_code: &str) -> Result<DeviceAuthorization, StorageError> {
        let device_code = self.device_code_for(user_code)?;
        self.by_device_code
            .get(&device_code)
            .map(|r| r.value().clone())
            .ok_or_else(|| StorageError::NotFound(format!("user code {user_code}")))
    }

    fn device_code_for(&self, user_code: &str) -> Result<String, StorageError> {
        normalize_user_code(user_code)
            .and_then(|code| self.by_user_code.get(&code).map(|d| d.value().clone()))
            .ok_or_else(|| StorageError::NotFound(format!("user code {user_code}")))
    }

    /// Record the user's approval. Only a pending, unexpired record can be
    /// approved.
    pub fn approve(&self, user_code: &str, subject: String) -> Result<(), StorageError> {
        self.decide(user_code, DeviceState::Approved { subject })
    }

    pub fn deny(&self, user_code: &str) -> Result<(), StorageError> {
        self.decide(user_code, DeviceState::Denied)
    }

    fn decide(&self, user_code: &str, decision: DeviceState) -> Result<(), StorageError> {
        let device_code = self.device_code_for(user_code)?;
        let mut record = self
            .by_device_code
            .get_mut(&device_code)
            .ok_or_else(|| StorageError::NotFound(format!("user code {user_code}")))?;
        expire_if_due(&mut record);
        match record.state {
            DeviceState::Pending => {
                record.state = decision;
                Ok(())
            }
            DeviceState::Expired => Err(StorageError::ExpiredToken),
            _ => Err(StorageError::InvalidRequest(format!(
                "user code {user_code} was already used"
            ))),
        }
    }

    /// Poll for the outcome of a device authorization.
    ///
    /// `issue` runs at most once per record, under the record's lock, when
    /// the first poll after approval arrives. Its result becomes the
    /// terminal state. An `AuthorizationDenied` from `issue` turns the
    /// record into `Denied`.
    pub fn poll<F>(&self, device_code: &str, client_id: &str, issue: F) -> Result<TokenSet, StorageError>
    where
        F: FnOnce(&DeviceAuthorization, &str) -> Result<TokenSet, StorageError>,
    {
        let mut record = self
            .by_device_code
            .get_mut(device_code)
            .ok_or_else(|| StorageError::InvalidGrant("unknown device code".to_string()))?;
        if record.client_id != client_id {
            return Err(StorageError::InvalidGrant(
                "device code was issued to another client".to_string(),
            ));
        }
        expire_if_due(&mut record);
        match &record.state {
            DeviceState::Pending => Err(StorageError::AuthorizationPending),
            DeviceState::Denied => Err(StorageError::AccessDenied),
            DeviceState::Expired => Err(StorageError::ExpiredToken),
            DeviceState::Completed(tokens) => Ok(tokens.clone()),
            DeviceState::Approved { subject } => {
                let subject = subject.clone();
                match issue(record.value(), &subject) {
                    Ok(tokens) => {
                        record.state = DeviceState::Completed(tokens.clone());
                        Ok(tokens)
                    }
                    Err(err @ StorageError::AuthorizationDenied { .. }) => {
                        record.state = DeviceState::Denied;
                        Err(err)
                    }
                    Err(err) => Err(err),
                }
            }
        }
    }

    /// Drop records whose lifetime has passed. Completed records are kept
    /// until then so repeated polls keep seeing the same tokens.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<(String, String)> = self
            .by_device_code
            .iter()
            .filter(|r| r.expires_at <= now)
            .map(|r| (r.device_code.clone(), r.user_code.clone()))
            .collect();
        for (device_code, user_code) in &expired {
            self.by_device_code.remove(device_code);
            self.by_user_code.remove(user_code);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.by_device_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_device_code.is_empty()
    }
}

fn expire_if_due(record: &mut DeviceAuthorization) {
    let open = matches!(
        record.state,
        DeviceState::Pending | DeviceState::Approved { .. }
    );
    if open && record.expires_at <= Utc::now() {
        record.state = DeviceState::Expired;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(tag: &str) -> TokenSet {
        TokenSet {
            access_token: tag.to_string(),
            refresh_token: None,
            expires_at: Utc::now(),
            scopes: vec!["openid".into()],
        }
    }

    #[test]
    fn user_codes_use_the_consonant_alphabet() {
        for _ in 0..50 {
            let code = generate_user_code();
            assert_eq!(code.len(), 9);
            assert_eq!(&code[4..5], "-");
            assert!(code
                .bytes()
                .filter(|b| *b != b'-')
                .all(|b| USER_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn normalizes_user_input() {
        assert_eq!(normalize_user_code("bcdf ghjk").as_deref(), Some("BCDF-GHJK"));
        assert_eq!(normalize_user_code("BCDF-GHJK").as_deref(), Some("BCDF-GHJK"));
        assert_eq!(normalize_user_code("ABCD-EFGH"), None);
        assert_eq!(normalize_user_code("BCD"), None);
    }

    #[test]
    fn issue_runs_once() {
        let store = DeviceStore::new(Duration::from_secs(300), Duration::from_secs(5));
        let record = store.create("native", vec!["openid".into()], vec!["native".into()]);
        let mut calls = 0;
        assert_eq!(
            store.poll(&record.device_code, "native", |_, _| unreachable!()),
            Err(StorageError::AuthorizationPending)
        );
        store.approve(&record.user_code.to_lowercase(), "61".into()).unwrap();

        let first = store
            .poll(&record.device_code, "native", |_, subject| {
                calls += 1;
                assert_eq!(subject, "61");
                Ok(tokens("t1"))
            })
            .unwrap();
        let second = store
            .poll(&record.device_code, "native", |_, _| Ok(tokens("t2")))
            .unwrap();
        assert_eq!(calls, 1);
        assert_eq!(first, second);
        assert!(store.deny(&record.user_code).is_err());
    }

    #[test]
    fn denial_and_expiry_are_terminal() {
        let store = DeviceStore::new(Duration::from_secs(300), Duration::from_secs(5));
        let record = store.create("native", Vec::new(), Vec::new());
        store.deny(&record.user_code).unwrap();
        for _ in 0..2 {
            assert_eq!(
                store.poll(&record.device_code, "native", |_, _| unreachable!()),
                Err(StorageError::AccessDenied)
            );
        }

        let short = DeviceStore::new(Duration::ZERO, Duration::from_secs(5));
        let record = short.create("native", Vec::new(), Vec::new());
        assert_eq!(
            short.approve(&record.user_code, "61".into()),
            Err(StorageError::ExpiredToken)
        );
        assert_eq!(
            short.poll(&record.device_code, "native", |_, _| unreachable!()),
            Err(StorageError::ExpiredToken)
        );
        assert_eq!(short.purge_expired(), 1);
        assert!(short.by_user_code(&record.user_code).is_err());
    }

    #[test]
    fn wrong_client_cannot_poll() {
        let store = DeviceStore::new(Duration::from_secs(300), Duration::from_secs(5));
        let record = store.create("native", Vec::new(), Vec::new());
        assert!(matches!(
            store.poll(&record.device_code, "web", |_, _| unreachable!()),
            Err(StorageError::InvalidGrant(_))
        ));
    }
}
