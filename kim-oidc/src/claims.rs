//! Scope-based claim projection (OpenID Connect Core §5.4).

use kim_api::Claim;
use serde::Serialize;
use serde_json::{Map, Value};

pub const SCOPE_OPENID: &str = "openid";
pub const SCOPE_PROFILE: &str = "profile";
pub const SCOPE_EMAIL: &str = "email";
pub const SCOPE_PHONE: &str = "phone";
pub const SCOPE_ADDRESS: &str = "address";
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";

/// Scopes that only select identity data and never name an action.
pub const IDENTITY_SCOPES: &[&str] = &[
    SCOPE_OPENID,
    SCOPE_PROFILE,
    SCOPE_EMAIL,
    SCOPE_PHONE,
    SCOPE_ADDRESS,
    SCOPE_OFFLINE_ACCESS,
];

pub fn is_identity_scope(scope: &str) -> bool {
    IDENTITY_SCOPES.contains(&scope)
}

/// Private claim listing the roles bound to the subject.
pub const ROLES_CLAIM: &str = "roles";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Address {
    pub formatted: String,
}

/// Userinfo response body. Claims the scopes don't cover, or the user
/// doesn't assert, are left out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub birthdate: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoneinfo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
    #[serde(flatten, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

/// Project `claim` onto what `scopes` authorize.
pub fn project(subject: &str, claim: &Claim, scopes: &[String]) -> UserInfo {
    let has = |scope: &str| scopes.iter().any(|s| s == scope);
    let mut info = UserInfo {
        sub: subject.to_string(),
        ..UserInfo::default()
    };
    if has(SCOPE_PROFILE) {
        info.given_name = claim.given_name.clone();
        info.family_name = claim.family_name.clone();
        info.middle_name = claim.middle_name.clone();
        info.nickname = claim.nick_name.clone();
        info.preferred_username = claim.preferred_username.clone();
        info.profile = claim.profile.clone();
        info.picture = claim.picture.clone();
        info.website = claim.website.clone();
        info.gender = claim.gender.clone();
        info.birthdate = claim.birthdate.clone();
        info.zoneinfo = claim.zoneinfo.clone();
        info.locale = claim.locale.clone();
    }
    if has(SCOPE_EMAIL) {
        info.email = claim.email.clone();
        info.email_verified = claim.email_verified;
    }
    if has(SCOPE_PHONE) {
        info.phone_number = claim.phone_number.clone();
        info.phone_number_verified = claim.phone_number_verified;
    }
    if has(SCOPE_ADDRESS) {
        info.address = claim.address.clone().map(|formatted| Address { formatted });
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scopes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn projects_only_granted_scopes() {
        let claim = Claim {
            email: Some("alice@example.com".into()),
            email_verified: Some(true),
            given_name: Some("Alice".into()),
            phone_number: Some("+100".into()),
            ..Claim::default()
        };
        let info = project("sub", &claim, &scopes(&["openid", "email"]));
        assert_eq!(info.email.as_deref(), Some("alice@example.com"));
        assert_eq!(info.email_verified, Some(true));
        assert!(info.given_name.is_none());
        assert!(info.phone_number.is_none());
    }

    #[test]
    fn absent_fields_are_omitted() {
        let claim = Claim {
            given_name: Some("Alice".into()),
            ..Claim::default()
        };
        let info = project("sub", &claim, &scopes(&["openid", "profile", "address"]));
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"sub": "sub", "given_name": "Alice"})
        );
    }

    #[test]
    fn address_is_structured() {
        let claim = Claim {
            address: Some("1 Main St".into()),
            ..Claim::default()
        };
        let info = project("sub", &claim, &scopes(&["address"]));
        assert_eq!(
            serde_json::to_value(&info).unwrap()["address"]["formatted"],
            "1 Main St"
        );
    }
}
