use kim_api::ObjectKey;
use kim_oidc::{decode_subject, encode_subject, username};

use super::CommandResult;

pub fn encode(name: &str, namespace: &str) -> String {
    encode_subject(&ObjectKey::new(namespace, name))
}

/// Decode to the `name/namespace` username.
pub fn decode(opaque_id: &str) -> CommandResult<String> {
    Ok(username(&decode_subject(opaque_id)?))
}
