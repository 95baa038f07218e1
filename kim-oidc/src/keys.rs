use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::EncodePrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::Serialize;

use crate::error::StorageError;

const KEY_BITS: usize = 2048;

/// RSA key pair handed to the protocol engine for signing, plus its JWKS
/// form for publication.
pub struct SigningKey {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    n: String,
    e: String,
    kid: String,
}

impl SigningKey {
    /// Generate a new RSA-2048 key pair.
    pub fn generate(kid: &str) -> Result<Self, StorageError> {
        let internal = |what: &str, e: &dyn std::fmt::Display| {
            StorageError::Internal(format!("signing key {what}: {e}"))
        };
        let private_key =
            RsaPrivateKey::new(&mut OsRng, KEY_BITS).map_err(|e| internal("generation", &e))?;
        let public_key = RsaPublicKey::from(&private_key);

        let pkcs8_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| internal("export", &e))?;
        let encoding_key =
            EncodingKey::from_rsa_pem(pkcs8_pem.as_bytes()).map_err(|e| internal("encoding", &e))?;

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key =
            DecodingKey::from_rsa_components(&n, &e).map_err(|err| internal("decoding", &err))?;

        tracing::info!(kid, "generated signing key");
        Ok(Self {
            encoding_key,
            decoding_key,
            n,
            e,
            kid: kid.to_string(),
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn algorithm(&self) -> Algorithm {
        Algorithm::RS256
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> DecodingKey {
        self.decoding_key.clone()
    }

    /// Public key set containing this key.
    pub fn key_set(&self) -> KeySet<'_> {
        KeySet {
            keys: vec![JwkEntry {
                kty: "RSA",
                alg: "RS256",
                r#use: "sig",
                kid: &self.kid,
                n: &self.n,
                e: &self.e,
            }],
        }
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey").field("kid", &self.kid).finish()
    }
}

/// JWKS document.
#[derive(Debug, Serialize)]
pub struct KeySet<'a> {
    pub keys: Vec<JwkEntry<'a>>,
}

#[derive(Debug, Serialize)]
pub struct JwkEntry<'a> {
    pub kty: &'a str,
    pub alg: &'a str,
    #[serde(rename = "use")]
    pub r#use: &'a str,
    pub kid: &'a str,
    pub n: &'a str,
    pub e: &'a str,
}
