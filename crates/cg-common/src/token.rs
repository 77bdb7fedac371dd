//! Bearer token claims and minting, shared by the server and the
//! `issue_token` operator binary.

use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    /// Claims for `subject`, valid for `ttl_secs` from now.
    pub fn new(subject: &str, name: Option<&str>, ttl_secs: u64) -> Self {
        let now = Utc::now().timestamp() as usize;
        Self {
            sub: subject.to_string(),
            name: name.map(str::to_string),
            exp: now + ttl_secs as usize,
            iat: now,
        }
    }
}

/// Sign `claims` with the configured HS256 secret.
pub fn sign(config: &AuthConfig, claims: &Claims) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
}

/// Mint a token for `subject` using the configured TTL.
pub fn issue(
    config: &AuthConfig,
    subject: &str,
    name: Option<&str>,
) -> Result<String, jsonwebtoken::errors::Error> {
    sign(config, &Claims::new(subject, name, config.token_ttl_secs))
}
