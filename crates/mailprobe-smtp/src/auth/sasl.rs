//! SASL payload encoders.
//!
//! - PLAIN (RFC 4616): `\0<user>\0<password>`
//! - LOGIN: each prompt answer on its own
//! - XOAUTH2: `user=<user>\x01auth=Bearer <token>\x01\x01`
//! - OAUTHBEARER (RFC 7628): `n,a=<user>,\x01auth=Bearer <token>\x01\x01`
//!
//! Every payload is returned base64 encoded, ready for the wire.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Deserialize;

/// PLAIN initial response with an empty authorization identity.
#[must_use]
pub fn plain_response(username: &str, password: &str) -> String {
    STANDARD.encode(format!("\0{username}\0{password}"))
}

/// Answer to a single LOGIN prompt (`Username:` or `Password:`).
#[must_use]
pub fn login_response(value: &str) -> String {
    STANDARD.encode(value)
}

/// XOAUTH2 initial response.
#[must_use]
pub fn xoauth2_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("user={user}\x01auth=Bearer {token}\x01\x01"))
}

/// OAUTHBEARER initial response.
#[must_use]
pub fn oauthbearer_response(user: &str, token: &str) -> String {
    STANDARD.encode(format!("n,a={user},\x01auth=Bearer {token}\x01\x01"))
}

/// Client reply that aborts a failed OAUTHBEARER exchange (`\x01`).
pub const OAUTHBEARER_ABORT: &str = "AQ==";

/// Decodes a base64 334 challenge. Returns `None` if it is not valid base64.
#[must_use]
pub fn decode_challenge(challenge: &str) -> Option<String> {
    STANDARD
        .decode(challenge.trim())
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Error details a server sends in a 334 challenge after rejecting a token.
///
/// Shape: `{"status":"401","schemes":"bearer","scope":"..."}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OAuthError {
    /// HTTP-style status code.
    pub status: String,
    /// Accepted authentication schemes.
    #[serde(default)]
    pub schemes: Option<String>,
    /// Scope the token needs.
    #[serde(default)]
    pub scope: Option<String>,
}

impl OAuthError {
    /// Decodes and parses a base64 334 challenge.
    #[must_use]
    pub fn from_challenge(challenge: &str) -> Option<Self> {
        decode_challenge(challenge).and_then(|json| serde_json::from_str(&json).ok())
    }
}

impl std::fmt::Display for OAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.status)?;
        if let Some(scope) = &self.scope {
            write!(f, ", scope {scope}")?;
        }
        Ok(())
    }
}
