//! Unverified JWT claim extraction.
//!
//! Tokens are minted by the PDS we authenticated against and are only ever
//! sent back to it, so the client never checks signatures. It only reads the
//! expiry and scope claims to schedule refreshes and to spot master passwords.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::{BcAuthError, Result};

/// Claims the session lifecycle cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub expiry: DateTime<Utc>,
    pub scope: Option<String>,
    pub subject: Option<String>,
}

/// Extracts claims from a bearer token
pub trait TokenDecoder: Send + Sync {
    fn decode(&self, token: &str) -> Result<TokenClaims>;
}

/// Decodes the payload segment of a compact JWT without verifying it
#[derive(Debug, Clone, Copy, Default)]
pub struct UnverifiedJwtDecoder;

#[derive(Debug, Deserialize)]
struct RawClaims {
    exp: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    sub: Option<String>,
}

impl TokenDecoder for UnverifiedJwtDecoder {
    fn decode(&self, token: &str) -> Result<TokenClaims> {
        let mut segments = token.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(BcAuthError::Decode("token is not a compact JWT".to_string())),
        };

        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .map_err(|e| BcAuthError::Decode(format!("invalid payload encoding: {e}")))?;
        let raw: RawClaims = serde_json::from_slice(&bytes)
            .map_err(|e| BcAuthError::Decode(format!("invalid claims: {e}")))?;

        let exp = raw
            .exp
            .ok_or_else(|| BcAuthError::Decode("missing exp claim".to_string()))?;
        let expiry = DateTime::from_timestamp(exp, 0)
            .ok_or_else(|| BcAuthError::Decode(format!("exp claim out of range: {exp}")))?;

        Ok(TokenClaims {
            expiry,
            scope: raw.scope,
            subject: raw.sub,
        })
    }
}

#[cfg(test)]
pub(crate) fn fake_jwt(exp: i64, scope: &str, sub: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"ES256K","typ":"at+jwt"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({ "exp": exp, "scope": scope, "sub": sub, "iat": exp - 7200 })
            .to_string(),
    );
    format!("{header}.{payload}.c2lnbmF0dXJl")
}
