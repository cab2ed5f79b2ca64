//! Unverified inspection of access tokens.
//!
//! The backend signs every token and checks the signature on each request.
//! The client only peeks at the payload to decide whether to renew before
//! navigating, so nothing here verifies a signature and none of it may be
//! used to grant access.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use super::AuthError;

/// Payload claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AccessClaims {
    /// Expiry, seconds since the Unix epoch
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub jti: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.exp <= now.timestamp()
    }

    /// Seconds until expiry, zero once expired
    pub fn seconds_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.exp - now.timestamp()).max(0)
    }
}

/// Decode the payload segment of a JWT without checking its signature.
pub fn decode_claims(token: &str) -> Result<AccessClaims, AuthError> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_header), Some(payload), Some(_signature), None) => payload,
        _ => {
            return Err(AuthError::MalformedCredential(
                "expected three dot-separated segments".to_string(),
            ))
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AuthError::MalformedCredential(format!("payload is not base64url: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::MalformedCredential(format!("payload has no usable exp claim: {}", e)))
}

/// Whether the token has expired as of `now`. Undecodable tokens count as expired.
pub fn is_expired_at(token: &str, now: DateTime<Utc>) -> bool {
    match decode_claims(token) {
        Ok(claims) => claims.is_expired_at(now),
        Err(e) => {
            warn!(error = %e, "Treating undecodable access token as expired");
            true
        }
    }
}

/// Whether the token has expired according to the wall clock.
pub fn is_expired(token: &str) -> bool {
    is_expired_at(token, Utc::now())
}
