//! Credential and token types

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::fmt;

/// API key and secret issued to the application
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredential {
    pub client_id: String,
    client_secret: String,
}

impl ClientCredential {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredential")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Single-use code returned by the identity provider after browser login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub issued_at: DateTime<Utc>,
}

impl AuthorizationCode {
    pub fn new(code: impl Into<String>, issued_at: DateTime<Utc>) -> Self {
        Self {
            code: code.into(),
            issued_at: issued_at.trunc_subsecs(0),
        }
    }
}

/// Long-lived credential used to mint access tokens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub value: String,
}

impl RefreshToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// Short-lived bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            expires_at,
        }
    }

    /// Usable strictly before `expires_at`; a token expiring exactly now is stale
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left before the token must be replaced, zero once stale
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).max(Duration::zero())
    }
}

/// Expiry for a token acquired at `now` with an advertised lifetime of `ttl_secs`.
///
/// The safety margin is clamped so the result always lies strictly between
/// `now` and `now + ttl_secs`, and the result is truncated to whole seconds so
/// it survives the storage format unchanged. A lifetime under two seconds
/// leaves no such instant, and an absurd one overflows; both yield `None`.
pub fn compute_expiry(now: DateTime<Utc>, ttl_secs: i64, margin_secs: i64) -> Option<DateTime<Utc>> {
    if ttl_secs < 2 {
        return None;
    }
    let margin = margin_secs.clamp(1, ttl_secs - 1);
    let lifetime = Duration::try_seconds(ttl_secs - margin)?;
    now.trunc_subsecs(0).checked_add_signed(lifetime)
}
