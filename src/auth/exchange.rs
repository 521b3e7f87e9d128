//! Token endpoint exchanges
//!
//! Two grants are supported against `POST <auth-host>/oauth/token`:
//! - `authorization_code`: a single-use code becomes a refresh token plus an
//!   access token
//! - `refresh_token`: the refresh token mints a new access token
//!
//! Successful results are written to the credential store before they are
//! returned. Failures write nothing.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use crate::Result;
use crate::error::Error;
use super::clock::Clock;
use super::store::CredentialStore;
use super::types::{compute_expiry, AccessToken, AuthorizationCode, ClientCredential, RefreshToken};

/// Lifetime assumed when the provider omits `expires_in` (20 minutes)
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 1200;

/// Subtracted from the advertised lifetime so a token is never sent in its
/// last minute
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 60;

/// Accepted range for an advertised `expires_in`; anything outside is a malformed response
const EXPIRES_IN_RANGE: std::ops::RangeInclusive<i64> = 2..=86_400;

/// Token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Authorization code grant
#[derive(Debug, Serialize)]
struct CodeGrantRequest<'a> {
    grant_type: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Refresh token grant
#[derive(Debug, Serialize)]
struct RefreshGrantRequest<'a> {
    grant_type: &'a str,
    refresh_token: &'a str,
    redirect_uri: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
}

/// Performs the OAuth2 token exchanges for one client
pub struct TokenExchanger {
    http_client: Client,
    token_url: String,
    credential: ClientCredential,
    redirect_uri: String,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    expiry_margin_secs: i64,
}

impl TokenExchanger {
    /// Create an exchanger whose HTTP calls time out after `timeout`
    pub fn new(
        token_url: impl Into<String>,
        credential: ClientCredential,
        redirect_uri: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            token_url: token_url.into(),
            credential,
            redirect_uri: redirect_uri.into(),
            store,
            clock,
            expiry_margin_secs: DEFAULT_EXPIRY_MARGIN_SECS,
        })
    }

    pub fn with_expiry_margin(mut self, secs: i64) -> Self {
        self.expiry_margin_secs = secs;
        self
    }

    pub fn credential(&self) -> &ClientCredential {
        &self.credential
    }

    /// Exchange a single-use authorization code for a refresh token.
    ///
    /// The returned pair is persisted in one store write, which also consumes
    /// the stored authorization code.
    pub async fn exchange_code_for_refresh_token(
        &self,
        code: &AuthorizationCode,
    ) -> Result<(RefreshToken, AccessToken)> {
        tracing::info!("Exchanging authorization code for a refresh token");

        let request = CodeGrantRequest {
            grant_type: "authorization_code",
            code: &code.code,
            redirect_uri: &self.redirect_uri,
            client_id: &self.credential.client_id,
            client_secret: self.credential.client_secret(),
        };

        let (status, body, response) = self.post(&request).await?;

        let (access, refresh) = match (response.access_token, response.refresh_token) {
            (Some(access), Some(refresh)) if !access.is_empty() && !refresh.is_empty() => (access, refresh),
            _ => {
                return Err(Error::TokenExchange {
                    status,
                    body: format!("response lacks access_token/refresh_token: {}", body),
                })
            }
        };

        let access = self.access_token(status, access, response.expires_in)?;
        let refresh = RefreshToken::new(refresh);
        self.store.save_token_pair(&self.credential.client_id, &refresh, &access)?;

        tracing::info!("Refresh token acquired, access token valid until {}", access.expires_at);
        Ok((refresh, access))
    }

    /// Mint a new access token from the refresh token and persist it.
    ///
    /// On failure the previously stored access token is left untouched.
    pub async fn exchange_refresh_token_for_access_token(&self, refresh: &RefreshToken) -> Result<AccessToken> {
        tracing::debug!("Exchanging refresh token for an access token");

        let request = RefreshGrantRequest {
            grant_type: "refresh_token",
            refresh_token: &refresh.value,
            redirect_uri: &self.redirect_uri,
            client_id: &self.credential.client_id,
            client_secret: self.credential.client_secret(),
        };

        let (status, body, response) = self.post(&request).await?;

        let value = response.access_token
            .filter(|v| !v.is_empty())
            .ok_or_else(|| Error::TokenExchange {
                status,
                body: format!("response lacks access_token: {}", body),
            })?;

        let access = self.access_token(status, value, response.expires_in)?;
        let rotated = response.refresh_token
            .filter(|r| !r.is_empty() && *r != refresh.value)
            .map(RefreshToken::new);
        if rotated.is_some() {
            tracing::info!("Provider rotated the refresh token");
        }
        self.store.save_access_token(&access, rotated.as_ref())?;

        tracing::info!("Access token refreshed, valid until {}", access.expires_at);
        Ok(access)
    }

    /// Build the token, rejecting a lifetime that cannot yield a sane expiry
    fn access_token(&self, status: u16, value: String, expires_in: Option<i64>) -> Result<AccessToken> {
        let ttl = expires_in.unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let expires_at = Some(ttl)
            .filter(|ttl| EXPIRES_IN_RANGE.contains(ttl))
            .and_then(|ttl| compute_expiry(self.clock.now(), ttl, self.expiry_margin_secs))
            .ok_or_else(|| {
                tracing::warn!(expires_in = ttl, "Token endpoint returned an unusable lifetime");
                Error::TokenExchange {
                    status,
                    body: format!(
                        "invalid expires_in {} (expected {}..={} seconds)",
                        ttl,
                        EXPIRES_IN_RANGE.start(),
                        EXPIRES_IN_RANGE.end()
                    ),
                }
            })?;
        Ok(AccessToken::new(value, expires_at))
    }

    /// POST a form to the token endpoint, returning status, raw body and the parsed body
    async fn post<T: Serialize>(&self, form: &T) -> Result<(u16, String, TokenResponse)> {
        let response = self.http_client
            .post(&self.token_url)
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::warn!("Token endpoint returned {}", status);
            return Err(Error::TokenExchange { status: status.as_u16(), body });
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| Error::TokenExchange {
            status: status.as_u16(),
            body: format!("malformed token response ({}): {}", e, body),
        })?;

        Ok((status.as_u16(), body, parsed))
    }
}
