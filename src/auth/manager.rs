//! Access token lifecycle
//!
//! [`TokenManager::get_valid_access_token`] is the gate every authenticated
//! request passes through. It hands out the cached token while it is valid and
//! lazily refreshes it otherwise. Refreshes are serialized behind a mutex, so
//! concurrent callers share one round-trip instead of racing the token
//! endpoint.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use crate::Result;
use crate::error::Error;
use super::clock::Clock;
use super::exchange::TokenExchanger;
use super::store::{CredentialStore, StoredCredentials};
use super::types::AccessToken;

/// Backoff policy for transient refresh failures
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

/// Anything that can produce a bearer token for an API call
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<AccessToken>;
}

/// Hands out valid access tokens, refreshing on demand
pub struct TokenManager {
    exchanger: TokenExchanger,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(exchanger: TokenExchanger, store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            exchanger,
            store,
            clock,
            retry: RetryPolicy::default(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn exchanger(&self) -> &TokenExchanger {
        &self.exchanger
    }

    /// Return an access token that is valid right now.
    ///
    /// A cached token is returned without any network call. An expired one is
    /// replaced through the refresh grant. [`Error::RefreshTokenInvalid`] means
    /// the login flow has to be run again.
    pub async fn get_valid_access_token(&self) -> Result<AccessToken> {
        if let Some(token) = self.cached_token()? {
            tracing::debug!("Using cached access token");
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Whoever held the lock before us may have refreshed already
        if let Some(token) = self.cached_token()? {
            tracing::debug!("Access token refreshed by a concurrent caller");
            return Ok(token);
        }

        tracing::info!("Access token expired, refreshing");
        self.refresh_locked().await
    }

    /// Refresh unconditionally
    pub async fn force_refresh(&self) -> Result<AccessToken> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Stored access token, valid or not
    pub fn current_access_token(&self) -> Result<Option<AccessToken>> {
        Ok(self.store.load()?.access_token)
    }

    fn cached_token(&self) -> Result<Option<AccessToken>> {
        let state = self.store.load()?;
        if !self.owns(&state) {
            return Ok(None);
        }
        let now = self.clock.now();
        Ok(state.access_token.filter(|token| token.is_valid_at(now)))
    }

    /// Tokens issued to a different client are never handed out
    fn owns(&self, state: &StoredCredentials) -> bool {
        match &state.client_id {
            Some(id) => *id == self.exchanger.credential().client_id,
            None => true,
        }
    }

    async fn refresh_locked(&self) -> Result<AccessToken> {
        let state = self.store.load()?;
        if !self.owns(&state) {
            return Err(Error::RefreshTokenInvalid(
                "stored tokens belong to a different client id; run the login flow".to_string(),
            ));
        }
        let refresh = state.refresh_token.ok_or_else(|| {
            Error::RefreshTokenInvalid("no refresh token stored; run the login flow".to_string())
        })?;

        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.exchanger.exchange_refresh_token_for_access_token(&refresh).await {
                Ok(token) => return Ok(token),
                Err(e) if is_refresh_rejection(&e) => {
                    tracing::warn!("Refresh token rejected by provider");
                    return Err(Error::RefreshTokenInvalid(e.to_string()));
                }
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    tracing::warn!(attempt, err = %e, "Refresh attempt failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.retry.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Whether a failed refresh means the refresh token itself is dead
fn is_refresh_rejection(err: &Error) -> bool {
    match err {
        Error::TokenExchange { status, body } => {
            matches!(status, 401 | 403) || ((400..500).contains(status) && body.contains("invalid_grant"))
        }
        _ => false,
    }
}

#[async_trait]
impl AccessTokenSource for TokenManager {
    async fn access_token(&self) -> Result<AccessToken> {
        self.get_valid_access_token().await
    }
}
