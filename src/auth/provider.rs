//! TradeStationAuth - ties the OAuth2 pieces together
//!
//! - Login: browser authorization, then the code exchange
//! - Token caching and lazy refresh through [`TokenManager`]
//! - Logout and status inspection

use std::sync::Arc;
use crate::Result;
use crate::config::Config;
use crate::error::Error;
use super::acquirer::{AuthorizationCodeAcquirer, BrowserLauncher, SystemBrowser};
use super::clock::{Clock, SystemClock};
use super::exchange::TokenExchanger;
use super::manager::{RetryPolicy, TokenManager};
use super::store::{CredentialStore, FileCredentialStore, StoredCredentials};
use super::types::{AccessToken, RefreshToken};

/// OAuth2 authentication for one TradeStation API key
#[derive(Clone)]
pub struct TradeStationAuth {
    client_id: String,
    scope: String,
    redirect_uri: String,
    store: Arc<dyn CredentialStore>,
    acquirer: Arc<AuthorizationCodeAcquirer>,
    manager: Arc<TokenManager>,
}

impl TradeStationAuth {
    /// File-backed store, system clock and system browser
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(FileCredentialStore::new(config.credentials_path()));
        Self::new(config, store, Arc::new(SystemClock), Arc::new(SystemBrowser))
    }

    /// Create with explicit collaborators
    pub fn new(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Result<Self> {
        let credential = config.client_credential()?;

        let exchanger = TokenExchanger::new(
            config.token_url(),
            credential,
            &config.redirect_uri,
            store.clone(),
            clock.clone(),
            config.http_timeout(),
        )?
        .with_expiry_margin(config.expiry_margin_secs);

        let retry = RetryPolicy {
            attempts: config.refresh_attempts.max(1),
            initial_backoff: config.refresh_backoff(),
            ..RetryPolicy::default()
        };
        let manager = TokenManager::new(exchanger, store.clone(), clock.clone()).with_retry_policy(retry);

        let acquirer = AuthorizationCodeAcquirer::new(
            config.authorize_url(),
            &config.audience,
            store.clone(),
            clock,
            launcher,
        );

        Ok(Self {
            client_id: config.client_id.clone(),
            scope: config.scope.clone(),
            redirect_uri: config.redirect_uri.clone(),
            store,
            acquirer: Arc::new(acquirer),
            manager: Arc::new(manager),
        })
    }

    /// Token lifecycle manager shared with the REST client
    pub fn manager(&self) -> Arc<TokenManager> {
        self.manager.clone()
    }

    /// Run the full browser login and obtain the first token pair
    pub async fn login(&self) -> Result<(RefreshToken, AccessToken)> {
        self.authorize().await?;
        self.exchange_stored_code().await
    }

    /// Capture an authorization code and store it for a later exchange
    pub async fn authorize(&self) -> Result<()> {
        self.acquirer
            .acquire_authorization_code(&self.client_id, &self.scope, &self.redirect_uri)
            .await?;
        Ok(())
    }

    /// Exchange the stored authorization code for a refresh token
    pub async fn exchange_stored_code(&self) -> Result<(RefreshToken, AccessToken)> {
        let code = self.store.load()?.authorization_code.ok_or_else(|| {
            Error::AuthorizationDenied("no authorization code stored; run the login flow".to_string())
        })?;
        self.manager.exchanger().exchange_code_for_refresh_token(&code).await
    }

    /// Get a valid access token value
    pub async fn get_valid_token(&self) -> Result<String> {
        Ok(self.manager.get_valid_access_token().await?.value)
    }

    /// Whether requests can be authenticated without a new login
    pub fn has_valid_credentials(&self) -> Result<bool> {
        let state = self.status()?;
        let owned = state.client_id.as_deref().map_or(true, |id| id == self.client_id);
        Ok(owned && state.refresh_token.is_some())
    }

    pub fn status(&self) -> Result<StoredCredentials> {
        self.store.load()
    }

    /// Remove every stored token
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        tracing::info!("Stored credentials removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::acquirer::PrintUrl;
    use crate::auth::clock::ManualClock;
    use crate::auth::store::MemoryCredentialStore;
    use crate::auth::types::AuthorizationCode;
    use crate::test_support::MockServer;
    use chrono::{Duration, Utc};

    fn config(server: &MockServer) -> Config {
        Config {
            client_id: "key".to_string(),
            client_secret: "secret".to_string(),
            auth_host: server.base_url(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_exchange_stored_code() {
        let server = MockServer::fixed(200, r#"{"access_token":"abc","refresh_token":"xyz","expires_in":1200}"#).await;
        let store = Arc::new(MemoryCredentialStore::new());
        let now = Utc::now();
        store.save_authorization_code("key", &AuthorizationCode::new("AUTH123", now)).unwrap();

        let auth = TradeStationAuth::new(&config(&server), store.clone(), Arc::new(ManualClock::new(now)), Arc::new(PrintUrl)).unwrap();
        assert!(!auth.has_valid_credentials().unwrap());

        let (refresh, _) = auth.exchange_stored_code().await.unwrap();
        assert_eq!(refresh.value, "xyz");
        assert!(auth.has_valid_credentials().unwrap());
        assert_eq!(auth.get_valid_token().await.unwrap(), "abc");
        assert_eq!(server.request_count(), 1);
        assert_eq!(server.requests()[0].path, "/oauth/token");
    }

    #[tokio::test]
    async fn test_exchange_without_code_fails() {
        let server = MockServer::fixed(200, "{}").await;
        let auth = TradeStationAuth::new(
            &config(&server),
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
            Arc::new(PrintUrl),
        ).unwrap();

        let err = auth.exchange_stored_code().await.unwrap_err();
        assert!(matches!(err, Error::AuthorizationDenied(_)));
        assert_eq!(server.request_count(), 0);
    }

    #[tokio::test]
    async fn test_logout_clears_tokens() {
        let server = MockServer::fixed(200, "{}").await;
        let store = Arc::new(MemoryCredentialStore::new());
        let access = AccessToken::new("abc", Utc::now() + Duration::minutes(10));
        store.save_token_pair("key", &RefreshToken::new("xyz"), &access).unwrap();

        let auth = TradeStationAuth::new(&config(&server), store, Arc::new(SystemClock), Arc::new(PrintUrl)).unwrap();
        assert!(auth.has_valid_credentials().unwrap());

        auth.logout().unwrap();
        assert!(!auth.has_valid_credentials().unwrap());
        assert_eq!(auth.status().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn test_requires_client_credential() {
        let config = Config::default();
        let result = TradeStationAuth::new(
            &config,
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(SystemClock),
            Arc::new(PrintUrl),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
