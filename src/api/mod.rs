//! Brokerage REST API access
//!
//! [`RestClient`] is a thin accessor: it takes a fresh bearer token from an
//! [`AccessTokenSource`] (normally the token manager) for every call, picks
//! the live or simulation host, and returns the raw status and body. It
//! never retries and never interprets brokerage error payloads.
//!
//! Endpoint wrappers are grouped by API area:
//! - **market_data** - bars, symbols, quotes, options
//! - **brokerage** - accounts, balances, orders, positions, wallets
//! - **order_execution** - confirm, place, replace, cancel

mod brokerage;
mod market_data;
mod order_execution;

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use crate::Result;
use crate::auth::AccessTokenSource;
use crate::config::Config;
use crate::error::Error;

pub use market_data::MAX_SYMBOLS_PER_REQUEST;

/// Which TradeStation environment a call targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Live,
    /// Paper trading host mirroring the live paths
    #[default]
    Simulation,
}

impl Environment {
    pub fn from_simulation(sim: bool) -> Self {
        if sim {
            Environment::Simulation
        } else {
            Environment::Live
        }
    }
}

/// Raw API response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body, regardless of status
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Authenticated accessor for the brokerage API
#[derive(Clone)]
pub struct RestClient {
    http_client: Client,
    tokens: Arc<dyn AccessTokenSource>,
    live_base: String,
    sim_base: String,
}

impl RestClient {
    pub fn new(config: &Config, tokens: Arc<dyn AccessTokenSource>) -> Result<Self> {
        Self::with_bases(&config.api_base, &config.sim_api_base, tokens, config.http_timeout())
    }

    pub fn with_bases(
        live_base: impl Into<String>,
        sim_base: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            tokens,
            live_base: live_base.into().trim_end_matches('/').to_string(),
            sim_base: sim_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self, env: Environment) -> &str {
        match env {
            Environment::Live => &self.live_base,
            Environment::Simulation => &self.sim_base,
        }
    }

    /// Perform an authenticated call.
    ///
    /// `path` is relative to the versioned base, e.g. `/brokerage/accounts`.
    pub async fn request(
        &self,
        env: Environment,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<ApiResponse> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}/{}", self.base_url(env), path.trim_start_matches('/'));

        tracing::debug!("{} {}", method, url);

        let mut request = self.http_client
            .request(method, &url)
            .bearer_auth(&token.value);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            // .json() sets Content-Type: application/json
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            tracing::debug!("{} returned {}", url, status);
        }

        Ok(ApiResponse { status, body })
    }

    pub async fn get(&self, env: Environment, path: &str) -> Result<ApiResponse> {
        self.request(env, Method::GET, path, &[], None).await
    }

    pub async fn get_with_query(&self, env: Environment, path: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        self.request(env, Method::GET, path, query, None).await
    }

    pub async fn post(&self, env: Environment, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(env, Method::POST, path, &[], Some(body)).await
    }

    pub async fn put(&self, env: Environment, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(env, Method::PUT, path, &[], Some(body)).await
    }

    pub async fn delete(&self, env: Environment, path: &str) -> Result<ApiResponse> {
        self.request(env, Method::DELETE, path, &[], None).await
    }
}

/// Comma-join path ids, rejecting empty lists and oversized batches
fn join_ids(kind: &str, ids: &[&str], max: Option<usize>) -> Result<String> {
    if ids.is_empty() || ids.iter().any(|id| id.trim().is_empty()) {
        return Err(Error::InvalidRequest(format!("at least one non-empty {} is required", kind)));
    }
    if let Some(max) = max {
        if ids.len() > max {
            return Err(Error::InvalidRequest(format!(
                "at most {} {}s per request, got {}",
                max,
                kind,
                ids.len()
            )));
        }
    }
    Ok(ids.iter().map(|id| id.trim()).collect::<Vec<_>>().join(","))
}

/// Reject ids that would escape their path segment
fn path_id<'a>(kind: &str, id: &'a str) -> Result<&'a str> {
    let id = id.trim();
    if id.is_empty() || id.contains('/') || id.contains('?') {
        return Err(Error::InvalidRequest(format!("invalid {}: '{}'", kind, id)));
    }
    Ok(id)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockServer;
    use serde_json::json;

    #[test]
    fn test_environment_from_flag() {
        assert_eq!(Environment::from_simulation(true), Environment::Simulation);
        assert_eq!(Environment::from_simulation(false), Environment::Live);
        assert_eq!(Environment::default(), Environment::Simulation);
    }

    #[test]
    fn test_join_ids() {
        assert_eq!(join_ids("account", &["A1", " A2 "], None).unwrap(), "A1,A2");
        assert!(join_ids("account", &[], None).is_err());
        assert!(join_ids("account", &["A1", ""], None).is_err());
        assert!(join_ids("symbol", &["A", "B", "C"], Some(2)).is_err());
    }

    #[test]
    fn test_path_id_rejects_traversal() {
        assert_eq!(path_id("order id", " 123 ").unwrap(), "123");
        assert!(path_id("order id", "../accounts").is_err());
        assert!(path_id("order id", "1?x=y").is_err());
    }

    #[test]
    fn test_api_response_json() {
        let response = ApiResponse { status: 200, body: r#"{"Accounts":[]}"#.to_string() };
        assert!(response.is_success());
        let value: Value = response.json().unwrap();
        assert_eq!(value["Accounts"], json!([]));
    }

    #[tokio::test]
    async fn test_request_carries_bearer_and_selects_host() {
        let api = MockServer::fixed(200, r#"{"ok":true}"#).await;
        let client = test_util::client(&api);

        let sim = client.get(Environment::Simulation, "/brokerage/accounts").await.unwrap();
        let live = client.get(Environment::Live, "brokerage/accounts").await.unwrap();

        assert!(sim.is_success());
        assert_eq!(live.body, r#"{"ok":true}"#);

        let requests = api.requests();
        assert_eq!(requests[0].path, "/sim/v3/brokerage/accounts");
        assert_eq!(requests[1].path, "/live/v3/brokerage/accounts");
        assert_eq!(requests[0].header("authorization"), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn test_post_sends_json_body() {
        let api = MockServer::fixed(200, "{}").await;
        let client = test_util::client(&api);
        let payload = json!({"Symbol": "MSFT", "Quantity": "10"});

        client.post(Environment::Simulation, "/orderexecution/orders", &payload).await.unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.header("content-type"), Some("application/json"));
        let sent: Value = serde_json::from_str(&request.body).unwrap();
        assert_eq!(sent, payload);
    }

    struct FixedToken;

    #[async_trait::async_trait]
    impl AccessTokenSource for FixedToken {
        async fn access_token(&self) -> Result<crate::auth::AccessToken> {
            Ok(crate::auth::AccessToken::new("static", chrono::Utc::now()))
        }
    }

    #[tokio::test]
    async fn test_any_token_source() {
        let api = MockServer::fixed(200, "{}").await;
        let client = RestClient::with_bases(api.url("/v3"), api.url("/sim/v3"), Arc::new(FixedToken), Duration::from_secs(5)).unwrap();

        client.get(Environment::Live, "/brokerage/accounts").await.unwrap();
        assert_eq!(api.requests()[0].header("authorization"), Some("Bearer static"));
    }

    #[tokio::test]
    async fn test_http_errors_pass_through() {
        let api = MockServer::fixed(404, r#"{"Error":"NotFound"}"#).await;
        let client = test_util::client(&api);

        let response = client.get(Environment::Live, "/brokerage/accounts/X/positions").await.unwrap();
        assert_eq!(response.status, 404);
        assert!(!response.is_success());
        assert!(response.body.contains("NotFound"));
        assert_eq!(api.request_count(), 1);
    }
}
