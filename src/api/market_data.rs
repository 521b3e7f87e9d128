//! Market data endpoints
//!
//! Market data is only served by the live host.

use serde_json::Value;
use crate::Result;
use super::{join_ids, path_id, ApiResponse, Environment, RestClient};

/// Symbol details and quotes accept at most this many symbols per call
pub const MAX_SYMBOLS_PER_REQUEST: usize = 50;

impl RestClient {
    /// Bar chart data for a symbol; `query` takes interval, unit, barsback, etc.
    pub async fn bars(&self, symbol: &str, query: &[(&str, &str)]) -> Result<ApiResponse> {
        let symbol = path_id("symbol", symbol)?;
        self.get_with_query(Environment::Live, &format!("/marketdata/barcharts/{}", symbol), query).await
    }

    pub async fn symbol_details(&self, symbols: &[&str]) -> Result<ApiResponse> {
        let symbols = join_ids("symbol", symbols, Some(MAX_SYMBOLS_PER_REQUEST))?;
        self.get(Environment::Live, &format!("/marketdata/symbols/{}", symbols)).await
    }

    pub async fn quotes(&self, symbols: &[&str]) -> Result<ApiResponse> {
        let symbols = join_ids("symbol", symbols, Some(MAX_SYMBOLS_PER_REQUEST))?;
        self.get(Environment::Live, &format!("/marketdata/quotes/{}", symbols)).await
    }

    /// Interest rates for cryptocurrencies
    pub async fn crypto_interest_rates(&self) -> Result<ApiResponse> {
        self.get(Environment::Live, "/marketdata/crypto/interestrates").await
    }

    pub async fn option_expirations(&self, underlying: &str) -> Result<ApiResponse> {
        let underlying = path_id("symbol", underlying)?;
        self.get(Environment::Live, &format!("/marketdata/options/expirations/{}", underlying)).await
    }

    pub async fn option_strikes(&self, underlying: &str) -> Result<ApiResponse> {
        let underlying = path_id("symbol", underlying)?;
        self.get(Environment::Live, &format!("/marketdata/options/strikes/{}", underlying)).await
    }

    pub async fn option_spread_types(&self) -> Result<ApiResponse> {
        self.get(Environment::Live, "/marketdata/options/spreadtypes").await
    }

    /// Risk/reward analysis for a spread whose legs share one expiration.
    ///
    /// `payload` looks like `{"SpreadPrice": 0, "Legs": [{"Symbol": .., "Quantity": .., "TradeAction": "BUY"}]}`.
    pub async fn option_risk_reward(&self, payload: &Value) -> Result<ApiResponse> {
        self.post(Environment::Live, "/marketdata/options/riskreward", payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_util;
    use crate::error::Error;
    use crate::test_support::MockServer;
    use serde_json::json;

    #[tokio::test]
    async fn test_quotes_join_symbols() {
        let api = MockServer::fixed(200, r#"{"Quotes":[]}"#).await;
        let client = test_util::client(&api);

        client.quotes(&["MSFT", "AAPL"]).await.unwrap();
        assert_eq!(api.requests()[0].path, "/live/v3/marketdata/quotes/MSFT,AAPL");
    }

    #[tokio::test]
    async fn test_too_many_symbols_rejected_locally() {
        let api = MockServer::fixed(200, "{}").await;
        let client = test_util::client(&api);
        let symbols = vec!["X"; MAX_SYMBOLS_PER_REQUEST + 1];

        let err = client.symbol_details(&symbols).await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(api.request_count(), 0);
    }

    #[tokio::test]
    async fn test_bars_query() {
        let api = MockServer::fixed(200, "{}").await;
        let client = test_util::client(&api);

        client.bars("AAPL", &[("interval", "5"), ("unit", "Minute")]).await.unwrap();
        assert_eq!(api.requests()[0].path, "/live/v3/marketdata/barcharts/AAPL?interval=5&unit=Minute");
    }

    #[tokio::test]
    async fn test_risk_reward_posts_payload() {
        let api = MockServer::fixed(200, "{}").await;
        let client = test_util::client(&api);
        let payload = json!({"SpreadPrice": 0, "Legs": [{"Symbol": "MSFT 260619C400", "Quantity": 1, "TradeAction": "BUY"}]});

        client.option_risk_reward(&payload).await.unwrap();

        let request = &api.requests()[0];
        assert_eq!(request.method, "POST");
        assert_eq!(request.path, "/live/v3/marketdata/options/riskreward");
    }
}
