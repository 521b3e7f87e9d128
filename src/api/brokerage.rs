//! Brokerage endpoints: accounts, balances, orders, positions

use crate::Result;
use super::{join_ids, path_id, ApiResponse, Environment, RestClient};

impl RestClient {
    pub async fn accounts(&self, env: Environment) -> Result<ApiResponse> {
        self.get(env, "/brokerage/accounts").await
    }

    pub async fn balances(&self, accounts: &[&str], env: Environment) -> Result<ApiResponse> {
        let accounts = join_ids("account", accounts, None)?;
        self.get(env, &format!("/brokerage/accounts/{}/balances", accounts)).await
    }

    /// Beginning-of-day balances
    pub async fn bod_balances(&self, accounts: &[&str], env: Environment) -> Result<ApiResponse> {
        let accounts = join_ids("account", accounts, None)?;
        self.get(env, &format!("/brokerage/accounts/{}/bodbalances", accounts)).await
    }

    /// Historical orders since `since` (`YYYY-MM-DD`), optionally narrowed to order ids
    pub async fn historical_orders(
        &self,
        accounts: &[&str],
        since: &str,
        order_ids: Option<&[&str]>,
        env: Environment,
    ) -> Result<ApiResponse> {
        let accounts = join_ids("account", accounts, None)?;
        let path = match order_ids {
            Some(ids) => format!("/brokerage/accounts/{}/historicalorders/{}", accounts, join_ids("order id", ids, None)?),
            None => format!("/brokerage/accounts/{}/historicalorders", accounts),
        };
        self.get_with_query(env, &path, &[("since", since)]).await
    }

    /// Today's and open orders, optionally narrowed to order ids
    pub async fn orders(&self, accounts: &[&str], order_ids: Option<&[&str]>, env: Environment) -> Result<ApiResponse> {
        let accounts = join_ids("account", accounts, None)?;
        let path = match order_ids {
            Some(ids) => format!("/brokerage/accounts/{}/orders/{}", accounts, join_ids("order id", ids, None)?),
            None => format!("/brokerage/accounts/{}/orders", accounts),
        };
        self.get(env, &path).await
    }

    pub async fn positions(&self, account: &str, env: Environment) -> Result<ApiResponse> {
        let account = path_id("account", account)?;
        self.get(env, &format!("/brokerage/accounts/{}/positions", account)).await
    }

    /// Cryptocurrency wallet details (live only)
    pub async fn crypto_wallets(&self, crypto_account: &str) -> Result<ApiResponse> {
        let account = path_id("account", crypto_account)?;
        self.get(Environment::Live, &format!("/brokerage/accounts/{}/wallets", account)).await
    }
}
