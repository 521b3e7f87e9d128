//! Order execution endpoints
//!
//! Order payloads are passed through as JSON; see TradeStation's order
//! request schema for the fields (`AccountID`, `Symbol`, `Quantity`,
//! `OrderType`, `TradeAction`, `TimeInForce`, `Route`, ...).

use serde_json::Value;
use crate::Result;
use super::{path_id, ApiResponse, Environment, RestClient};

impl RestClient {
    /// Estimate an order without placing it
    pub async fn confirm_order(&self, payload: &Value) -> Result<ApiResponse> {
        self.post(Environment::Live, "/orderexecution/orderconfirm", payload).await
    }

    /// Estimate a group order (`Type` of `BRK`, `OCO` or `NORMAL`) without placing it
    pub async fn confirm_group_order(&self, payload: &Value) -> Result<ApiResponse> {
        self.post(Environment::Live, "/orderexecution/ordergroupconfirm", payload).await
    }

    pub async fn place_order(&self, payload: &Value, env: Environment) -> Result<ApiResponse> {
        self.post(env, "/orderexecution/orders", payload).await
    }

    pub async fn place_group_order(&self, payload: &Value, env: Environment) -> Result<ApiResponse> {
        self.post(env, "/orderexecution/ordergroups", payload).await
    }

    /// Replace an open order; `payload` carries the fields to change
    pub async fn replace_order(&self, order_id: &str, payload: &Value, env: Environment) -> Result<ApiResponse> {
        let order_id = path_id("order id", order_id)?;
        self.put(env, &format!("/orderexecution/orders/{}", order_id), payload).await
    }

    pub async fn cancel_order(&self, order_id: &str, env: Environment) -> Result<ApiResponse> {
        let order_id = path_id("order id", order_id)?;
        self.delete(env, &format!("/orderexecution/orders/{}", order_id)).await
    }

    pub async fn activation_triggers(&self) -> Result<ApiResponse> {
        self.get(Environment::Live, "/orderexecution/activationtriggers").await
    }

    pub async fn routes(&self) -> Result<ApiResponse> {
        self.get(Environment::Live, "/orderexecution/routes").await
    }
}
