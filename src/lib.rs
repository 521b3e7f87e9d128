//! TradeStation v3 REST client
//!
//! This library provides the OAuth2 authorization-code flow with a lazily
//! refreshing access token, plus thin wrappers over the market data,
//! brokerage and order execution endpoints.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod test_support;
pub mod ui;

pub use error::{Error, Result};
