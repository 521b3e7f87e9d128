//! Authentication module for the OAuth2 authorization-code flow
//!
//! This module provides:
//! - Token and credential types
//! - Credential storage with atomic updates
//! - The one-shot OAuth2 callback listener and code acquirer
//! - Token endpoint exchanges
//! - TokenManager, the lazily refreshing access-token gate
//! - TradeStationAuth, which wires the pieces together from a Config

mod acquirer;
mod callback_server;
mod clock;
mod exchange;
mod manager;
mod provider;
mod store;
mod types;

pub use acquirer::{build_authorize_url, AuthorizationCodeAcquirer, BrowserLauncher, PrintUrl, SystemBrowser};
pub use callback_server::{redirect_host_port, wait_for_callback, AuthorizationResult, CallbackListener};
pub use clock::{Clock, ManualClock, SystemClock};
pub use exchange::{TokenExchanger, DEFAULT_ACCESS_TOKEN_TTL_SECS, DEFAULT_EXPIRY_MARGIN_SECS};
pub use manager::{AccessTokenSource, RetryPolicy, TokenManager};
pub use provider::TradeStationAuth;
pub use store::{CredentialStore, FileCredentialStore, MemoryCredentialStore, StoredCredentials, TIMESTAMP_FORMAT};
pub(crate) use store::write_private_atomic;
pub use types::{compute_expiry, AccessToken, AuthorizationCode, ClientCredential, RefreshToken};
