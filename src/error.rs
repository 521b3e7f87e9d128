//! Error types for the TradeStation client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while authenticating or calling the API
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The redirect listener could not bind its host/port
    #[error("Failed to bind callback listener on {addr}: {source}")]
    ListenerBind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The user declined consent or the callback was malformed
    #[error("Authorization denied: {0}")]
    AuthorizationDenied(String),

    /// The token endpoint rejected a code or refresh-token exchange
    #[error("Token exchange failed ({status}): {body}")]
    TokenExchange { status: u16, body: String },

    /// The refresh token is revoked, expired or missing; re-run the login flow
    #[error("Refresh token invalid: {0}")]
    RefreshTokenInvalid(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Credential store error: {0}")]
    CredentialStore(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the refresh path may try again after this error.
    ///
    /// Transport failures and provider 5xx responses are transient. A 4xx from
    /// the token endpoint and an invalid refresh token are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Network(_) => true,
            Error::TokenExchange { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let server = Error::TokenExchange { status: 503, body: "busy".into() };
        let client = Error::TokenExchange { status: 400, body: "invalid_grant".into() };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!Error::RefreshTokenInvalid("revoked".into()).is_retryable());
        assert!(!Error::AuthorizationDenied("access_denied".into()).is_retryable());
    }

    #[test]
    fn test_exchange_error_carries_body() {
        let err = Error::TokenExchange { status: 403, body: r#"{"error":"invalid_grant"}"#.into() };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("invalid_grant"));
    }
}
