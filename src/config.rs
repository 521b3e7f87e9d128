//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::Result;
use crate::auth::ClientCredential;
use crate::error::Error;

/// Environment variable overriding `client_id`
pub const ENV_CLIENT_ID: &str = "TS_CLIENT_ID";

/// Environment variable overriding `client_secret`
pub const ENV_CLIENT_SECRET: &str = "TS_CLIENT_SECRET";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// API key issued by TradeStation
    #[serde(default)]
    pub client_id: String,

    /// API secret issued by TradeStation
    #[serde(default)]
    pub client_secret: String,

    /// Redirect URI registered for the key; the callback listener binds here
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Space separated OAuth2 scopes
    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default = "default_audience")]
    pub audience: String,

    /// Identity provider base URL (authorize and token endpoints live here)
    #[serde(default = "default_auth_host")]
    pub auth_host: String,

    /// Live brokerage API base, including the version prefix
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Simulation (paper trading) API base
    #[serde(default = "default_sim_api_base")]
    pub sim_api_base: String,

    /// Where tokens are persisted. Defaults to `~/.tradestation/credentials.json`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_path: Option<PathBuf>,

    /// Timeout applied to every token-endpoint and resource call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Subtracted from the advertised token lifetime
    #[serde(default = "default_expiry_margin_secs")]
    pub expiry_margin_secs: i64,

    /// Attempts made by the refresh path on transient failures
    #[serde(default = "default_refresh_attempts")]
    pub refresh_attempts: u32,

    /// Initial backoff between refresh attempts, doubled each time
    #[serde(default = "default_refresh_backoff_ms")]
    pub refresh_backoff_ms: u64,
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/".to_string()
}

fn default_scope() -> String {
    "openid offline_access profile MarketData ReadAccount Trade Crypto Matrix OptionSpreads".to_string()
}

fn default_audience() -> String {
    "https://api.tradestation.com".to_string()
}

fn default_auth_host() -> String {
    "https://signin.tradestation.com".to_string()
}

fn default_api_base() -> String {
    "https://api.tradestation.com/v3".to_string()
}

fn default_sim_api_base() -> String {
    "https://sim-api.tradestation.com/v3".to_string()
}

fn default_http_timeout_secs() -> u64 {
    20
}

fn default_expiry_margin_secs() -> i64 {
    60
}

fn default_refresh_attempts() -> u32 {
    3
}

fn default_refresh_backoff_ms() -> u64 {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            scope: default_scope(),
            audience: default_audience(),
            auth_host: default_auth_host(),
            api_base: default_api_base(),
            sim_api_base: default_sim_api_base(),
            credentials_path: None,
            http_timeout_secs: default_http_timeout_secs(),
            expiry_margin_secs: default_expiry_margin_secs(),
            refresh_attempts: default_refresh_attempts(),
            refresh_backoff_ms: default_refresh_backoff_ms(),
        }
    }
}

impl Config {
    /// Client credential pair, rejecting an unconfigured key
    pub fn client_credential(&self) -> Result<ClientCredential> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(Error::Config(format!(
                "client_id and client_secret must be set in {:?} or via {} / {}",
                config_path(),
                ENV_CLIENT_ID,
                ENV_CLIENT_SECRET
            )));
        }
        Ok(ClientCredential::new(&self.client_id, &self.client_secret))
    }

    pub fn authorize_url(&self) -> String {
        format!("{}/authorize", self.auth_host.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.auth_host.trim_end_matches('/'))
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.credentials_path
            .clone()
            .unwrap_or_else(|| config_dir().join("credentials.json"))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn refresh_backoff(&self) -> Duration {
        Duration::from_millis(self.refresh_backoff_ms)
    }

    /// Apply `TS_CLIENT_ID` / `TS_CLIENT_SECRET` if present and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var(ENV_CLIENT_ID) {
            if !id.is_empty() {
                self.client_id = id;
            }
        }
        if let Ok(secret) = std::env::var(ENV_CLIENT_SECRET) {
            if !secret.is_empty() {
                self.client_secret = secret;
            }
        }
    }
}

/// Get the config directory path
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tradestation")
}

/// Get the config file path
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

/// Load configuration from file, then apply environment overrides
pub fn load() -> Result<Config> {
    let path = config_path();

    let mut config = if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content)?
    } else if std::env::var(ENV_CLIENT_ID).is_ok() {
        Config::default()
    } else {
        return Err(Error::Config(format!(
            "Config not found at {:?}. Run 'tsclient onboard' first.",
            path
        )));
    };

    config.apply_env_overrides();
    Ok(config)
}

/// Save configuration to file
pub fn save(config: &Config) -> Result<()> {
    save_to(config, &config_path())
}

/// Save to an explicit path; the file holds the client secret and is
/// created owner-only
pub fn save_to(config: &Config, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    crate::auth::write_private_atomic(path, &content)?;
    Ok(())
}

/// Interactively create the configuration file
pub fn onboard() -> Result<()> {
    use crate::ui;
    use inquire::{Confirm, Password, PasswordDisplayMode, Text};

    ui::print_header("Setup Wizard", &default_auth_host());
    println!("  You need an API key and secret from TradeStation.\n");

    let mut config = Config::default();

    config.client_id = Text::new("API key (client id):").prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    config.client_secret = Password::new("API secret:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if config.client_id.trim().is_empty() || config.client_secret.trim().is_empty() {
        return Err(Error::Config("API key and secret cannot be empty".to_string()));
    }

    ui::print_step(&format!("Default redirect URI is {}", config.redirect_uri));
    let keep_redirect = Confirm::new("Use the default redirect URI?").with_default(true).prompt()
        .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;

    if !keep_redirect {
        config.redirect_uri = Text::new("Redirect URI registered for your key:").prompt()
            .map_err(|e| Error::Config(format!("Prompt failed: {}", e)))?;
    }

    ui::print_waiting("Saving configuration");
    save(&config)?;

    println!();
    ui::print_success("Setup complete!");
    ui::print_step("Run 'tsclient login' to authorize this machine.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.redirect_uri, "http://localhost:3000/");
        assert_eq!(config.http_timeout_secs, 20);
        assert_eq!(config.expiry_margin_secs, 60);
        assert_eq!(config.refresh_attempts, 3);
    }

    #[test]
    fn test_endpoint_urls() {
        let mut config = Config::default();
        assert_eq!(config.authorize_url(), "https://signin.tradestation.com/authorize");
        assert_eq!(config.token_url(), "https://signin.tradestation.com/oauth/token");

        config.auth_host = "http://127.0.0.1:9999/".to_string();
        assert_eq!(config.token_url(), "http://127.0.0.1:9999/oauth/token");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"client_id": "key", "client_secret": "secret"}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.client_id, "key");
        assert_eq!(config.api_base, "https://api.tradestation.com/v3");
        assert_eq!(config.sim_api_base, "https://sim-api.tradestation.com/v3");
        assert!(config.scope.contains("offline_access"));
    }

    #[test]
    fn test_missing_client_credential() {
        let config = Config::default();
        let err = config.client_credential().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_save_round_trips() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("config.json");
        let mut config = Config::default();
        config.client_id = "key".to_string();
        config.client_secret = "secret".to_string();

        save_to(&config, &path).unwrap();
        save_to(&config, &path).unwrap();

        let parsed: Config = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.client_secret, "secret");
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_config_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("config.json");

        save_to(&Config::default(), &path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.client_id = "key".to_string();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.client_id, "key");
        assert_eq!(parsed.credentials_path, None);
    }
}
