//! tsclient CLI entry point

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use anyhow::Result;
use std::sync::Arc;
use tradestation::api::{ApiResponse, Environment, RestClient};
use tradestation::auth::{
    BrowserLauncher, CredentialStore, FileCredentialStore, PrintUrl, SystemBrowser, SystemClock, TradeStationAuth,
    TIMESTAMP_FORMAT,
};
use tradestation::ui;

#[derive(Parser)]
#[command(name = "tsclient")]
#[command(about = "TradeStation v3 API client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create ~/.tradestation/config.json
    Onboard,

    /// Authorize in the browser and obtain a refresh token
    Login {
        /// Print the authorize URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Print a valid access token, refreshing it if needed
    Token {
        /// Refresh even if the cached token is still valid
        #[arg(long)]
        force: bool,
    },

    /// Show stored credential state
    Status,

    /// Remove stored tokens
    Logout,

    /// List brokerage accounts
    Accounts {
        /// Use the live host instead of simulation
        #[arg(long)]
        live: bool,
    },

    /// Show positions for an account
    Positions {
        account: String,

        #[arg(long)]
        live: bool,
    },

    /// Fetch quotes for one or more symbols
    Quotes {
        #[arg(required = true)]
        symbols: Vec<String>,
    },

    /// Authenticated GET of any path under the versioned API base
    Get {
        path: String,

        #[arg(long)]
        live: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Onboard => {
            tradestation::config::onboard()?;
        }

        Commands::Login { no_browser } => {
            run_login(no_browser).await?;
        }

        Commands::Token { force } => {
            let auth = load_auth()?;
            let manager = auth.manager();
            let token = if force {
                manager.force_refresh().await?
            } else {
                manager.get_valid_access_token().await?
            };
            println!("{}", token.value);
            tracing::info!("Access token valid until {}", token.expires_at);
        }

        Commands::Status => {
            run_status()?;
        }

        Commands::Logout => {
            let config = tradestation::config::load()?;
            FileCredentialStore::new(config.credentials_path()).clear()?;
            ui::print_success("Logged out successfully");
        }

        Commands::Accounts { live } => {
            let client = load_client()?;
            print_response(client.accounts(Environment::from_simulation(!live)).await?);
        }

        Commands::Positions { account, live } => {
            let client = load_client()?;
            print_response(client.positions(&account, Environment::from_simulation(!live)).await?);
        }

        Commands::Quotes { symbols } => {
            let client = load_client()?;
            let symbols: Vec<&str> = symbols.iter().map(String::as_str).collect();
            print_response(client.quotes(&symbols).await?);
        }

        Commands::Get { path, live } => {
            let client = load_client()?;
            print_response(client.get(Environment::from_simulation(!live), &path).await?);
        }
    }

    Ok(())
}

fn load_auth() -> Result<TradeStationAuth> {
    let config = tradestation::config::load()?;
    Ok(TradeStationAuth::from_config(&config)?)
}

fn load_client() -> Result<RestClient> {
    let config = tradestation::config::load()?;
    let auth = TradeStationAuth::from_config(&config)?;
    Ok(RestClient::new(&config, auth.manager())?)
}

async fn run_login(no_browser: bool) -> Result<()> {
    let config = tradestation::config::load()?;

    ui::print_header("Login", &config.auth_host);
    ui::print_field("Client id", &ui::mask(&config.client_id));
    ui::print_field("Redirect URI", &config.redirect_uri);

    let launcher: Arc<dyn BrowserLauncher> = if no_browser {
        Arc::new(PrintUrl)
    } else {
        Arc::new(SystemBrowser)
    };
    let store = Arc::new(FileCredentialStore::new(config.credentials_path()));
    let auth = TradeStationAuth::new(&config, store, Arc::new(SystemClock), launcher)?;

    ui::print_waiting("Waiting for authorization");
    match auth.login().await {
        Ok((_, access)) => {
            ui::print_success("Authentication successful!");
            ui::print_field("Saved to", &config.credentials_path().display().to_string());
            ui::print_field("Valid until", &access.expires_at.with_timezone(&chrono::Local).format(TIMESTAMP_FORMAT).to_string());
        }
        Err(e) => {
            ui::print_error(&format!("Login failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}

fn run_status() -> Result<()> {
    let config = tradestation::config::load()?;
    let auth = TradeStationAuth::from_config(&config)?;
    let state = auth.status()?;
    let now = chrono::Utc::now();

    ui::print_header("Status", &config.auth_host);
    ui::print_field("Credentials", &config.credentials_path().display().to_string());
    ui::print_field("Client id", &ui::mask(&config.client_id));

    match &state.refresh_token {
        Some(refresh) => ui::print_field("Refresh token", &ui::mask(&refresh.value)),
        None => ui::print_warning("Refresh token: not set (run 'tsclient login')"),
    }

    match &state.access_token {
        Some(token) if token.is_valid_at(now) => ui::print_field(
            "Access token",
            &format!("valid for {}s more", token.remaining(now).num_seconds()),
        ),
        Some(_) => ui::print_warning("Access token: expired (refreshed on next use)"),
        None => ui::print_warning("Access token: none"),
    }

    if state.refresh_token.is_some() && !auth.has_valid_credentials()? {
        ui::print_warning("Stored tokens cannot be used with this client id; run 'tsclient login'");
    }
    if state.authorization_code.is_some() {
        ui::print_warning("An unexchanged authorization code is stored");
    }

    Ok(())
}

fn print_response(response: ApiResponse) {
    if !response.is_success() {
        ui::print_error(&format!("HTTP {}", response.status));
    }
    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap_or(response.body)),
        Err(_) => println!("{}", response.body),
    }
}
