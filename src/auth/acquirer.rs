//! Interactive authorization-code acquisition
//!
//! Builds the identity provider's authorize URL, opens it for the user, and
//! captures the code from the redirect with a [`CallbackListener`].

use std::sync::Arc;
use url::Url;
use crate::Result;
use crate::error::Error;
use super::callback_server::CallbackListener;
use super::clock::Clock;
use super::store::CredentialStore;
use super::types::AuthorizationCode;

/// Opens the authorize URL for the user
pub trait BrowserLauncher: Send + Sync {
    fn launch(&self, url: &str) -> Result<()>;
}

/// Opens the system browser, printing the URL as a fallback
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn launch(&self, url: &str) -> Result<()> {
        println!("\n🔐 Opening browser for TradeStation login...\n");
        println!("If the browser doesn't open, visit this URL:\n{}\n", url);
        open::that(url)?;
        Ok(())
    }
}

/// Only prints the URL, for headless machines
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintUrl;

impl BrowserLauncher for PrintUrl {
    fn launch(&self, url: &str) -> Result<()> {
        println!("\n🔐 Open this URL in a browser to log in:\n{}\n", url);
        Ok(())
    }
}

/// Captures authorization codes and records them in the credential store
pub struct AuthorizationCodeAcquirer {
    authorize_url: String,
    audience: String,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    launcher: Arc<dyn BrowserLauncher>,
}

impl AuthorizationCodeAcquirer {
    pub fn new(
        authorize_url: impl Into<String>,
        audience: impl Into<String>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        launcher: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            audience: audience.into(),
            store,
            clock,
            launcher,
        }
    }

    /// Run the browser login and return the captured code.
    ///
    /// The listener is bound before the browser opens, so a busy port fails
    /// fast with [`Error::ListenerBind`]. The code is persisted exactly once,
    /// and only when the callback carried one.
    pub async fn acquire_authorization_code(
        &self,
        client_id: &str,
        scope: &str,
        redirect_uri: &str,
    ) -> Result<AuthorizationCode> {
        let redirect = Url::parse(redirect_uri)
            .map_err(|e| Error::Config(format!("Invalid redirect URI '{}': {}", redirect_uri, e)))?;

        let state = generate_state();
        let url = build_authorize_url(&self.authorize_url, client_id, &self.audience, redirect_uri, scope, &state)?;

        let listener = CallbackListener::bind(&redirect).await?;

        if let Err(e) = self.launcher.launch(url.as_str()) {
            tracing::warn!("Failed to open browser: {}", e);
        }

        tracing::info!("Waiting for authorization callback");
        let result = listener.accept(Some(&state)).await?;

        let code = AuthorizationCode::new(result.code, self.clock.now());
        self.store.save_authorization_code(client_id, &code)?;
        tracing::info!("Authorization code captured and saved");

        Ok(code)
    }
}

/// Build the identity provider's authorize URL
pub fn build_authorize_url(
    authorize_url: &str,
    client_id: &str,
    audience: &str,
    redirect_uri: &str,
    scope: &str,
    state: &str,
) -> Result<Url> {
    let mut url = Url::parse(authorize_url)
        .map_err(|e| Error::Config(format!("Invalid authorize URL '{}': {}", authorize_url, e)))?;

    url.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("audience", audience)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", scope)
        .append_pair("state", state);

    Ok(url)
}

/// Generate a random state string for CSRF protection
fn generate_state() -> String {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}
