//! OAuth2 callback listener
//!
//! A one-shot local HTTP server that captures the authorization code from the
//! browser redirect. It binds to the host/port of the configured redirect URI,
//! serves exactly one request and is dropped.

use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;
use crate::Result;
use crate::error::Error;

/// Largest request head we are willing to buffer
const MAX_REQUEST_BYTES: usize = 8192;

/// Confirmation page shown after the code is captured
const SUCCESS_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>tsclient | Authorization code received</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #22c55e; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Authorization code received</h1>
        <p>The authorization code was saved. This window can be closed.</p>
    </div>
</body>
</html>"#;

/// Failure page
const ERROR_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>tsclient | Authorization failed</title>
    <style>
        body {
            background-color: #0b0e14;
            color: #e2e8f0;
            font-family: -apple-system, system-ui, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            text-align: center;
        }
        h1 { font-size: 24px; color: #ef4444; }
        p { font-size: 15px; color: #94a3b8; line-height: 1.6; }
    </style>
</head>
<body>
    <div>
        <h1>Authorization failed</h1>
        <p>No authorization code was received.<br>Check your terminal and run the login again.</p>
    </div>
</body>
</html>"#;

/// Authorization code result from the callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResult {
    pub code: String,
    pub state: Option<String>,
}

/// A bound, not yet served, callback listener
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
}

impl CallbackListener {
    /// Bind to the host/port encoded in `redirect_uri`
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let (host, port) = redirect_host_port(redirect_uri)?;
        let addr = format!("{}:{}", host, port);

        let listener = TcpListener::bind((host.as_str(), port)).await
            .map_err(|source| Error::ListenerBind { addr: addr.clone(), source })?;

        tracing::info!("Callback listener bound on {}", addr);
        Ok(Self { listener })
    }

    /// Address actually bound (useful when the redirect URI asks for port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve exactly one request, answer the browser and shut down
    pub async fn accept(self, expected_state: Option<&str>) -> Result<AuthorizationResult> {
        let (mut socket, peer) = self.listener.accept().await?;
        // Nothing else gets accepted from here on
        drop(self.listener);
        tracing::debug!("Callback connection from {}", peer);

        let request = read_request_head(&mut socket).await?;
        let result = parse_callback_request(&request, expected_state);

        let (status, body) = match &result {
            Ok(_) => ("200 OK", SUCCESS_HTML),
            Err(_) => ("400 Bad Request", ERROR_HTML),
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        if let Err(e) = socket.write_all(response.as_bytes()).await {
            tracing::warn!("Failed to answer callback request: {}", e);
        }
        let _ = socket.shutdown().await;

        result
    }
}

/// Bind to `redirect_uri` and wait for the authorization code
pub async fn wait_for_callback(redirect_uri: &Url, expected_state: Option<&str>) -> Result<AuthorizationResult> {
    CallbackListener::bind(redirect_uri).await?.accept(expected_state).await
}

/// Host and port the listener must bind for a redirect URI
pub fn redirect_host_port(redirect_uri: &Url) -> Result<(String, u16)> {
    if redirect_uri.scheme() != "http" {
        return Err(Error::Config(format!(
            "Redirect URI must use http for a local listener: {}",
            redirect_uri
        )));
    }

    let host = redirect_uri.host_str()
        .ok_or_else(|| Error::Config(format!("Redirect URI has no host: {}", redirect_uri)))?;
    let port = redirect_uri.port_or_known_default().unwrap_or(80);

    // Url keeps the brackets around IPv6 literals
    let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
    Ok((host, port))
}

async fn read_request_head(socket: &mut tokio::net::TcpStream) -> Result<String> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Query parameters the identity provider may put on the redirect
#[derive(Debug, Default)]
struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl CallbackQuery {
    fn from_target(target: &str) -> Result<Self> {
        let url = Url::parse("http://localhost")
            .and_then(|base| base.join(target))
            .map_err(|e| Error::AuthorizationDenied(format!("Unparseable callback target '{}': {}", target, e)))?;

        let mut query = Self::default();
        for (key, value) in url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut query.code,
                "state" => &mut query.state,
                "error" => &mut query.error,
                "error_description" => &mut query.error_description,
                _ => continue,
            };
            *slot = Some(value.into_owned());
        }
        Ok(query)
    }

    /// Consent outcome: a code, or the reason there is none
    fn into_result(self, expected_state: Option<&str>) -> Result<AuthorizationResult> {
        if let Some(error) = self.error {
            let reason = match self.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(Error::AuthorizationDenied(reason));
        }

        match (expected_state, self.state.as_deref()) {
            (None, _) => {}
            (Some(expected), Some(got)) if got == expected => {}
            (Some(_), Some(got)) => {
                return Err(Error::AuthorizationDenied(format!("State mismatch (got '{}')", got)))
            }
            (Some(_), None) => return Err(Error::AuthorizationDenied("Callback carried no state".to_string())),
        }

        match self.code {
            Some(code) if !code.is_empty() => Ok(AuthorizationResult { code, state: self.state }),
            _ => Err(Error::AuthorizationDenied("Callback carried no authorization code".to_string())),
        }
    }
}

/// Turn the raw request head (`GET /?code=..&state=.. HTTP/1.1`) into an outcome
fn parse_callback_request(request: &str, expected_state: Option<&str>) -> Result<AuthorizationResult> {
    let request_line = request.lines().next().unwrap_or_default();
    let (method, target) = match request_line.split_whitespace().collect::<Vec<_>>()[..] {
        [method, target, ..] => (method, target),
        _ => return Err(Error::AuthorizationDenied(format!("Malformed request line: '{}'", request_line))),
    };
    if method != "GET" {
        return Err(Error::AuthorizationDenied(format!("Unexpected callback method {}", method)));
    }

    CallbackQuery::from_target(target)?.into_result(expected_state)
}
