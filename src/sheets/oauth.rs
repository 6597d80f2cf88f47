//! Installed-app OAuth authorization.
//!
//! Starts a one-shot Axum server on a random loopback port, prints the Google
//! consent URL, waits for the redirect carrying the authorization code, and
//! exchanges the code for tokens.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use chrono::Utc;
use reqwest::Url;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, info};

use crate::sheets::auth::{request_token, ClientSecrets, StoredToken};

/// Linux first, then macOS.
const BROWSER_OPENERS: &[&str] = &["xdg-open", "open"];

type CodeSender = oneshot::Sender<Result<String, String>>;

#[derive(Clone)]
struct CallbackState {
    expected_state: String,
    /// Consumed by the first redirect that reaches the server.
    code_tx: Arc<Mutex<Option<CodeSender>>>,
}

/// Builds the Google consent URL for the given loopback redirect.
pub fn authorization_url(
    secrets: &ClientSecrets,
    scope: &str,
    redirect_uri: &str,
    state: &str,
) -> Result<Url> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .with_context(|| format!("Invalid auth_uri in client secrets: {}", secrets.auth_uri))
}

/// Validates the redirect query and extracts the authorization code.
pub fn extract_code(
    params: &HashMap<String, String>,
    expected_state: &str,
) -> Result<String, String> {
    if let Some(error) = params.get("error") {
        let desc = params
            .get("error_description")
            .map(|d| format!(" ({})", d))
            .unwrap_or_default();
        return Err(format!("Authorization failed: {}{}", error, desc));
    }
    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err("Invalid OAuth state".to_string());
    }
    match params.get("code") {
        Some(code) if !code.is_empty() => Ok(code.clone()),
        _ => Err("Missing authorization code".to_string()),
    }
}

async fn handle_callback(
    State(state): State<CallbackState>,
    Query(params): Query<HashMap<String, String>>,
) -> Html<&'static str> {
    let outcome = extract_code(&params, &state.expected_state);
    let page = match outcome {
        Ok(_) => "<p>Authorization complete. You can close this tab.</p>",
        Err(_) => "<p>Authorization failed. Check the bot logs.</p>",
    };

    if let Some(tx) = state.code_tx.lock().await.take() {
        let _ = tx.send(outcome);
    }
    Html(page)
}

/// Tries each opener in turn until one launches the URL.
async fn open_in_browser(url: &str, openers: &[&str]) -> bool {
    for opener in openers {
        match tokio::process::Command::new(opener).arg(url).status().await {
            Ok(status) if status.success() => return true,
            Ok(status) => debug!("{} exited with {}", opener, status),
            Err(e) => debug!("Could not run {}: {}", opener, e),
        }
    }
    false
}

/// Runs the interactive flow and returns freshly issued tokens.
pub async fn authorize(
    client: &reqwest::Client,
    secrets: &ClientSecrets,
    scope: &str,
) -> Result<StoredToken> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .context("Failed to bind OAuth redirect listener")?;
    let port = listener
        .local_addr()
        .context("Failed to read OAuth listener address")?
        .port();
    let redirect_uri = format!("http://localhost:{port}/");

    let expected_state = uuid::Uuid::new_v4().simple().to_string();
    let url = authorization_url(secrets, scope, &redirect_uri, &expected_state)?;

    let (code_tx, code_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let state = CallbackState {
        expected_state,
        code_tx: Arc::new(Mutex::new(Some(code_tx))),
    };
    let app = Router::new()
        .route("/", get(handle_callback))
        .with_state(state);

    println!("Please visit this URL to authorize this application:\n{url}");
    info!("Waiting for OAuth redirect on {}", redirect_uri);

    let browser_url = url.to_string();
    tokio::spawn(async move {
        open_in_browser(&browser_url, BROWSER_OPENERS).await;
    });

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    let outcome = code_rx
        .await
        .map_err(|_| anyhow!("OAuth redirect server stopped before receiving a code"));
    let _ = shutdown_tx.send(());
    server
        .await
        .context("OAuth redirect server panicked")?
        .context("OAuth redirect server error")?;

    let code = match outcome? {
        Ok(code) => code,
        Err(reason) => bail!("Google authorization failed: {}", reason),
    };

    let response = request_token(
        client,
        &secrets.token_uri,
        &[
            ("code", code.as_str()),
            ("client_id", secrets.client_id.as_str()),
            ("client_secret", secrets.client_secret.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ],
    )
    .await
    .context("Failed to exchange authorization code")?;

    info!("Authorization complete");
    Ok(response.into_stored(Utc::now(), None))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn secrets() -> ClientSecrets {
        ClientSecrets::from_json(r#"{"installed":{"client_id":"cid","client_secret":"s"}}"#)
            .unwrap()
    }

    #[test]
    fn test_extract_code_ok() {
        let p = params(&[("code", "4/abc"), ("state", "xyz"), ("scope", "s")]);
        assert_eq!(extract_code(&p, "xyz"), Ok("4/abc".to_string()));
    }

    #[test]
    fn test_extract_code_rejects_state_mismatch() {
        let p = params(&[("code", "4/abc"), ("state", "other")]);
        assert!(extract_code(&p, "xyz").is_err());

        let p = params(&[("code", "4/abc")]);
        assert!(extract_code(&p, "xyz").is_err());
    }

    #[test]
    fn test_extract_code_reports_error_param() {
        let p = params(&[("error", "access_denied"), ("state", "xyz")]);
        let err = extract_code(&p, "xyz").unwrap_err();
        assert!(err.contains("access_denied"));
    }

    #[test]
    fn test_extract_code_requires_code() {
        let p = params(&[("state", "xyz")]);
        assert_eq!(
            extract_code(&p, "xyz"),
            Err("Missing authorization code".to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_opener_returns_without_blocking() {
        let opened = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            open_in_browser("http://localhost:8080/", &["pawlog-no-such-opener"]),
        )
        .await
        .unwrap();
        assert!(!opened);
    }

    #[test]
    fn test_authorization_url_params() {
        let url = authorization_url(
            &secrets(),
            "https://www.googleapis.com/auth/spreadsheets",
            "http://localhost:8080/",
            "st4te",
        )
        .unwrap();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(query["client_id"], "cid");
        assert_eq!(query["redirect_uri"], "http://localhost:8080/");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["scope"], "https://www.googleapis.com/auth/spreadsheets");
        assert_eq!(query["state"], "st4te");
        assert_eq!(query["access_type"], "offline");
    }
}
