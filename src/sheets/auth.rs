use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::sheets::oauth;

/// Tokens within this margin of expiry are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth client from Google's `credentials.json` download.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn from_json(json: &str) -> Result<Self> {
        let file: SecretsFile =
            serde_json::from_str(json).context("Failed to parse OAuth client secrets")?;
        file.installed
            .or(file.web)
            .context("Client secrets contain neither an \"installed\" nor a \"web\" section")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read client secrets: {}", path.display()))?;
        Self::from_json(&content)
    }
}

/// Persisted OAuth tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now + Duration::seconds(EXPIRY_MARGIN_SECS)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read token file: {}", path.display()))?;
        let token = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse token file: {}", path.display()))?;
        Ok(Some(token))
    }

    /// Writes the token file, readable by the owner only on Unix (0600).
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self).context("Failed to serialize token")?;

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(path)
                .with_context(|| format!("Failed to open token file: {}", path.display()))?;
            // mode() only applies on create; tighten files left by older runs too.
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .with_context(|| format!("Failed to restrict token file: {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write token file: {}", path.display()))
        }

        #[cfg(not(unix))]
        {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write token file: {}", path.display()))
        }
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    /// Converts to a stored token, keeping `previous_refresh` when Google
    /// does not issue a new refresh token.
    pub(crate) fn into_stored(
        self,
        now: DateTime<Utc>,
        previous_refresh: Option<String>,
    ) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: now + Duration::seconds(self.expires_in),
        }
    }
}

/// OAuth error returned by the token endpoint, e.g. `invalid_grant`.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenRejected {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Display for TokenRejected {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Google token endpoint rejected the request: {}", self.error)?;
        if let Some(desc) = &self.error_description {
            write!(f, " ({})", desc)?;
        }
        Ok(())
    }
}

impl std::error::Error for TokenRejected {}

/// True when the error chain says the refresh token was revoked or expired.
pub(crate) fn is_revoked(err: &anyhow::Error) -> bool {
    err.downcast_ref::<TokenRejected>()
        .is_some_and(|rejected| rejected.error == "invalid_grant")
}

/// Posts a form to the token endpoint and parses the result.
pub(crate) async fn request_token(
    client: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client
        .post(token_uri)
        .form(form)
        .send()
        .await
        .context("Failed to send request to Google token endpoint")?;

    let status = response.status();
    if !status.is_success() {
        let error_body = response.text().await.unwrap_or_default();
        if let Ok(rejected) = serde_json::from_str::<TokenRejected>(&error_body) {
            return Err(rejected.into());
        }
        bail!("Google token endpoint error ({}): {}", status, error_body);
    }

    response
        .json()
        .await
        .context("Failed to parse Google token response")
}

/// Bearer credential for one Sheets API call.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: String,
}

impl Session {
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// Hands out sessions, caching the token and refreshing it only on expiry.
pub struct SessionProvider {
    client: reqwest::Client,
    secrets: ClientSecrets,
    scope: String,
    token_path: PathBuf,
    cached: Mutex<Option<StoredToken>>,
}

impl SessionProvider {
    pub fn new(secrets: ClientSecrets, scope: String, token_path: PathBuf) -> Self {
        Self {
            client: reqwest::Client::new(),
            secrets,
            scope,
            token_path,
            cached: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let secrets = ClientSecrets::from_file(&config.credentials_path())?;
        Ok(Self::new(
            secrets,
            config.sheets.scope.trim().to_string(),
            config.token_path(),
        ))
    }

    /// Returns a usable session: cached, refreshed, or from an interactive login.
    pub async fn acquire(&self) -> Result<Session> {
        let mut cached = self.cached.lock().await;

        if cached.is_none() {
            *cached = StoredToken::load(&self.token_path)?;
            if cached.is_some() {
                info!("Loaded saved credentials from {}", self.token_path.display());
            }
        }

        let now = Utc::now();
        let token = match cached.take() {
            Some(token) if token.is_valid(now) => {
                debug!("Reusing cached access token");
                token
            }
            Some(token) if token.can_refresh() => {
                info!("Credentials are expired, refreshing");
                match self.refresh(&token).await {
                    Ok(fresh) => {
                        fresh.save(&self.token_path)?;
                        fresh
                    }
                    Err(e) if is_revoked(&e) => {
                        warn!(
                            "Saved refresh token in {} is no longer accepted ({:#}), re-authorizing",
                            self.token_path.display(),
                            e
                        );
                        self.authorize_interactively().await?
                    }
                    Err(e) => return Err(e),
                }
            }
            _ => {
                info!("Credentials don't exist, starting interactive authorization");
                self.authorize_interactively().await?
            }
        };

        let session = Session {
            access_token: token.access_token.clone(),
        };
        *cached = Some(token);
        Ok(session)
    }

    async fn authorize_interactively(&self) -> Result<StoredToken> {
        let fresh = oauth::authorize(&self.client, &self.secrets, &self.scope).await?;
        fresh.save(&self.token_path)?;
        Ok(fresh)
    }

    async fn refresh(&self, token: &StoredToken) -> Result<StoredToken> {
        let refresh_token = token.refresh_token.as_deref().unwrap_or_default();
        let response = request_token(
            &self.client,
            &self.secrets.token_uri,
            &[
                ("client_id", self.secrets.client_id.as_str()),
                ("client_secret", self.secrets.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ],
        )
        .await
        .context("Failed to refresh Google credentials")?;
        Ok(response.into_stored(Utc::now(), token.refresh_token.clone()))
    }
}
