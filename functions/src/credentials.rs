//! OAuth2 access tokens for the Firebase REST APIs.
//!
//! Cloud Messaging and Firestore both take a Google OAuth2 bearer token.
//! Tokens come from one of:
//! - a static token (`GOOGLE_ACCESS_TOKEN`), useful behind a metadata proxy
//! - a service-account key, exchanged with the JWT bearer grant
//!
//! Reference: https://developers.google.com/identity/protocols/oauth2/service-account

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::Config;

/// OAuth2 scopes requested for the service account.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/firebase.messaging",
    "https://www.googleapis.com/auth/datastore",
];

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of a signed assertion.
const ASSERTION_TTL_SECS: u64 = 3600;

/// Tokens are refreshed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("no credentials configured (set GOOGLE_APPLICATION_CREDENTIALS or GOOGLE_ACCESS_TOKEN)")]
    NotConfigured,

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid service account key: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid signing key or assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint rejected the assertion ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Source of OAuth2 bearer tokens.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, CredentialsError>;
}

/// A fixed token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        Ok(self.0.clone())
    }
}

/// Stand-in used when nothing is configured. Every call fails.
pub struct Unconfigured;

#[async_trait]
impl TokenSource for Unconfigured {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        Err(CredentialsError::NotConfigured)
    }
}

/// The fields of a service-account JSON key that the token exchange needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Mints access tokens from a service-account key.
pub struct ServiceAccount {
    client: Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    cached: RwLock<Option<CachedToken>>,
}

impl ServiceAccount {
    pub fn new(client: Client, key: ServiceAccountKey) -> Result<Self, CredentialsError> {
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        Ok(Self {
            client,
            key,
            signing_key,
            cached: RwLock::new(None),
        })
    }

    /// Load a service-account key file.
    pub fn from_file(client: Client, path: &Path) -> Result<Self, CredentialsError> {
        let raw = std::fs::read_to_string(path).map_err(|source| CredentialsError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let key: ServiceAccountKey = serde_json::from_str(&raw)?;
        Self::new(client, key)
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    fn assertion(&self, now: u64) -> Result<String, CredentialsError> {
        #[derive(Debug, Serialize)]
        struct Claims<'a> {
            iss: &'a str,
            scope: String,
            aud: &'a str,
            iat: u64,
            exp: u64,
        }

        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES.join(" "),
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_TTL_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        Ok(jsonwebtoken::encode(&header, &claims, &self.signing_key)?)
    }

    async fn exchange(&self) -> Result<CachedToken, CredentialsError> {
        #[derive(Debug, Deserialize)]
        struct TokenResponse {
            access_token: String,
            #[serde(default)]
            expires_in: Option<u64>,
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let assertion = self.assertion(now)?;

        info!(client_email = %self.key.client_email, "oauth_token_exchange_starting");

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read token response body".to_string());
            warn!(status_code = status.as_u16(), "oauth_token_exchange_rejected");
            return Err(CredentialsError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let payload: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(payload.expires_in.unwrap_or(ASSERTION_TTL_SECS));

        info!(expires_in_seconds = lifetime.as_secs(), "oauth_token_exchanged");

        Ok(CachedToken {
            token: payload.access_token,
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccount {
    async fn access_token(&self) -> Result<String, CredentialsError> {
        {
            let cached = self.cached.read().await;
            if let Some(c) = cached.as_ref() {
                if Instant::now() < c.expires_at {
                    return Ok(c.token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring write lock
        if let Some(c) = cached.as_ref() {
            if Instant::now() < c.expires_at {
                return Ok(c.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

/// Pick the token source the configuration asks for.
///
/// A static token wins over a key file. With neither, the returned source
/// fails every call so that only the endpoints that need it are affected.
pub fn from_config(
    config: &Config,
    client: Client,
) -> Result<Arc<dyn TokenSource>, CredentialsError> {
    if let Some(token) = &config.access_token {
        info!(source = "static", "credentials_loaded");
        return Ok(Arc::new(StaticToken::new(token.clone())));
    }

    if let Some(path) = &config.credentials_path {
        let account = ServiceAccount::from_file(client, path)?;
        if let Some(key_project) = account.project_id() {
            if key_project != config.project_id {
                warn!(
                    key_project = %key_project,
                    project_id = %config.project_id,
                    "credentials_project_mismatch"
                );
            }
        }
        info!(
            source = "service_account",
            client_email = %account.client_email(),
            "credentials_loaded"
        );
        return Ok(Arc::new(account));
    }

    warn!("credentials_not_configured");
    Ok(Arc::new(Unconfigured))
}
