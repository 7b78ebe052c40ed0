//! Configuration module for environment variable parsing.
//!
//! Reads all configuration from environment variables. Firebase credentials
//! themselves are never read here, only the location of the key file.

use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;

/// Google's published signing keys for Firebase ID tokens.
pub const DEFAULT_JWKS_URL: &str =
    "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Firebase project id, used as the ID token audience
    pub project_id: String,

    /// Path to a service-account JSON key
    pub credentials_path: Option<PathBuf>,

    /// Static OAuth2 access token, takes precedence over the service account
    pub access_token: Option<String>,

    /// JWKS endpoint for ID token signing keys
    pub jwks_url: String,

    /// Base URL of the Cloud Messaging API
    pub fcm_base_url: String,

    /// Base URL of the Firestore REST API
    pub firestore_base_url: String,

    /// Messaging topic that receives trip notifications
    pub trip_topic: String,

    /// Firestore collection that receives trip events
    pub trip_collection: String,

    /// HTTP request timeout in milliseconds
    pub request_timeout_ms: u64,

    /// Allowed clock skew when checking ID token time claims
    pub clock_skew_secs: u64,
}

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("FIREBASE_PROJECT_ID (or GCLOUD_PROJECT) must be set")]
    MissingProjectId,

    #[error("{name} must not be empty")]
    Empty { name: &'static str },
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Config {
            port: parse_or("PORT", 8080),

            project_id: env::var("FIREBASE_PROJECT_ID")
                .or_else(|_| env::var("GCLOUD_PROJECT"))
                .unwrap_or_default(),

            credentials_path: non_empty("GOOGLE_APPLICATION_CREDENTIALS").map(PathBuf::from),

            access_token: non_empty("GOOGLE_ACCESS_TOKEN"),

            jwks_url: env::var("FIREBASE_JWKS_URL")
                .unwrap_or_else(|_| DEFAULT_JWKS_URL.to_string()),

            fcm_base_url: env::var("FCM_BASE_URL")
                .unwrap_or_else(|_| "https://fcm.googleapis.com".to_string()),

            firestore_base_url: env::var("FIRESTORE_BASE_URL")
                .unwrap_or_else(|_| "https://firestore.googleapis.com".to_string()),

            trip_topic: env::var("TRIP_TOPIC").unwrap_or_else(|_| "trips".to_string()),

            trip_collection: env::var("TRIP_COLLECTION").unwrap_or_else(|_| "trips".to_string()),

            request_timeout_ms: parse_or("REQUEST_TIMEOUT_MS", 8000),

            clock_skew_secs: parse_or("TOKEN_CLOCK_SKEW_SECS", 60),
        }
    }

    /// Check the values the service cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project_id.trim().is_empty() {
            return Err(ConfigError::MissingProjectId);
        }
        if self.trip_topic.trim().is_empty() {
            return Err(ConfigError::Empty { name: "TRIP_TOPIC" });
        }
        if self.trip_collection.trim().is_empty() {
            return Err(ConfigError::Empty {
                name: "TRIP_COLLECTION",
            });
        }
        Ok(())
    }
}

/// Parse a variable, falling back to `default` when unset or malformed.
fn parse_or<T>(name: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    let raw = match env::var(name) {
        Ok(v) => v,
        Err(_) => return default,
    };

    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!(env_var = name, value = %raw, default = %default, "Invalid value, using default");
            default
        }
    }
}

/// Read a variable, treating blank values as unset.
fn non_empty(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
