//! The auth gate.
//!
//! Every failure on the way to an identity (missing header, wrong scheme,
//! bad token, unreachable key server) collapses into the same
//! unauthenticated [`AuthResult`]. Nothing here returns an error.

use async_trait::async_trait;
use axum::http::{header::AUTHORIZATION, HeaderMap};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Literal prefix of a bearer credential.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Decoded identity of a verified caller.
///
/// Field names follow the Firebase ID token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Firebase user id
    #[serde(rename = "sub")]
    pub uid: String,
    pub aud: String,
    pub iss: String,
    pub iat: u64,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firebase: Option<FirebaseClaims>,
}

/// The nested `firebase` claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseClaims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_in_provider: Option<String>,
}

/// Reasons a token failed verification.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token has no key id")]
    MissingKeyId,

    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("no signing key with id {kid}")]
    UnknownKey { kid: String },

    #[error("invalid signature")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("invalid claim {claim}: {reason}")]
    InvalidClaim { claim: &'static str, reason: String },

    #[error("failed to fetch signing keys: {0}")]
    KeyFetch(String),
}

/// Capability to turn a raw token into an identity.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Outcome of the auth gate.
///
/// Success is derived from the presence of an identity, and only
/// [`authenticate`] attaches one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    identity: Option<Identity>,
}

impl AuthResult {
    pub(crate) fn verified(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub(crate) fn failed() -> Self {
        Self { identity: None }
    }

    pub fn success(&self) -> bool {
        self.identity.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn into_identity(self) -> Option<Identity> {
        self.identity
    }
}

/// Extract the token from a `Bearer` authorization header.
///
/// Returns `None` when the header is absent, not valid UTF-8, or does not
/// start with `"Bearer "`. The token may be empty.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
}

/// Authenticate a request from its headers.
///
/// Makes at most one verifier call and never fails: verification errors
/// are logged and reported as an unauthenticated result.
pub async fn authenticate(verifier: &dyn IdentityVerifier, headers: &HeaderMap) -> AuthResult {
    let token = match bearer_token(headers) {
        Some(token) => token,
        None => {
            warn!(
                has_authorization = headers.contains_key(AUTHORIZATION),
                "auth_header_missing_or_malformed"
            );
            return AuthResult::failed();
        }
    };

    match verifier.verify(token).await {
        Ok(identity) => {
            info!(
                uid = %identity.uid,
                sign_in_provider = ?identity.firebase.as_ref().and_then(|f| f.sign_in_provider.as_deref()),
                "auth_identity_verified"
            );
            AuthResult::verified(identity)
        }
        Err(e) => {
            warn!(error = %e, token_length = token.len(), "auth_verification_failed");
            AuthResult::failed()
        }
    }
}
