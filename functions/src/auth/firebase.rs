//! Firebase ID token verification.
//!
//! Firebase signs ID tokens with RS256 using rotating Google keys published
//! as a JWKS document. A token is accepted when:
//! - its header names a published key (`kid`) and uses RS256
//! - the signature verifies against that key
//! - `aud` is the project id and `iss` is `https://securetoken.google.com/<project id>`
//! - `exp` is in the future, `iat` and `auth_time` are not
//! - `sub` is a non-empty uid of at most 128 characters
//!
//! Reference: https://firebase.google.com/docs/auth/admin/verify-id-tokens

use std::collections::HashMap;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use reqwest::{header::CACHE_CONTROL, Client};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::gate::{Identity, IdentityVerifier, VerifyError};

/// Key set lifetime when the response carries no usable `max-age`.
const DEFAULT_KEYS_MAX_AGE: Duration = Duration::from_secs(3600);

/// Minimum spacing between refetches triggered by an unknown `kid`.
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// How long a failed key fetch is remembered before the next attempt.
const FETCH_FAILURE_BACKOFF: Duration = Duration::from_secs(10);

const MAX_UID_LENGTH: usize = 128;

#[derive(Debug, Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

/// One published key. Only RSA keys carry `n` and `e`.
#[derive(Debug, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
    max_age: Duration,
}

impl CachedKeys {
    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() < self.max_age
    }

    /// A fresh key for `kid`, if one is cached.
    fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        if self.is_fresh() {
            self.keys.get(kid).cloned()
        } else {
            None
        }
    }
}

#[derive(Default)]
struct KeyCache {
    keys: Option<CachedKeys>,
    /// When the last fetch failed, cleared by the next success.
    failed_at: Option<Instant>,
}

impl KeyCache {
    fn lookup(&self, kid: &str) -> Option<DecodingKey> {
        self.keys.as_ref().and_then(|c| c.lookup(kid))
    }

    fn recently_failed(&self, backoff: Duration) -> bool {
        self.failed_at.is_some_and(|at| at.elapsed() < backoff)
    }
}

/// Verifies Firebase ID tokens against Google's published keys.
pub struct FirebaseVerifier {
    client: Client,
    jwks_url: String,
    project_id: String,
    clock_skew: u64,
    min_refresh: Duration,
    failure_backoff: Duration,
    keys: RwLock<KeyCache>,
}

impl FirebaseVerifier {
    pub fn new(
        client: Client,
        jwks_url: impl Into<String>,
        project_id: impl Into<String>,
        clock_skew_secs: u64,
    ) -> Self {
        Self {
            client,
            jwks_url: jwks_url.into(),
            project_id: project_id.into(),
            clock_skew: clock_skew_secs,
            min_refresh: MIN_REFRESH_INTERVAL,
            failure_backoff: FETCH_FAILURE_BACKOFF,
            keys: RwLock::new(KeyCache::default()),
        }
    }

    /// Override the refetch spacing for unknown key ids and the backoff
    /// after a failed fetch.
    pub fn with_refresh_intervals(mut self, min_refresh: Duration, failure_backoff: Duration) -> Self {
        self.min_refresh = min_refresh;
        self.failure_backoff = failure_backoff;
        self
    }

    fn issuer(&self) -> String {
        format!("https://securetoken.google.com/{}", self.project_id)
    }

    fn fetch_backoff_error(&self) -> VerifyError {
        VerifyError::KeyFetch(format!(
            "previous fetch failed less than {}s ago",
            self.failure_backoff.as_secs()
        ))
    }

    /// Find the decoding key for `kid`, refreshing the key set if needed.
    ///
    /// At most one fetch runs at a time. Requests queued behind a failed
    /// fetch fail fast until the backoff has passed.
    async fn key_for(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        {
            let cache = self.keys.read().await;
            if let Some(key) = cache.lookup(kid) {
                return Ok(key);
            }
            if cache.recently_failed(self.failure_backoff) {
                return Err(self.fetch_backoff_error());
            }
        }

        let mut cache = self.keys.write().await;

        // Double-check after acquiring write lock
        if let Some(key) = cache.lookup(kid) {
            return Ok(key);
        }
        if cache.recently_failed(self.failure_backoff) {
            return Err(self.fetch_backoff_error());
        }
        if let Some(cached) = cache.keys.as_ref() {
            if cached.is_fresh() && cached.fetched_at.elapsed() < self.min_refresh {
                return Err(VerifyError::UnknownKey {
                    kid: kid.to_string(),
                });
            }
        }

        let fresh = match self.fetch_keys().await {
            Ok(fresh) => fresh,
            Err(e) => {
                cache.failed_at = Some(Instant::now());
                return Err(e);
            }
        };
        let key = fresh.keys.get(kid).cloned();
        cache.keys = Some(fresh);
        cache.failed_at = None;

        key.ok_or_else(|| VerifyError::UnknownKey {
            kid: kid.to_string(),
        })
    }

    async fn fetch_keys(&self) -> Result<CachedKeys, VerifyError> {
        info!(url = %self.jwks_url, "firebase_keys_fetching");

        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status_code = status.as_u16(), "firebase_keys_fetch_rejected");
            return Err(VerifyError::KeyFetch(format!("status {}", status.as_u16())));
        }

        let max_age = response
            .headers()
            .get(CACHE_CONTROL)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_max_age)
            .unwrap_or(DEFAULT_KEYS_MAX_AGE);

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| VerifyError::KeyFetch(e.to_string()))?;

        let mut keys = HashMap::with_capacity(set.keys.len());
        for jwk in set.keys {
            if jwk.kty != "RSA" {
                warn!(kid = %jwk.kid, kty = %jwk.kty, "firebase_key_skipped");
                continue;
            }
            let (Some(n), Some(e)) = (jwk.n.as_deref(), jwk.e.as_deref()) else {
                warn!(kid = %jwk.kid, "firebase_key_missing_components");
                continue;
            };
            match DecodingKey::from_rsa_components(n, e) {
                Ok(key) => {
                    keys.insert(jwk.kid, key);
                }
                Err(e) => warn!(kid = %jwk.kid, error = %e, "firebase_key_invalid"),
            }
        }

        info!(
            key_count = keys.len(),
            max_age_seconds = max_age.as_secs(),
            "firebase_keys_fetched"
        );

        Ok(CachedKeys {
            keys,
            fetched_at: Instant::now(),
            max_age,
        })
    }

    /// Time claims `jsonwebtoken` does not check itself.
    fn check_issued_times(&self, identity: &Identity, now: u64) -> Result<(), VerifyError> {
        let latest = now + self.clock_skew;

        if identity.iat > latest {
            return Err(VerifyError::InvalidClaim {
                claim: "iat",
                reason: "issued in the future".to_string(),
            });
        }
        if let Some(auth_time) = identity.auth_time {
            if auth_time > latest {
                return Err(VerifyError::InvalidClaim {
                    claim: "auth_time",
                    reason: "authenticated in the future".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityVerifier for FirebaseVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;

        if header.alg != Algorithm::RS256 {
            return Err(VerifyError::UnsupportedAlgorithm(format!("{:?}", header.alg)));
        }
        let kid = header.kid.ok_or(VerifyError::MissingKeyId)?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&[&self.project_id]);
        validation.set_issuer(&[self.issuer()]);
        validation.set_required_spec_claims(&["exp", "iat", "aud", "iss", "sub"]);
        validation.leeway = self.clock_skew;

        let identity = decode::<Identity>(token, &key, &validation)
            .map_err(map_jwt_error)?
            .claims;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.check_issued_times(&identity, now)?;

        let uid_chars = identity.uid.chars().count();
        if uid_chars == 0 || uid_chars > MAX_UID_LENGTH {
            return Err(VerifyError::InvalidClaim {
                claim: "sub",
                reason: format!("uid length {} out of range", uid_chars),
            });
        }

        Ok(identity)
    }
}

fn map_jwt_error(error: jsonwebtoken::errors::Error) -> VerifyError {
    match error.kind() {
        ErrorKind::ExpiredSignature => VerifyError::Expired,
        ErrorKind::InvalidSignature => VerifyError::BadSignature,
        ErrorKind::InvalidAudience => VerifyError::InvalidClaim {
            claim: "aud",
            reason: "wrong project".to_string(),
        },
        ErrorKind::InvalidIssuer => VerifyError::InvalidClaim {
            claim: "iss",
            reason: "wrong issuer".to_string(),
        },
        ErrorKind::MissingRequiredClaim(claim) => VerifyError::InvalidClaim {
            claim: "required",
            reason: format!("missing {}", claim),
        },
        _ => VerifyError::Malformed(error.to_string()),
    }
}

/// Parse `max-age` out of a `Cache-Control` header value.
fn parse_max_age(value: &str) -> Option<Duration> {
    value
        .split(',')
        .filter_map(|directive| directive.trim().strip_prefix("max-age="))
        .find_map(|secs| secs.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
