//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;

use crate::auth::{Identity, IdentityVerifier, VerifyError};
use crate::notify::{DeliveryReceipt, Notification, Notifier, NotifyError};
use crate::platform::Platform;
use crate::store::{EventStore, StoreError, TripEvent, WriteReceipt};
use crate::Config;

pub const TEST_PROJECT: &str = "discolemur-info";
pub const TEST_KID: &str = "test-key-1";

/// PKCS#1 RSA key used to sign test tokens and assertions.
pub const TEST_PRIVATE_KEY: &str = include_str!("../testdata/rsa_test_key.pem");

/// Base64url modulus of [`TEST_PRIVATE_KEY`]; the exponent is `AQAB`.
pub const TEST_PUBLIC_JWK_N: &str = "tqosYCbLSRwHQVuq0w2_-sr5A_uyJZIEeSZzEZvb0OjZ9_I-uTJTWSrLuqksQdKNjsBuX754IoSm9jrf3Mw3jn0qosSScWA2KlvGunCNcqUO9W0bssgccUJUHtPdPETB9xjSsWiLgECJBqhpis1efh2SKoqnC2tY75NFzz9TWUJ3IQhe6o0l_5oZ58nhdnyWO6YRUF6U8zonJ9H3sM66kkcOe5Tb0U6wcwPfvOE-JGosXcUL29DsDa9oPyF4oiI6HffAEhPv9tqe2YpqYdLZ4Ht7CWPWFB8YAYZ8g6LAdXwu5ya6ieJDv0_tbdE7M8PNtXRC4OuBZmLBrl8VKtqnkQ";

pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// JWKS document publishing the test key under [`TEST_KID`], next to an
/// EC key the verifier has to skip.
pub fn test_jwks() -> serde_json::Value {
    jwks_for(TEST_KID)
}

/// JWKS document publishing the test key under `kid`.
pub fn jwks_for(kid: &str) -> serde_json::Value {
    json!({
        "keys": [
            {
                "kty": "EC",
                "kid": "not-rsa",
                "use": "sig",
                "crv": "P-256",
                "x": "f83OJ3D2xF1Bg8vub9tLe1gHMzV76e8Tus9uPHvRVEU",
                "y": "x_FEzRu9m36HLN_tue659LNpXW6pCyStikYjKIWI5a0"
            },
            {
                "kty": "RSA",
                "alg": "RS256",
                "use": "sig",
                "kid": kid,
                "n": TEST_PUBLIC_JWK_N,
                "e": "AQAB"
            }
        ]
    })
}

pub fn sign_rs256(kid: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(TEST_PRIVATE_KEY.as_bytes()).unwrap();
    jsonwebtoken::encode(&header, claims, &key).unwrap()
}

pub fn identity(uid: &str) -> Identity {
    let now = now_secs();
    Identity {
        uid: uid.to_string(),
        aud: TEST_PROJECT.to_string(),
        iss: format!("https://securetoken.google.com/{}", TEST_PROJECT),
        iat: now,
        exp: now + 3600,
        auth_time: Some(now),
        email: None,
        email_verified: None,
        name: None,
        firebase: None,
    }
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        project_id: TEST_PROJECT.to_string(),
        credentials_path: None,
        access_token: None,
        jwks_url: "http://127.0.0.1:1/jwks".to_string(),
        fcm_base_url: "http://127.0.0.1:1".to_string(),
        firestore_base_url: "http://127.0.0.1:1".to_string(),
        trip_topic: "trips".to_string(),
        trip_collection: "trips".to_string(),
        request_timeout_ms: 1000,
        clock_skew_secs: 60,
    }
}

pub fn platform(
    verifier: impl Into<Arc<FakeVerifier>>,
    notifier: impl Into<Arc<FakeNotifier>>,
    store: impl Into<Arc<FakeStore>>,
) -> Platform {
    let verifier: Arc<FakeVerifier> = verifier.into();
    let notifier: Arc<FakeNotifier> = notifier.into();
    let store: Arc<FakeStore> = store.into();
    Platform::new(verifier, notifier, store)
}

/// Accepts exactly one token and records every call.
pub struct FakeVerifier {
    accepted: Option<(String, Identity)>,
    seen: Mutex<Vec<String>>,
}

impl FakeVerifier {
    pub fn accepting(token: &str, identity: Identity) -> Self {
        Self {
            accepted: Some((token.to_string(), identity)),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting_all() -> Self {
        Self {
            accepted: None,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityVerifier for FakeVerifier {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        self.seen.lock().unwrap().push(token.to_string());
        match &self.accepted {
            Some((accepted, identity)) if accepted == token => Ok(identity.clone()),
            _ => Err(VerifyError::Malformed("not a test token".to_string())),
        }
    }
}

pub struct FakeNotifier {
    fail: bool,
    published: Mutex<Vec<(String, Notification)>>,
}

impl FakeNotifier {
    pub fn ok() -> Self {
        Self {
            fail: false,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            published: Mutex::new(Vec::new()),
        }
    }

    /// Every publish attempt, including failed ones.
    pub fn published(&self) -> Vec<(String, Notification)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn publish(
        &self,
        topic: &str,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError> {
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), notification.clone()));
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "messaging down".to_string(),
            });
        }
        Ok(DeliveryReceipt(format!("projects/{}/messages/1", TEST_PROJECT)))
    }
}

pub struct FakeStore {
    fail: bool,
    writes: AtomicUsize,
    appended: Mutex<Vec<(String, TripEvent)>>,
}

impl FakeStore {
    pub fn ok() -> Self {
        Self {
            fail: false,
            writes: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            writes: AtomicUsize::new(0),
            appended: Mutex::new(Vec::new()),
        }
    }

    /// Successful appends only.
    pub fn appended(&self) -> Vec<(String, TripEvent)> {
        self.appended.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventStore for FakeStore {
    async fn append(&self, collection: &str, event: &TripEvent) -> Result<WriteReceipt, StoreError> {
        if self.fail {
            return Err(StoreError::Rejected {
                status: 503,
                body: "firestore unavailable".to_string(),
            });
        }
        let n = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.appended
            .lock()
            .unwrap()
            .push((collection.to_string(), event.clone()));
        Ok(WriteReceipt(format!("{}/doc-{}", collection, n)))
    }
}
