//! The Firebase platform client.
//!
//! One [`Platform`] is built by the entry point and shared by every request.
//! Handlers only see the collaborator traits, so tests swap in fakes.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use tracing::info;

use crate::auth::{FirebaseVerifier, IdentityVerifier};
use crate::credentials::{self, CredentialsError};
use crate::notify::{FcmNotifier, Notifier};
use crate::store::{EventStore, FirestoreStore};
use crate::Config;

/// Collaborators and routing settings for the request handlers.
#[derive(Clone)]
pub struct Platform {
    pub verifier: Arc<dyn IdentityVerifier>,
    pub notifier: Arc<dyn Notifier>,
    pub store: Arc<dyn EventStore>,
    pub trip_topic: String,
    pub trip_collection: String,
}

impl Platform {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn EventStore>,
    ) -> Self {
        Self {
            verifier,
            notifier,
            store,
            trip_topic: "trips".to_string(),
            trip_collection: "trips".to_string(),
        }
    }

    /// Use a different topic and collection for trips.
    pub fn with_trip_targets(mut self, topic: impl Into<String>, collection: impl Into<String>) -> Self {
        self.trip_topic = topic.into();
        self.trip_collection = collection.into();
        self
    }

    /// Build the Firebase-backed collaborators, sharing one HTTP client.
    pub fn from_config(config: &Config) -> Result<Self, PlatformError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .user_agent(concat!("tripwire/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let tokens = credentials::from_config(config, client.clone())?;

        let verifier = FirebaseVerifier::new(
            client.clone(),
            config.jwks_url.clone(),
            config.project_id.clone(),
            config.clock_skew_secs,
        );
        let notifier = FcmNotifier::new(
            client.clone(),
            &config.fcm_base_url,
            &config.project_id,
            tokens.clone(),
        );
        let store = FirestoreStore::new(client, &config.firestore_base_url, &config.project_id, tokens);

        info!(
            project_id = %config.project_id,
            trip_topic = %config.trip_topic,
            trip_collection = %config.trip_collection,
            "platform_initialized"
        );

        Ok(Self::new(Arc::new(verifier), Arc::new(notifier), Arc::new(store))
            .with_trip_targets(config.trip_topic.clone(), config.trip_collection.clone()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}
