//! Event storage.
//!
//! The [`EventStore`] seam appends records to a named collection.
//! [`FirestoreStore`] writes them as Firestore documents.

pub mod firestore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialsError;

pub use firestore::FirestoreStore;

/// A recorded alarm trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripEvent {
    /// ISO-8601 UTC timestamp of the trip
    pub time: String,
}

/// Name of the document the store created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReceipt(pub String);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected the write ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Capability to append a record to a collection.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, collection: &str, event: &TripEvent) -> Result<WriteReceipt, StoreError>;
}
