//! Firestore document writes.
//!
//! Appends go through the REST `createDocument` call without a document id,
//! so Firestore assigns one, the same as `collection.add()`.
//! Reference: https://firebase.google.com/docs/firestore/reference/rest/v1/projects.databases.documents/createDocument

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{EventStore, StoreError, TripEvent, WriteReceipt};
use crate::credentials::TokenSource;

#[derive(Debug, Deserialize)]
struct Document {
    name: String,
}

/// Writes events into the project's default Firestore database.
pub struct FirestoreStore {
    client: Client,
    documents_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl FirestoreStore {
    pub fn new(
        client: Client,
        base_url: &str,
        project_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            documents_url: format!(
                "{}/v1/projects/{}/databases/(default)/documents",
                base_url.trim_end_matches('/'),
                project_id
            ),
            tokens,
        }
    }
}

/// Encode an event as Firestore typed fields.
fn document_fields(event: &TripEvent) -> serde_json::Value {
    json!({
        "fields": {
            "time": { "stringValue": event.time }
        }
    })
}

#[async_trait]
impl EventStore for FirestoreStore {
    async fn append(&self, collection: &str, event: &TripEvent) -> Result<WriteReceipt, StoreError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(format!("{}/{}", self.documents_url, collection))
            .bearer_auth(token)
            .json(&document_fields(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read firestore response body".to_string());
            warn!(
                collection = %collection,
                status_code = status.as_u16(),
                "firestore_append_rejected"
            );
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let document: Document = response.json().await?;

        info!(collection = %collection, document = %document.name, "firestore_appended");

        Ok(WriteReceipt(document.name))
    }
}
