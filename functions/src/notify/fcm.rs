//! Firebase Cloud Messaging delivery.
//!
//! Uses the HTTP v1 API: one `messages:send` call per topic message.
//! Reference: https://firebase.google.com/docs/cloud-messaging/send-message#send-messages-to-topics

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{DeliveryReceipt, Notification, Notifier, NotifyError};
use crate::credentials::TokenSource;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: Message<'a>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    topic: &'a str,
    notification: &'a Notification,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

/// Publishes topic messages through FCM.
pub struct FcmNotifier {
    client: Client,
    endpoint: String,
    tokens: Arc<dyn TokenSource>,
}

impl FcmNotifier {
    pub fn new(
        client: Client,
        base_url: &str,
        project_id: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            client,
            endpoint: format!(
                "{}/v1/projects/{}/messages:send",
                base_url.trim_end_matches('/'),
                project_id
            ),
            tokens,
        }
    }
}

#[async_trait]
impl Notifier for FcmNotifier {
    async fn publish(
        &self,
        topic: &str,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError> {
        let token = self.tokens.access_token().await?;

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&SendRequest {
                message: Message {
                    topic,
                    notification,
                },
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read messaging response body".to_string());
            warn!(topic = %topic, status_code = status.as_u16(), "fcm_publish_rejected");
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let sent: SendResponse = response.json().await?;

        info!(topic = %topic, message_name = %sent.name, "fcm_published");

        Ok(DeliveryReceipt(sent.name))
    }
}
