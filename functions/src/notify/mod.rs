//! Push notifications.
//!
//! The [`Notifier`] seam fans a notification out to every device subscribed
//! to a topic. [`FcmNotifier`] delivers through Firebase Cloud Messaging.

pub mod fcm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialsError;

pub use fcm::FcmNotifier;

/// Title shown on every trip notification.
pub const TRIP_NOTIFICATION_TITLE: &str = "Alarm has been tripped!";

/// Visible part of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

impl Notification {
    /// Notification announcing an alarm trip at `time`.
    pub fn trip(time: &str) -> Self {
        Self {
            title: TRIP_NOTIFICATION_TITLE.to_string(),
            body: time.to_string(),
        }
    }
}

/// Identifier the messaging service assigned to an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt(pub String);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialsError),

    #[error("messaging request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("messaging service rejected the message ({status}): {body}")]
    Rejected { status: u16, body: String },
}

/// Capability to publish a notification to a topic.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        notification: &Notification,
    ) -> Result<DeliveryReceipt, NotifyError>;
}
