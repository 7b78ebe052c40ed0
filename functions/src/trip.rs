//! Alarm trip recording.
//!
//! A trip is a short pipeline:
//!
//! ```text
//! now() → notify topic (best effort) → append event (must succeed) → receipt
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{info, warn};

use crate::notify::Notification;
use crate::platform::Platform;
use crate::store::{StoreError, TripEvent, WriteReceipt};

/// Format a trip time as ISO-8601 UTC with millisecond precision.
pub fn trip_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Record a trip happening now.
pub async fn record_trip(platform: &Platform) -> Result<WriteReceipt, StoreError> {
    record_trip_at(platform, Utc::now()).await
}

/// Record a trip at `at`.
///
/// Notification failures are logged and ignored. The event append always
/// runs and its failure is returned.
pub async fn record_trip_at(
    platform: &Platform,
    at: DateTime<Utc>,
) -> Result<WriteReceipt, StoreError> {
    let time = trip_timestamp(at);
    info!(trip_time = %time, "trip_recording");

    let notification = Notification::trip(&time);
    match platform
        .notifier
        .publish(&platform.trip_topic, &notification)
        .await
    {
        Ok(receipt) => info!(
            topic = %platform.trip_topic,
            receipt = %receipt.0,
            "trip_notification_sent"
        ),
        Err(e) => warn!(
            topic = %platform.trip_topic,
            error = %e,
            "trip_notification_failed"
        ),
    }

    let receipt = platform
        .store
        .append(&platform.trip_collection, &TripEvent { time: time.clone() })
        .await?;

    info!(trip_time = %time, document = %receipt.0, "trip_recorded");

    Ok(receipt)
}
