//! Tripwire - authenticated alarm webhooks on Firebase.
//!
//! This library provides the modules behind two binaries:
//! - `tripwire-web`: web server exposing `/helloWorld` and `/tripAlarm`
//! - `tripwire-smoke`: smoke client for a deployed instance
//!
//! ## Architecture
//!
//! ```text
//! Request → auth gate (Firebase ID token) → handler → FCM topic + Firestore collection
//! ```
//!
//! All Firebase access goes through a [`Platform`] built once at startup
//! and injected into the router state.

pub mod auth;
pub mod config;
pub mod credentials;
pub mod notify;
pub mod platform;
pub mod store;
pub mod trip;
pub mod web;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use auth::{authenticate, AuthResult, FirebaseVerifier, Identity, IdentityVerifier};
pub use config::Config;
pub use notify::{Notification, Notifier};
pub use platform::Platform;
pub use store::{EventStore, TripEvent};
pub use trip::record_trip;
pub use web::{router, AppState};
