//! Request authentication.
//!
//! This module provides:
//! - The auth gate that turns an `Authorization` header into an [`AuthResult`]
//! - The [`IdentityVerifier`] seam the gate calls
//! - A Firebase ID token verifier backed by Google's published signing keys
//!
//! ## Flow
//!
//! ```text
//! Authorization: Bearer <token> → bearer_token() → IdentityVerifier::verify() → AuthResult
//! ```

pub mod firebase;
pub mod gate;

pub use firebase::FirebaseVerifier;
pub use gate::{
    authenticate, bearer_token, AuthResult, FirebaseClaims, Identity, IdentityVerifier,
    VerifyError, BEARER_PREFIX,
};
