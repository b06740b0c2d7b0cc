//! Identity provider outbound adapter.
//!
//! Verifies Firebase ID tokens (RS256 JWTs) against Google's published
//! signing keys.

mod jwks;
mod verifier;

pub use jwks::{FIREBASE_JWKS_URL, Jwk, JwkCache};
pub use verifier::FirebaseTokenVerifier;
