//! Driven port for verifying identity-provider bearer tokens.

use async_trait::async_trait;

use crate::domain::{EmailAddress, SubjectId};

use super::define_port_error;

define_port_error! {
    /// Verification failures reported by identity adapters.
    pub enum IdentityVerificationError {
        /// The token was revoked by the provider.
        Revoked { message: String } => "{message}",
        /// The token is past its expiry.
        Expired { message: String } => "{message}",
        /// Signature, audience, issuer or shape checks failed.
        Invalid { message: String } => "{message}",
        /// Verification could not be attempted (key fetch failed, etc.).
        Unavailable { message: String } => "identity provider unavailable: {message}",
    }
}

/// Claims extracted from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedClaims {
    pub subject: SubjectId,
    pub email: Option<EmailAddress>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and return its claims.
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, IdentityVerificationError>;
}
