//! Authorization gate: turns request credentials into a [`CallerIdentity`].
//!
//! The gate is transport agnostic. The HTTP middleware hands it the raw
//! admin-key and `Authorization` header values plus the request path, and
//! attaches whatever identity comes back to the request.

use std::sync::Arc;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::ports::{IdentityVerificationError, IdentityVerifier};
use super::{CallerIdentity, CallerRole, EmailAddress, Error};

const BEARER_PREFIX: &str = "Bearer ";

/// Routes that skip credential checks.
///
/// Entries are exact paths, or prefixes when they end in `/*`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteAllowlist {
    exact: Vec<String>,
    prefixes: Vec<String>,
}

impl RouteAllowlist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut allowlist = Self::default();
        for entry in entries {
            let entry = entry.as_ref().trim();
            if entry.is_empty() {
                continue;
            }
            match entry.strip_suffix("/*") {
                Some(prefix) => allowlist.prefixes.push(format!("{prefix}/")),
                None => allowlist.exact.push(entry.to_owned()),
            }
        }
        allowlist
    }

    pub fn permits(&self, path: &str) -> bool {
        self.exact.iter().any(|exact| exact == path)
            || self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

/// Static configuration for the gate.
#[derive(Clone, Default)]
pub struct AuthGatePolicy {
    pub admin_key: Option<Zeroizing<String>>,
    pub superadmin_email: Option<EmailAddress>,
    pub allowlist: RouteAllowlist,
}

/// Resolved outcome for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Route is allowlisted; no identity was resolved.
    Public,
    Authenticated(CallerIdentity),
}

/// Resolves caller identities for incoming requests.
#[derive(Clone)]
pub struct AuthorizationGate {
    verifier: Arc<dyn IdentityVerifier>,
    policy: AuthGatePolicy,
}

impl AuthorizationGate {
    pub fn new(verifier: Arc<dyn IdentityVerifier>, policy: AuthGatePolicy) -> Self {
        Self { verifier, policy }
    }

    /// Decide how the request at `path` is authenticated.
    ///
    /// An exact admin-key match wins without contacting the identity
    /// provider. Otherwise the `Authorization` header must carry a bearer
    /// token that the verifier accepts.
    pub async fn resolve(
        &self,
        path: &str,
        admin_key: Option<&str>,
        authorization: Option<&str>,
    ) -> Result<GateDecision, Error> {
        if self.policy.allowlist.permits(path) {
            return Ok(GateDecision::Public);
        }
        if self.admin_key_matches(admin_key) {
            debug!(path, "admin key accepted");
            return Ok(GateDecision::Authenticated(CallerIdentity::admin_override()));
        }

        let token = bearer_token(authorization)?;
        let claims = self
            .verifier
            .verify(token)
            .await
            .map_err(map_verification_error)?;
        let email = claims
            .email
            .ok_or_else(|| Error::unauthorized("Unauthorized: token carries no email"))?;
        let role = match &self.policy.superadmin_email {
            Some(superadmin) if superadmin.matches_ignoring_case(&email) => CallerRole::Superadmin,
            _ => CallerRole::Subscriber,
        };
        Ok(GateDecision::Authenticated(CallerIdentity::verified(
            claims.subject,
            email,
            role,
        )))
    }

    fn admin_key_matches(&self, presented: Option<&str>) -> bool {
        match (self.policy.admin_key.as_deref(), presented) {
            (Some(expected), Some(presented)) if !expected.is_empty() => {
                constant_time_eq(expected.as_bytes(), presented.as_bytes())
            }
            _ => false,
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, Error> {
    let header = header.ok_or_else(|| Error::unauthorized("Unauthorized: no token provided"))?;
    let token = header.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
        Error::malformed_credential("authorization header must use the Bearer scheme")
    })?;
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return Err(Error::malformed_credential(
            "bearer token must be a single non-empty value",
        ));
    }
    Ok(token)
}

fn map_verification_error(error: IdentityVerificationError) -> Error {
    match error {
        IdentityVerificationError::Revoked { message }
        | IdentityVerificationError::Expired { message }
        | IdentityVerificationError::Invalid { message } => {
            Error::unauthorized(format!("Unauthorized: {message}"))
        }
        IdentityVerificationError::Unavailable { message } => {
            warn!(%message, "identity verification unavailable");
            Error::unauthorized("Unauthorized: token could not be verified")
        }
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter()
        .zip(right)
        .fold(0_u8, |acc, (l, r)| acc | (l ^ r))
        == 0
}
