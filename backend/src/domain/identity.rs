//! Caller identity resolved by the authorization gate.
//!
//! Every driving port receives a [`CallerIdentity`]; the gate is the only
//! place that constructs verified identities, so services can trust the
//! subject and email they are handed.

use serde::{Deserialize, Serialize};

use super::Error;

const ADMIN_OVERRIDE_EMAIL: &str = "admin@system.local";

/// Validation failures for identity primitives.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityValidationError {
    #[error("subject identifier must not be empty")]
    EmptySubject,
    #[error("email address must not be empty")]
    EmptyEmail,
    #[error("email address must contain a single '@' with text on both sides")]
    InvalidEmail,
}

impl From<IdentityValidationError> for Error {
    fn from(value: IdentityValidationError) -> Self {
        Error::invalid_request(value.to_string())
    }
}

/// Stable identifier issued by the identity provider for one end user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(String);

impl SubjectId {
    /// Validate and wrap a subject identifier.
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentityValidationError::EmptySubject);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Email address as asserted by the identity provider.
///
/// Case is preserved: the tracking-server password is derived from the exact
/// text, so normalising it would lock existing accounts out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn new(value: impl Into<String>) -> Result<Self, IdentityValidationError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(IdentityValidationError::EmptyEmail);
        }
        match trimmed.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Self(trimmed.to_owned()))
            }
            _ => Err(IdentityValidationError::InvalidEmail),
        }
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Case-insensitive comparison, used for role matching only.
    pub fn matches_ignoring_case(&self, other: &EmailAddress) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Privilege level attached to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerRole {
    /// Operator authenticated with the shared admin key.
    Admin,
    /// Verified end user whose email matches the configured superadmin.
    Superadmin,
    /// Ordinary verified end user.
    Subscriber,
}

/// Identity of the party issuing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    subject: Option<SubjectId>,
    email: EmailAddress,
    role: CallerRole,
}

impl CallerIdentity {
    /// Identity granted by the admin-key bypass. It carries no subject.
    pub fn admin_override() -> Self {
        Self {
            subject: None,
            email: EmailAddress(ADMIN_OVERRIDE_EMAIL.to_owned()),
            role: CallerRole::Admin,
        }
    }

    /// Identity backed by a verified identity-provider token.
    pub fn verified(subject: SubjectId, email: EmailAddress, role: CallerRole) -> Self {
        Self {
            subject: Some(subject),
            email,
            role,
        }
    }

    pub fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }

    pub fn email(&self) -> &EmailAddress {
        &self.email
    }

    pub fn role(&self) -> CallerRole {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.role, CallerRole::Admin)
    }

    /// Admins and the superadmin may read any device.
    pub fn bypasses_ownership(&self) -> bool {
        matches!(self.role, CallerRole::Admin | CallerRole::Superadmin)
    }

    /// Subject of an end-user caller.
    ///
    /// Operations that act on behalf of an end user reject the admin
    /// override because it has no subject to reconcile.
    pub fn require_subject(&self) -> Result<&SubjectId, Error> {
        self.subject
            .as_ref()
            .ok_or_else(|| Error::forbidden("operation requires an end-user identity"))
    }

    /// Fail unless the caller authenticated with the admin key.
    pub fn require_admin(&self) -> Result<(), Error> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(Error::forbidden("operation requires admin privileges"))
        }
    }
}
