//! Driving port for enabling and disabling device connectivity.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{CallerIdentity, Error, Imei};

/// Result of an enable request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationOutcome {
    /// `true` when the SIM was already enabled and nothing changed.
    pub already_enabled: bool,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeactivationOutcome {
    pub already_disabled: bool,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityCommand: Send + Sync {
    async fn enable(&self, caller: &CallerIdentity, imei: &Imei)
    -> Result<ActivationOutcome, Error>;

    async fn disable(
        &self,
        caller: &CallerIdentity,
        imei: &Imei,
    ) -> Result<DeactivationOutcome, Error>;
}
