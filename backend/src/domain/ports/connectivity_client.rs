//! Driven port for the SIM connectivity provider.

use async_trait::async_trait;

use crate::domain::Iccid;

use super::define_port_error;

define_port_error! {
    /// Errors surfaced while calling the connectivity provider.
    pub enum ConnectivityClientError {
        Transport { message: String } => "connectivity provider transport failed: {message}",
        Timeout { message: String } => "connectivity provider timed out: {message}",
        NotFound { message: String } => "sim card not found: {message}",
        Rejected { message: String } => "connectivity provider rejected request: {message}",
        Decode { message: String } => "connectivity provider response decode failed: {message}",
    }
}

/// Normalised SIM state.
///
/// Providers report the same two states under different names; both
/// vocabularies map onto the same variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimState {
    Enabled,
    Disabled,
    Other(String),
}

impl SimState {
    pub fn from_remote(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enabled" | "active" => Self::Enabled,
            "disabled" | "inactive" => Self::Disabled,
            other => Self::Other(other.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Other(raw) => raw.as_str(),
        }
    }
}

/// Target state for [`ConnectivityClient::set_sim_state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimStateChange {
    Enable,
    Disable,
}

impl SimStateChange {
    pub fn as_remote(self) -> &'static str {
        match self {
            Self::Enable => "enabled",
            Self::Disable => "disabled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimCard {
    pub iccid: Iccid,
    pub state: SimState,
    pub name: Option<String>,
}

/// One usage period reported for a SIM.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub period: String,
    pub data_bytes: u64,
    pub sms_count: u64,
    pub cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountBalance {
    pub amount: f64,
    pub currency: Option<String>,
}

/// Port for SIM inspection and state changes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectivityClient: Send + Sync {
    async fn sim_details(&self, iccid: &Iccid) -> Result<SimCard, ConnectivityClientError>;

    async fn rename_sim(&self, iccid: &Iccid, name: &str) -> Result<(), ConnectivityClientError>;

    async fn set_sim_state(
        &self,
        iccid: &Iccid,
        change: SimStateChange,
    ) -> Result<(), ConnectivityClientError>;

    async fn usage(&self, iccid: &Iccid) -> Result<Vec<UsageRecord>, ConnectivityClientError>;

    async fn account_balance(&self) -> Result<AccountBalance, ConnectivityClientError>;
}
