//! Driving port for platform health and routing lookups.

use async_trait::async_trait;

use crate::domain::{CountryCode, Error, ServerUrl};

/// Health of one dependency.
#[derive(Debug, Clone, PartialEq)]
pub enum DependencyStatus {
    Online { detail: Option<String> },
    Error { message: String },
}

impl DependencyStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlatformStatus {
    pub record_store: DependencyStatus,
    pub tracking_server: DependencyStatus,
    pub connectivity: DependencyStatus,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlatformQuery: Send + Sync {
    /// Probe the store, the tracking server (explicit or default) and the
    /// connectivity provider.
    async fn server_status(&self, server: Option<ServerUrl>) -> Result<PlatformStatus, Error>;

    async fn lookup_route(&self, country: &CountryCode) -> Result<ServerUrl, Error>;
}
