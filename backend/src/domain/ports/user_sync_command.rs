//! Driving port for end-user provisioning and reconciliation.

use async_trait::async_trait;

use crate::domain::{
    CallerIdentity, CountryCode, Error, LocalUserId, RemoteUserId, ServerUrl, UserProfile,
};

/// Where a first-time user should be provisioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTarget {
    /// Resolve the tracking server through the country routing table.
    Country(CountryCode),
    /// Use this tracking server directly.
    Server(ServerUrl),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncUserRequest {
    pub target: SyncTarget,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// Result of a sync: whether a new account was provisioned, plus the
/// normalised profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: bool,
    pub profile: UserProfile,
}

/// Explicit profile edit addressed by the record identifiers the client
/// received earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateUserRequest {
    pub local_id: LocalUserId,
    pub remote_id: RemoteUserId,
    pub server_url: ServerUrl,
    pub name: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteUserRequest {
    pub local_id: LocalUserId,
    pub remote_id: RemoteUserId,
    pub server_url: ServerUrl,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserSyncCommand: Send + Sync {
    /// Reconcile the caller across the tracking server and local store.
    async fn sync(
        &self,
        caller: &CallerIdentity,
        request: SyncUserRequest,
    ) -> Result<SyncOutcome, Error>;

    async fn update_profile(
        &self,
        caller: &CallerIdentity,
        request: UpdateUserRequest,
    ) -> Result<UserProfile, Error>;

    async fn delete(&self, caller: &CallerIdentity, request: DeleteUserRequest)
    -> Result<(), Error>;

    /// Obtain and store a tracking-server session token for the caller.
    async fn issue_session_token(
        &self,
        caller: &CallerIdentity,
        server: Option<ServerUrl>,
    ) -> Result<String, Error>;

    async fn register_push_token(&self, caller: &CallerIdentity, token: String)
    -> Result<(), Error>;
}
