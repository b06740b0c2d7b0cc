//! Driven ports for the local relational record store.
//!
//! Repositories never panic through the core: every failure comes back as
//! a [`RecordStoreError`] and the coordinator decides what it means.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    CountryCode, DeviceRecord, Imei, LocalDeviceId, LocalUserId, NewDeviceRecord, NewUserRecord,
    ProfileChanges, RemoteUserId, ServerUrl, SubjectId, UserRecord,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by record store adapters.
    pub enum RecordStoreError {
        /// The store could not be reached.
        Connection { message: String } => "record store connection failed: {message}",
        /// A query or mutation failed.
        Query { message: String } => "record store query failed: {message}",
        /// A unique constraint rejected the write.
        UniqueViolation { message: String } => "record store unique violation: {message}",
        /// The row targeted by an update does not exist.
        Missing { message: String } => "record store row missing: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Every row carrying `subject`. More than one row is an integrity fault
    /// the caller must surface, so this deliberately returns a list.
    async fn find_by_subject(&self, subject: &SubjectId)
    -> Result<Vec<UserRecord>, RecordStoreError>;

    async fn find_by_id(&self, id: LocalUserId) -> Result<Option<UserRecord>, RecordStoreError>;

    async fn insert(&self, user: &NewUserRecord) -> Result<UserRecord, RecordStoreError>;

    async fn update_remote_user_id(
        &self,
        id: LocalUserId,
        remote: RemoteUserId,
    ) -> Result<(), RecordStoreError>;

    async fn update_profile(
        &self,
        id: LocalUserId,
        changes: &ProfileChanges,
    ) -> Result<UserRecord, RecordStoreError>;

    async fn update_session_token(
        &self,
        id: LocalUserId,
        token: &str,
    ) -> Result<(), RecordStoreError>;

    async fn update_push_token(&self, id: LocalUserId, token: &str)
    -> Result<(), RecordStoreError>;

    async fn delete(&self, id: LocalUserId) -> Result<(), RecordStoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    async fn find_by_imei(&self, imei: &Imei) -> Result<Option<DeviceRecord>, RecordStoreError>;

    async fn insert(&self, device: &NewDeviceRecord) -> Result<DeviceRecord, RecordStoreError>;

    /// Assign the device to `user` under `label` only while it is
    /// unassigned.
    ///
    /// Returns `false` when another writer claimed it first; the row then
    /// keeps the winner's label.
    async fn assign_if_unassigned(
        &self,
        imei: &Imei,
        user: LocalUserId,
        label: &str,
    ) -> Result<bool, RecordStoreError>;

    async fn update_expiration(
        &self,
        id: LocalDeviceId,
        expiration: DateTime<Utc>,
    ) -> Result<(), RecordStoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoutingRepository: Send + Sync {
    /// Tracking server registered for `country`.
    async fn server_for_country(
        &self,
        country: &CountryCode,
    ) -> Result<Option<ServerUrl>, RecordStoreError>;
}

/// Liveness probe for the store itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoreProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RecordStoreError>;
}
