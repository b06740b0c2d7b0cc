//! Driven port for the regional GPS tracking servers.
//!
//! Every call names the server it targets because users and devices live on
//! the tracking server chosen for their country. Adapters translate remote
//! failures into [`TrackingClientError`] so coordinators can decide whether
//! to roll back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::domain::{
    EmailAddress, Imei, RemoteDeviceId, RemoteUserId, ServerUrl, SubjectId,
};

use super::define_port_error;

/// Attribute key under which the identity subject is stored on remote users.
pub const SUBJECT_ATTRIBUTE: &str = "authSubject";

define_port_error! {
    /// Errors surfaced while calling a tracking server.
    pub enum TrackingClientError {
        /// Network transport failed before a response arrived.
        Transport { message: String } => "tracking server transport failed: {message}",
        /// The call exceeded the configured timeout.
        Timeout { message: String } => "tracking server timed out: {message}",
        /// The addressed user, device or permission does not exist.
        NotFound { message: String } => "tracking server resource not found: {message}",
        /// A unique attribute (email, unique id) is already taken.
        Duplicate { message: String } => "tracking server reports duplicate: {message}",
        /// The server refused the request.
        Rejected { message: String } => "tracking server rejected request: {message}",
        /// The response body did not match the expected shape.
        Decode { message: String } => "tracking server response decode failed: {message}",
    }
}

/// User account as held by a tracking server.
///
/// `passthrough` carries server-owned fields the core does not model so an
/// update can send them back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteUser {
    pub id: RemoteUserId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub attributes: Map<String, Value>,
    pub passthrough: Map<String, Value>,
}

impl RemoteUser {
    /// Identity subject stored on the account, if any.
    pub fn subject_attribute(&self) -> Option<&str> {
        self.attributes.get(SUBJECT_ATTRIBUTE).and_then(Value::as_str)
    }
}

/// Canonical representation used to create a remote user.
#[derive(Clone, PartialEq)]
pub struct RemoteUserDraft {
    pub name: String,
    pub email: EmailAddress,
    pub phone: Option<String>,
    pub password: Zeroizing<String>,
    pub subject: SubjectId,
}

impl std::fmt::Debug for RemoteUserDraft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteUserDraft")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("phone", &self.phone)
            .field("password", &"<redacted>")
            .field("subject", &self.subject)
            .finish()
    }
}

/// Device as held by a tracking server.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDevice {
    pub id: RemoteDeviceId,
    pub name: String,
    pub unique_id: String,
    pub status: Option<String>,
    pub last_update: Option<DateTime<Utc>>,
    pub passthrough: Map<String, Value>,
}

/// One GPS fix reported by a device.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub device_id: RemoteDeviceId,
    pub fix_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Speed in knots, as reported by the server.
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerInfo {
    pub version: Option<String>,
}

/// Port for user, device, permission and position calls on a tracking server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackingClient: Send + Sync {
    async fn get_user(
        &self,
        server: &ServerUrl,
        id: RemoteUserId,
    ) -> Result<RemoteUser, TrackingClientError>;

    /// Create a user; [`TrackingClientError::Duplicate`] when the email is taken.
    async fn create_user(
        &self,
        server: &ServerUrl,
        draft: &RemoteUserDraft,
    ) -> Result<RemoteUser, TrackingClientError>;

    /// Replace the user with `user`, including its passthrough fields.
    ///
    /// `password` replaces the login secret; `None` keeps the current one.
    async fn update_user(
        &self,
        server: &ServerUrl,
        user: &RemoteUser,
        password: Option<Zeroizing<String>>,
    ) -> Result<RemoteUser, TrackingClientError>;

    async fn delete_user(
        &self,
        server: &ServerUrl,
        id: RemoteUserId,
    ) -> Result<(), TrackingClientError>;

    async fn get_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<RemoteDevice, TrackingClientError>;

    async fn create_device(
        &self,
        server: &ServerUrl,
        name: &str,
        unique_id: &Imei,
    ) -> Result<RemoteDevice, TrackingClientError>;

    async fn update_device(
        &self,
        server: &ServerUrl,
        device: &RemoteDevice,
    ) -> Result<RemoteDevice, TrackingClientError>;

    async fn delete_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<(), TrackingClientError>;

    /// Grant `user` access to `device`.
    async fn link_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError>;

    async fn unlink_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError>;

    async fn positions(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
        window: PositionWindow,
    ) -> Result<Vec<Position>, TrackingClientError>;

    async fn latest_position(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
    ) -> Result<Option<Position>, TrackingClientError>;

    async fn server_info(&self, server: &ServerUrl) -> Result<ServerInfo, TrackingClientError>;

    /// Obtain a session token for the user owning `email`.
    async fn issue_session_token(
        &self,
        server: &ServerUrl,
        email: &EmailAddress,
        password: &str,
    ) -> Result<String, TrackingClientError>;
}
