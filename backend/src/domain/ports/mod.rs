//! Domain ports for the hexagonal boundary.
//!
//! Driven ports (`TrackingClient`, `ConnectivityClient`, `IdentityVerifier`,
//! the record store repositories) are implemented by outbound adapters.
//! Driving ports (`*Command`, `*Query`) are implemented by domain services
//! and consumed by inbound adapters.

mod macros;
pub(crate) use macros::define_port_error;

mod connectivity_client;
mod connectivity_command;
mod device_assignment_command;
mod device_insight_query;
mod identity_verifier;
mod inventory_command;
mod platform_query;
mod record_store;
mod tracking_client;
mod user_sync_command;

pub use connectivity_client::{
    AccountBalance, ConnectivityClient, ConnectivityClientError, SimCard, SimState,
    SimStateChange, UsageRecord,
};
pub use connectivity_command::{ActivationOutcome, ConnectivityCommand, DeactivationOutcome};
pub use device_assignment_command::{DeviceAssignmentCommand, LinkDeviceRequest, LinkedDevice};
pub use device_insight_query::{
    DeviceInsightQuery, DeviceStatus, PositionHistory, PositionHistoryRequest,
};
pub use identity_verifier::{IdentityVerificationError, IdentityVerifier, VerifiedClaims};
pub use inventory_command::{CreateInventoryRecord, InventoryCommand, InventoryRecordCreated};
pub use platform_query::{DependencyStatus, PlatformQuery, PlatformStatus};
pub use record_store::{
    DeviceRepository, RecordStoreError, RoutingRepository, StoreProbe, UserRepository,
};
pub use tracking_client::{
    Position, PositionWindow, RemoteDevice, RemoteUser, RemoteUserDraft, SUBJECT_ATTRIBUTE,
    ServerInfo, TrackingClient, TrackingClientError,
};
pub use user_sync_command::{
    DeleteUserRequest, SyncOutcome, SyncTarget, SyncUserRequest, UpdateUserRequest,
    UserSyncCommand,
};

#[cfg(test)]
pub use connectivity_client::MockConnectivityClient;
#[cfg(test)]
pub use connectivity_command::MockConnectivityCommand;
#[cfg(test)]
pub use device_assignment_command::MockDeviceAssignmentCommand;
#[cfg(test)]
pub use device_insight_query::MockDeviceInsightQuery;
#[cfg(test)]
pub use identity_verifier::MockIdentityVerifier;
#[cfg(test)]
pub use inventory_command::MockInventoryCommand;
#[cfg(test)]
pub use platform_query::MockPlatformQuery;
#[cfg(test)]
pub use record_store::{
    MockDeviceRepository, MockRoutingRepository, MockStoreProbe, MockUserRepository,
};
#[cfg(test)]
pub use tracking_client::MockTrackingClient;
#[cfg(test)]
pub use user_sync_command::MockUserSyncCommand;
