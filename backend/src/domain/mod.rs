//! Domain primitives, ports and synchronisation services.
//!
//! Purpose: keep the local record store consistent with the tracking
//! server, the connectivity provider and the identity provider. Inbound
//! adapters consume the driving ports in [`ports`]; outbound adapters
//! implement the driven ones.
//!
//! Public surface:
//! - Error / ErrorCode: API error payload with trace correlation.
//! - CallerIdentity: authenticated principal resolved by the gate.
//! - UserRecord / DeviceRecord: local rows mirrored on remote systems.
//! - The `*Service` types implementing each driving port.

pub mod auth;
mod compensation;
mod connectivity;
mod device;
mod device_assignment;
pub mod device_insight;
pub mod error;
mod expiration;
mod failures;
mod identity;
mod inventory;
mod lookup;
mod platform;
pub mod ports;
mod trace_id;
pub mod user;
mod user_sync;

pub use self::auth::{
    AuthGatePolicy, AuthorizationGate, GateDecision, RouteAllowlist, bearer_token,
};
pub use self::compensation::{
    CompensationLog, RollbackEntry, RollbackOutcome, RollbackReport, UndoEffect, at_step,
    with_rollback,
};
pub use self::connectivity::ConnectivityService;
pub use self::device::{
    DeviceRecord, HardwareIdError, Iccid, Imei, LocalDeviceId, NewDeviceRecord, PreloadedMonths,
    RemoteDeviceId, UNNAMED_SIM_MARKER, inventory_device_name, inventory_sim_name,
    is_unnamed_sim,
};
pub use self::device_assignment::DeviceAssignmentService;
pub use self::device_insight::{DeviceInsightService, local_day_window};
pub use self::error::{Error, ErrorCode, ErrorValidationError, TRACE_ID_HEADER};
pub use self::expiration::{entitlement_expiration, is_expired};
pub use self::identity::{
    CallerIdentity, CallerRole, EmailAddress, IdentityValidationError, SubjectId,
};
pub use self::inventory::InventoryService;
pub use self::platform::PlatformService;
pub use self::trace_id::TraceId;
pub use self::user::{
    CountryCode, LocalUserId, NewUserRecord, ProfileChanges, RecordFieldError, RemoteUserId,
    ServerUrl, UserProfile, UserRecord, derive_remote_secret,
};
pub use self::user_sync::UserSyncService;

/// Convenient API result alias.
///
/// # Examples
/// ```
/// use fleet_sync::domain::{ApiResult, Error};
///
/// fn handler() -> ApiResult<()> {
///     Err(Error::forbidden("nope"))
/// }
/// ```
pub type ApiResult<T> = Result<T, Error>;
