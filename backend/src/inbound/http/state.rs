//! Shared HTTP adapter state.
//!
//! Handlers accept this state via `actix_web::web::Data` so they only depend
//! on driving ports and stay testable without I/O.

use std::sync::Arc;

use crate::domain::ports::{
    ConnectivityCommand, DeviceAssignmentCommand, DeviceInsightQuery, InventoryCommand,
    PlatformQuery, UserSyncCommand,
};

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub users: Arc<dyn UserSyncCommand>,
    pub assignments: Arc<dyn DeviceAssignmentCommand>,
    pub connectivity: Arc<dyn ConnectivityCommand>,
    pub inventory: Arc<dyn InventoryCommand>,
    pub insight: Arc<dyn DeviceInsightQuery>,
    pub platform: Arc<dyn PlatformQuery>,
}
