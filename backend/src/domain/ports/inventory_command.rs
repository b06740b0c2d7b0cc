//! Driving port for registering stocked devices.

use async_trait::async_trait;

use crate::domain::{
    CallerIdentity, Error, Iccid, Imei, LocalDeviceId, PreloadedMonths, RemoteDeviceId, ServerUrl,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateInventoryRecord {
    pub server_url: ServerUrl,
    pub imei: Imei,
    pub iccid: Iccid,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub preloaded_months: Option<PreloadedMonths>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryRecordCreated {
    pub local_id: LocalDeviceId,
    pub remote_device_id: RemoteDeviceId,
    pub generated_name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryCommand: Send + Sync {
    /// Admin only.
    async fn create_record(
        &self,
        caller: &CallerIdentity,
        request: CreateInventoryRecord,
    ) -> Result<InventoryRecordCreated, Error>;
}
