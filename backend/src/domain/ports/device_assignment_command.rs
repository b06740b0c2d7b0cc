//! Driving port for linking an inventory device to an end user.

use async_trait::async_trait;

use crate::domain::{CallerIdentity, Error, Imei};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDeviceRequest {
    pub imei: Imei,
    /// Display name the user chose for the device.
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedDevice {
    pub imei: Imei,
    pub name: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceAssignmentCommand: Send + Sync {
    async fn link_device(
        &self,
        caller: &CallerIdentity,
        request: LinkDeviceRequest,
    ) -> Result<LinkedDevice, Error>;
}
