//! Enabling and disabling a device's SIM connectivity.
//!
//! Enabling is idempotent: a SIM that is already enabled returns the stored
//! expiration and triggers no remote call. A fresh activation grants the
//! device's preloaded months from today and records the new expiration.

use std::sync::Arc;

use async_trait::async_trait;
use mockable::Clock;
use tracing::{debug, info};

use crate::domain::compensation::{CompensationLog, UndoEffect, with_rollback};
use crate::domain::failures::{connectivity_failure, persistence_failure};
use crate::domain::lookup::{ensure_owned, require_caller_record, require_device};
use crate::domain::ports::{
    ActivationOutcome, ConnectivityClient, ConnectivityCommand, DeactivationOutcome,
    DeviceRepository, SimState, SimStateChange, UserRepository,
};
use crate::domain::{
    CallerIdentity, DeviceRecord, Error, Imei, entitlement_expiration, is_expired,
};

/// Coordinator implementing [`ConnectivityCommand`].
#[derive(Clone)]
pub struct ConnectivityService<U, D, C> {
    users: Arc<U>,
    devices: Arc<D>,
    connectivity: Arc<C>,
    clock: Arc<dyn Clock>,
}

impl<U, D, C> ConnectivityService<U, D, C> {
    pub fn new(
        users: Arc<U>,
        devices: Arc<D>,
        connectivity: Arc<C>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            devices,
            connectivity,
            clock,
        }
    }
}

impl<U, D, C> ConnectivityService<U, D, C>
where
    U: UserRepository,
    D: DeviceRepository,
    C: ConnectivityClient,
{
    /// Device the caller may switch: assigned, and assigned to them.
    async fn owned_device(&self, caller: &CallerIdentity, imei: &Imei) -> Result<DeviceRecord, Error> {
        let user = require_caller_record(self.users.as_ref(), caller).await?;
        let device = require_device(self.devices.as_ref(), imei).await?;
        if !device.is_assigned() {
            return Err(Error::invalid_request(format!(
                "device {imei} is not assigned to any user"
            )));
        }
        ensure_owned(&user, &device)?;
        Ok(device)
    }
}

#[async_trait]
impl<U, D, C> ConnectivityCommand for ConnectivityService<U, D, C>
where
    U: UserRepository,
    D: DeviceRepository,
    C: ConnectivityClient,
{
    async fn enable(
        &self,
        caller: &CallerIdentity,
        imei: &Imei,
    ) -> Result<ActivationOutcome, Error> {
        let device = self.owned_device(caller, imei).await?;
        let now = self.clock.utc();
        if is_expired(device.expiration, now) {
            return Err(Error::already_expired("Device is expired. Please renew."));
        }

        let sim = self
            .connectivity
            .sim_details(&device.iccid)
            .await
            .map_err(|err| connectivity_failure("fetch sim status", &err))?;
        if sim.state == SimState::Enabled {
            debug!(%imei, "sim already enabled");
            return Ok(ActivationOutcome {
                already_enabled: true,
                expiration: device.expiration,
            });
        }

        self.connectivity
            .set_sim_state(&device.iccid, SimStateChange::Enable)
            .await
            .map_err(|err| Error::activation_failed(format!("failed to enable sim: {err}")))?;

        let mut compensations = CompensationLog::new();
        let connectivity = &self.connectivity;
        let iccid = &device.iccid;
        compensations.record("disable sim", move || async move {
            connectivity
                .set_sim_state(iccid, SimStateChange::Disable)
                .await
                .map(|()| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        let Some(expiration) = entitlement_expiration(now, device.preloaded_months) else {
            let report = compensations.unwind().await;
            return Err(with_rollback(
                Error::internal("expiration out of range"),
                "compute expiration",
                &report,
            ));
        };
        if let Err(err) = self.devices.update_expiration(device.id, expiration).await {
            let failure = persistence_failure(&err);
            let report = compensations.unwind().await;
            return Err(with_rollback(failure, "persist expiration", &report));
        }

        info!(%imei, %expiration, "sim enabled");
        Ok(ActivationOutcome {
            already_enabled: false,
            expiration: Some(expiration),
        })
    }

    async fn disable(
        &self,
        caller: &CallerIdentity,
        imei: &Imei,
    ) -> Result<DeactivationOutcome, Error> {
        let device = self.owned_device(caller, imei).await?;
        let sim = self
            .connectivity
            .sim_details(&device.iccid)
            .await
            .map_err(|err| connectivity_failure("fetch sim status", &err))?;
        if sim.state == SimState::Disabled {
            return Ok(DeactivationOutcome {
                already_disabled: true,
            });
        }

        self.connectivity
            .set_sim_state(&device.iccid, SimStateChange::Disable)
            .await
            .map_err(|err| Error::activation_failed(format!("failed to disable sim: {err}")))?;
        info!(%imei, "sim disabled");
        Ok(DeactivationOutcome {
            already_disabled: false,
        })
    }
}

#[cfg(test)]
#[path = "connectivity_tests.rs"]
mod tests;
