//! Linking an inventory device to an end user.
//!
//! Order of work: rename the remote device, grant the user's permission on
//! it, then claim the local row. The claim is a conditional write, so when
//! two requests race for one device exactly one of them persists. The loser
//! revokes its own permission, leaves the remote name to the label the
//! winner stored, and reports a conflict.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::compensation::{CompensationLog, UndoEffect, with_rollback};
use crate::domain::failures::{persistence_failure, remote_failure};
use crate::domain::lookup::{require_caller_record, require_device};
use crate::domain::ports::{
    DeviceAssignmentCommand, DeviceRepository, LinkDeviceRequest, LinkedDevice, TrackingClient,
    UserRepository,
};
use crate::domain::user::normalise_optional;
use crate::domain::{CallerIdentity, Error, RemoteDeviceId, ServerUrl};

/// Coordinator implementing [`DeviceAssignmentCommand`].
#[derive(Clone)]
pub struct DeviceAssignmentService<U, D, T> {
    users: Arc<U>,
    devices: Arc<D>,
    tracking: Arc<T>,
}

impl<U, D, T> DeviceAssignmentService<U, D, T> {
    pub fn new(users: Arc<U>, devices: Arc<D>, tracking: Arc<T>) -> Self {
        Self {
            users,
            devices,
            tracking,
        }
    }
}

#[async_trait]
impl<U, D, T> DeviceAssignmentCommand for DeviceAssignmentService<U, D, T>
where
    U: UserRepository,
    D: DeviceRepository,
    T: TrackingClient,
{
    async fn link_device(
        &self,
        caller: &CallerIdentity,
        request: LinkDeviceRequest,
    ) -> Result<LinkedDevice, Error> {
        let LinkDeviceRequest { imei, name } = request;
        let name = normalise_optional(Some(name))
            .ok_or_else(|| Error::invalid_request("device name must not be empty"))?;
        let user = require_caller_record(self.users.as_ref(), caller).await?;
        let device = require_device(self.devices.as_ref(), &imei).await?;
        if device.is_assigned() {
            return Err(Error::conflict(format!("device {imei} is already assigned")));
        }
        if device.server_url != user.server_url {
            return Err(Error::ownership_mismatch(
                "device is registered on a different tracking server than the user",
            ));
        }

        let server = device.server_url.clone();
        let original = self
            .tracking
            .get_device(&server, device.remote_device_id)
            .await
            .map_err(|err| remote_failure("fetch remote device", &err))?;

        let mut renamed = original.clone();
        renamed.name = name.clone();
        renamed.unique_id = imei.as_str().to_owned();
        self.tracking
            .update_device(&server, &renamed)
            .await
            .map_err(|err| remote_failure("rename remote device", &err))?;
        debug!(%imei, "remote device renamed");

        let mut compensations = CompensationLog::new();
        let tracking = &self.tracking;
        let server_ref = &server;
        let applied_name = name.clone();
        compensations.record("restore remote device name", move || async move {
            let current = match tracking.get_device(server_ref, original.id).await {
                Ok(current) => current,
                Err(err) => return Err(err.to_string()),
            };
            if current.name != applied_name {
                return Ok(UndoEffect::Skipped(
                    "device was renamed by another request".to_owned(),
                ));
            }
            tracking
                .update_device(server_ref, &original)
                .await
                .map(|_| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        let remote_user = user.remote_user_id;
        let remote_device = device.remote_device_id;
        if let Err(err) = self
            .tracking
            .link_device(&server, remote_user, remote_device)
            .await
        {
            let failure = Error::remote_sync_failed(err.to_string());
            let report = compensations.unwind().await;
            return Err(with_rollback(failure, "link device permission", &report));
        }
        let mut permission = CompensationLog::new();
        permission.record("unlink device permission", move || async move {
            tracking
                .unlink_device(server_ref, remote_user, remote_device)
                .await
                .map(|()| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        match self.devices.assign_if_unassigned(&imei, user.id, &name).await {
            Ok(true) => {
                info!(%imei, user = %user.id, "device linked");
                self.converge_name(&server, remote_device, &name).await;
                Ok(LinkedDevice { imei, name })
            }
            Ok(false) => {
                let winner = match self.devices.find_by_imei(&imei).await {
                    Ok(row) => row,
                    Err(err) => {
                        warn!(%imei, error = %err, "could not read the concurrent assignment");
                        None
                    }
                };
                let conflict = Error::conflict(format!(
                    "device {imei} was assigned by a concurrent request"
                ));
                let winner_user = winner.as_ref().and_then(|row| row.assigned_user);
                let winner_label = winner.and_then(|row| row.label);
                // The rename is not undone: the winner's label decides the
                // remote name, whichever request renamed last.
                drop(compensations);
                if winner_user == Some(user.id) {
                    // Same user on both sides: the permission is theirs too.
                    if let Some(label) = winner_label {
                        self.converge_name(&server, remote_device, &label).await;
                    }
                    return Err(conflict);
                }
                let report = permission.unwind().await;
                if let Some(label) = winner_label {
                    self.converge_name(&server, remote_device, &label).await;
                }
                Err(with_rollback(conflict, "persist assignment", &report))
            }
            Err(err) => {
                let failure = persistence_failure(&err);
                compensations.append(permission);
                let report = compensations.unwind().await;
                Err(with_rollback(failure, "persist assignment", &report))
            }
        }
    }
}

impl<U, D, T> DeviceAssignmentService<U, D, T>
where
    T: TrackingClient,
{
    /// Set the remote device name to the one recorded by the claim.
    ///
    /// Runs after the local row is settled, so failures are logged rather
    /// than reported.
    async fn converge_name(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
        expected: &str,
    ) {
        let current = match self.tracking.get_device(server, id).await {
            Ok(current) => current,
            Err(err) => {
                warn!(device = %id, error = %err, "could not verify remote device name");
                return;
            }
        };
        if current.name == expected {
            return;
        }
        let mut renamed = current;
        renamed.name = expected.to_owned();
        match self.tracking.update_device(server, &renamed).await {
            Ok(_) => debug!(device = %id, "remote device name converged"),
            Err(err) => warn!(device = %id, error = %err, "could not restore remote device name"),
        }
    }
}
