//! Registering a stocked tracker and its SIM.
//!
//! A new record pairs a device on the tracking server with an unassigned SIM
//! and writes the inventory row last. Failures undo the remote steps in
//! reverse: the SIM name goes back to the unassigned marker and the remote
//! device is deleted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::compensation::{CompensationLog, UndoEffect, with_rollback};
use crate::domain::failures::{connectivity_failure, persistence_failure, remote_failure, store_failure};
use crate::domain::ports::{
    ConnectivityClient, ConnectivityClientError, CreateInventoryRecord, DeviceRepository,
    InventoryCommand, InventoryRecordCreated, SimState, TrackingClient, TrackingClientError,
};
use crate::domain::user::normalise_optional;
use crate::domain::{
    CallerIdentity, Error, NewDeviceRecord, UNNAMED_SIM_MARKER, inventory_device_name,
    inventory_sim_name, is_unnamed_sim,
};

const DEFAULT_BRAND: &str = "istartek";
const DEFAULT_MODEL: &str = "VT100";

/// Coordinator implementing [`InventoryCommand`].
#[derive(Clone)]
pub struct InventoryService<D, T, C> {
    devices: Arc<D>,
    tracking: Arc<T>,
    connectivity: Arc<C>,
}

impl<D, T, C> InventoryService<D, T, C> {
    pub fn new(devices: Arc<D>, tracking: Arc<T>, connectivity: Arc<C>) -> Self {
        Self {
            devices,
            tracking,
            connectivity,
        }
    }
}

#[async_trait]
impl<D, T, C> InventoryCommand for InventoryService<D, T, C>
where
    D: DeviceRepository,
    T: TrackingClient,
    C: ConnectivityClient,
{
    async fn create_record(
        &self,
        caller: &CallerIdentity,
        request: CreateInventoryRecord,
    ) -> Result<InventoryRecordCreated, Error> {
        caller.require_admin()?;
        let CreateInventoryRecord {
            server_url,
            imei,
            iccid,
            brand,
            model,
            preloaded_months,
        } = request;

        if self
            .devices
            .find_by_imei(&imei)
            .await
            .map_err(store_failure)?
            .is_some()
        {
            return Err(Error::conflict(format!("device {imei} is already registered")));
        }

        let sim = self
            .connectivity
            .sim_details(&iccid)
            .await
            .map_err(|err| match err {
                ConnectivityClientError::NotFound { .. } => {
                    Error::invalid_request(format!("sim {iccid} not found"))
                }
                other => connectivity_failure("fetch sim", &other),
            })?;
        if sim.state != SimState::Disabled || !is_unnamed_sim(sim.name.as_deref()) {
            return Err(Error::invalid_request(
                "sim is either already named or not disabled",
            ));
        }

        let generated_name = inventory_device_name(&imei, &iccid);
        let remote = self
            .tracking
            .create_device(&server_url, &generated_name, &imei)
            .await
            .map_err(|err| match err {
                TrackingClientError::Duplicate { .. } => Error::conflict(format!(
                    "device {imei} already exists on the tracking server"
                )),
                other => remote_failure("create remote device", &other),
            })?;

        let mut compensations = CompensationLog::new();
        let tracking = &self.tracking;
        let connectivity = &self.connectivity;
        let server_ref = &server_url;
        let iccid_ref = &iccid;
        let remote_id = remote.id;
        compensations.record("delete remote device", move || async move {
            tracking
                .delete_device(server_ref, remote_id)
                .await
                .map(|()| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        if let Err(err) = self
            .connectivity
            .rename_sim(&iccid, &inventory_sim_name(&imei))
            .await
        {
            let failure = Error::remote_sync_failed(err.to_string());
            let report = compensations.unwind().await;
            return Err(with_rollback(failure, "rename sim", &report));
        }
        compensations.record("reset sim name", move || async move {
            connectivity
                .rename_sim(iccid_ref, UNNAMED_SIM_MARKER)
                .await
                .map(|()| UndoEffect::Applied)
                .map_err(|err| err.to_string())
        });

        let new_record = NewDeviceRecord {
            imei: imei.clone(),
            iccid: iccid.clone(),
            remote_device_id: remote.id,
            server_url: server_url.clone(),
            label: Some(generated_name.clone()),
            preloaded_months: preloaded_months.unwrap_or_default(),
            brand: normalise_optional(brand).or_else(|| Some(DEFAULT_BRAND.to_owned())),
            model: normalise_optional(model).or_else(|| Some(DEFAULT_MODEL.to_owned())),
        };
        match self.devices.insert(&new_record).await {
            Ok(record) => {
                info!(%imei, device = %record.id, "inventory record created");
                Ok(InventoryRecordCreated {
                    local_id: record.id,
                    remote_device_id: remote.id,
                    generated_name,
                })
            }
            Err(err) => {
                let failure = persistence_failure(&err);
                let report = compensations.unwind().await;
                Err(with_rollback(failure, "persist inventory row", &report))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        MockConnectivityClient, MockDeviceRepository, MockTrackingClient, RecordStoreError,
        RemoteDevice, SimCard,
    };
    use crate::domain::{
        CallerRole, DeviceRecord, EmailAddress, ErrorCode, Iccid, Imei, LocalDeviceId,
        PreloadedMonths, RemoteDeviceId, ServerUrl, SubjectId,
    };
    use rstest::rstest;
    use serde_json::Map;

    const IMEI: &str = "356938035643809";
    const ICCID: &str = "8931080019073497795";

    fn request() -> CreateInventoryRecord {
        CreateInventoryRecord {
            server_url: ServerUrl::parse("https://eu.track.example").expect("server"),
            imei: Imei::parse(IMEI).expect("imei"),
            iccid: Iccid::parse(ICCID).expect("iccid"),
            brand: None,
            model: None,
            preloaded_months: Some(PreloadedMonths::new(3)),
        }
    }

    fn sim(state: &str, name: Option<&str>) -> SimCard {
        SimCard {
            iccid: Iccid::parse(ICCID).expect("iccid"),
            state: SimState::from_remote(state),
            name: name.map(str::to_owned),
        }
    }

    fn remote_device() -> RemoteDevice {
        RemoteDevice {
            id: RemoteDeviceId::new(88).expect("id"),
            name: "@@ 3809/7795".to_owned(),
            unique_id: IMEI.to_owned(),
            status: None,
            last_update: None,
            passthrough: Map::new(),
        }
    }

    fn stored(record: &NewDeviceRecord) -> DeviceRecord {
        DeviceRecord {
            id: LocalDeviceId::new(4).expect("id"),
            imei: record.imei.clone(),
            iccid: record.iccid.clone(),
            remote_device_id: record.remote_device_id,
            server_url: record.server_url.clone(),
            assigned_user: None,
            label: record.label.clone(),
            preloaded_months: record.preloaded_months,
            expiration: None,
            brand: record.brand.clone(),
            model: record.model.clone(),
        }
    }

    fn empty_inventory() -> MockDeviceRepository {
        let mut devices = MockDeviceRepository::new();
        devices.expect_find_by_imei().return_once(|_| Ok(None));
        devices
    }

    fn service(
        devices: MockDeviceRepository,
        tracking: MockTrackingClient,
        connectivity: MockConnectivityClient,
    ) -> InventoryService<MockDeviceRepository, MockTrackingClient, MockConnectivityClient> {
        InventoryService::new(Arc::new(devices), Arc::new(tracking), Arc::new(connectivity))
    }

    #[tokio::test]
    async fn creates_remote_device_names_sim_and_persists() {
        let mut devices = empty_inventory();
        devices
            .expect_insert()
            .withf(|record| {
                record.label.as_deref() == Some("@@ 3809/7795")
                    && record.brand.as_deref() == Some("istartek")
                    && record.preloaded_months.get() == 3
            })
            .times(1)
            .returning(|record| Ok(stored(record)));
        let mut tracking = MockTrackingClient::new();
        tracking
            .expect_create_device()
            .withf(|_, name, imei| name == "@@ 3809/7795" && imei.as_str() == IMEI)
            .times(1)
            .return_once(|_, _, _| Ok(remote_device()));
        let mut connectivity = MockConnectivityClient::new();
        connectivity
            .expect_sim_details()
            .return_once(|_| Ok(sim("disabled", Some("@@"))));
        connectivity
            .expect_rename_sim()
            .withf(|_, name| name == "@@ 356938035643809")
            .times(1)
            .return_once(|_, _| Ok(()));

        let created = service(devices, tracking, connectivity)
            .create_record(&CallerIdentity::admin_override(), request())
            .await
            .expect("record created");

        assert_eq!(created.remote_device_id.get(), 88);
        assert_eq!(created.generated_name, "@@ 3809/7795");
    }

    #[rstest]
    #[case(sim("enabled", None))]
    #[case(sim("disabled", Some("@@ 111111111111111")))]
    #[tokio::test]
    async fn rejects_sims_that_are_in_use(#[case] card: SimCard) {
        let mut connectivity = MockConnectivityClient::new();
        connectivity
            .expect_sim_details()
            .return_once(move |_| Ok(card));

        let err = service(empty_inventory(), MockTrackingClient::new(), connectivity)
            .create_record(&CallerIdentity::admin_override(), request())
            .await
            .expect_err("sim rejected");

        assert_eq!(err.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn non_admin_is_forbidden() {
        let caller = CallerIdentity::verified(
            SubjectId::new("uid").expect("subject"),
            EmailAddress::new("a@b.c").expect("email"),
            CallerRole::Superadmin,
        );
        let err = service(
            MockDeviceRepository::new(),
            MockTrackingClient::new(),
            MockConnectivityClient::new(),
        )
        .create_record(&caller, request())
        .await
        .expect_err("forbidden");

        assert_eq!(err.code(), ErrorCode::Forbidden);
    }

    #[tokio::test]
    async fn failed_insert_unwinds_sim_name_then_device() {
        let mut devices = empty_inventory();
        devices
            .expect_insert()
            .return_once(|_| Err(RecordStoreError::unique_violation("imei")));
        let mut tracking = MockTrackingClient::new();
        tracking
            .expect_create_device()
            .return_once(|_, _, _| Ok(remote_device()));
        tracking
            .expect_delete_device()
            .withf(|_, id| id.get() == 88)
            .times(1)
            .return_once(|_, _| Ok(()));
        let mut connectivity = MockConnectivityClient::new();
        connectivity
            .expect_sim_details()
            .return_once(|_| Ok(sim("disabled", None)));
        connectivity
            .expect_rename_sim()
            .withf(|_, name| name == "@@ 356938035643809")
            .times(1)
            .return_once(|_, _| Ok(()));
        connectivity
            .expect_rename_sim()
            .withf(|_, name| name == "@@")
            .times(1)
            .return_once(|_, _| Ok(()));

        let err = service(devices, tracking, connectivity)
            .create_record(&CallerIdentity::admin_override(), request())
            .await
            .expect_err("persistence fails");

        assert_eq!(err.code(), ErrorCode::PersistenceFailed);
        let actions = &err.details().expect("details")["rollback"]["actions"];
        assert_eq!(actions[0]["action"], "reset sim name");
        assert_eq!(actions[1]["action"], "delete remote device");
    }

    #[tokio::test]
    async fn failed_sim_rename_deletes_remote_device() {
        let mut tracking = MockTrackingClient::new();
        tracking
            .expect_create_device()
            .return_once(|_, _, _| Ok(remote_device()));
        tracking
            .expect_delete_device()
            .times(1)
            .return_once(|_, _| Err(TrackingClientError::timeout("5s")));
        let mut connectivity = MockConnectivityClient::new();
        connectivity
            .expect_sim_details()
            .return_once(|_| Ok(sim("disabled", None)));
        connectivity
            .expect_rename_sim()
            .return_once(|_, _| Err(ConnectivityClientError::transport("reset")));

        let err = service(empty_inventory(), tracking, connectivity)
            .create_record(&CallerIdentity::admin_override(), request())
            .await
            .expect_err("rename fails");

        assert_eq!(err.code(), ErrorCode::RemoteSyncFailed);
        assert_eq!(err.details().expect("details")["rollback"]["complete"], false);
    }
}
