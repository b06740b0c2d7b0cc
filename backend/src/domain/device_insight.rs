//! Read-only device views: position history, live status, SIM usage.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, LocalResult, NaiveDate, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

use crate::domain::failures::{connectivity_failure, remote_failure};
use crate::domain::lookup::{ensure_owned, require_caller_record, require_device};
use crate::domain::ports::{
    ConnectivityClient, DeviceInsightQuery, DeviceRepository, DeviceStatus, PositionHistory,
    PositionHistoryRequest, PositionWindow, TrackingClient, UsageRecord, UserRepository,
};
use crate::domain::{CallerIdentity, DeviceRecord, Error, Imei};

/// UTC instant at which `date` begins in `tz`.
///
/// When local midnight does not exist (a DST jump at 00:00) the day starts
/// at the first valid local hour after it.
fn start_of_local_day(date: NaiveDate, tz: Tz) -> Option<DateTime<Utc>> {
    let midnight = date.and_hms_opt(0, 0, 0)?;
    let local = match tz.from_local_datetime(&midnight) {
        LocalResult::Single(instant) => Some(instant),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => (1..=3).find_map(|hours| {
            tz.from_local_datetime(&(midnight + TimeDelta::hours(hours)))
                .earliest()
        }),
    }?;
    Some(local.with_timezone(&Utc))
}

/// Half-open UTC window covering the calendar day `date` in `tz`.
pub fn local_day_window(date: NaiveDate, tz: Tz) -> Option<PositionWindow> {
    let start = start_of_local_day(date, tz)?;
    let end = start_of_local_day(date.succ_opt()?, tz)?;
    Some(PositionWindow { start, end })
}

/// Service implementing [`DeviceInsightQuery`].
#[derive(Clone)]
pub struct DeviceInsightService<U, D, T, C> {
    users: Arc<U>,
    devices: Arc<D>,
    tracking: Arc<T>,
    connectivity: Arc<C>,
}

impl<U, D, T, C> DeviceInsightService<U, D, T, C> {
    pub fn new(users: Arc<U>, devices: Arc<D>, tracking: Arc<T>, connectivity: Arc<C>) -> Self {
        Self {
            users,
            devices,
            tracking,
            connectivity,
        }
    }
}

impl<U, D, T, C> DeviceInsightService<U, D, T, C>
where
    U: UserRepository,
    D: DeviceRepository,
{
    async fn readable_device(
        &self,
        caller: &CallerIdentity,
        imei: &Imei,
    ) -> Result<DeviceRecord, Error> {
        if caller.bypasses_ownership() {
            return require_device(self.devices.as_ref(), imei).await;
        }
        let user = require_caller_record(self.users.as_ref(), caller).await?;
        let device = require_device(self.devices.as_ref(), imei).await?;
        ensure_owned(&user, &device)?;
        Ok(device)
    }
}

#[async_trait]
impl<U, D, T, C> DeviceInsightQuery for DeviceInsightService<U, D, T, C>
where
    U: UserRepository,
    D: DeviceRepository,
    T: TrackingClient,
    C: ConnectivityClient,
{
    async fn position_history(
        &self,
        caller: &CallerIdentity,
        request: PositionHistoryRequest,
    ) -> Result<PositionHistory, Error> {
        let window = local_day_window(request.date, request.timezone)
            .ok_or_else(|| Error::invalid_request("date is outside the supported range"))?;
        let device = self.readable_device(caller, &request.imei).await?;
        let positions = self
            .tracking
            .positions(&device.server_url, device.remote_device_id, window)
            .await
            .map_err(|err| remote_failure("fetch positions", &err))?;
        Ok(PositionHistory { window, positions })
    }

    async fn status(&self, caller: &CallerIdentity, imei: &Imei) -> Result<DeviceStatus, Error> {
        let device = self.readable_device(caller, imei).await?;
        let last_position = self
            .tracking
            .latest_position(&device.server_url, device.remote_device_id)
            .await
            .map_err(|err| remote_failure("fetch latest position", &err))?;
        let sim_state = match self.connectivity.sim_details(&device.iccid).await {
            Ok(sim) => Some(sim.state),
            Err(err) => {
                warn!(%imei, error = %err, "sim state unavailable");
                None
            }
        };
        Ok(DeviceStatus {
            imei: device.imei,
            last_position,
            sim_state,
            expiration: device.expiration,
        })
    }

    async fn usage(&self, caller: &CallerIdentity, imei: &Imei) -> Result<Vec<UsageRecord>, Error> {
        let device = self.readable_device(caller, imei).await?;
        self.connectivity
            .usage(&device.iccid)
            .await
            .map_err(|err| connectivity_failure("fetch sim usage", &err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{
        ConnectivityClientError, MockConnectivityClient, MockDeviceRepository,
        MockTrackingClient, MockUserRepository,
    };
    use crate::domain::{
        CallerRole, EmailAddress, ErrorCode, Iccid, LocalDeviceId, LocalUserId, PreloadedMonths,
        RemoteDeviceId, ServerUrl, SubjectId,
    };
    use rstest::rstest;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[rstest]
    #[case(date(2024, 5, 10), Tz::Africa__Nairobi, utc(2024, 5, 9, 21), utc(2024, 5, 10, 21))]
    #[case(date(2024, 5, 10), Tz::UTC, utc(2024, 5, 10, 0), utc(2024, 5, 11, 0))]
    #[case(date(2024, 3, 10), Tz::America__New_York, utc(2024, 3, 10, 5), utc(2024, 3, 11, 4))]
    #[case(date(2024, 11, 3), Tz::America__New_York, utc(2024, 11, 3, 4), utc(2024, 11, 4, 5))]
    #[case(date(2018, 11, 4), Tz::America__Sao_Paulo, utc(2018, 11, 4, 3), utc(2018, 11, 5, 2))]
    fn converts_local_day_to_utc_window(
        #[case] day: NaiveDate,
        #[case] tz: Tz,
        #[case] start: DateTime<Utc>,
        #[case] end: DateTime<Utc>,
    ) {
        assert_eq!(local_day_window(day, tz), Some(PositionWindow { start, end }));
    }

    fn device(assigned: Option<i64>) -> DeviceRecord {
        DeviceRecord {
            id: LocalDeviceId::new(5).expect("id"),
            imei: Imei::parse("356938035643809").expect("imei"),
            iccid: Iccid::parse("8931080019073497795").expect("iccid"),
            remote_device_id: RemoteDeviceId::new(20).expect("id"),
            server_url: ServerUrl::parse("https://eu.track.example").expect("server"),
            assigned_user: assigned.map(|id| LocalUserId::new(id).expect("id")),
            label: None,
            preloaded_months: PreloadedMonths::DEFAULT,
            expiration: None,
            brand: None,
            model: None,
        }
    }

    fn superadmin() -> CallerIdentity {
        CallerIdentity::verified(
            SubjectId::new("boss").expect("subject"),
            EmailAddress::new("boss@fleet.example").expect("email"),
            CallerRole::Superadmin,
        )
    }

    #[tokio::test]
    async fn superadmin_reads_history_without_a_local_user() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_imei()
            .return_once(|_| Ok(Some(device(Some(3)))));
        let mut tracking = MockTrackingClient::new();
        tracking
            .expect_positions()
            .withf(|_, id, window| id.get() == 20 && window.start == utc(2024, 5, 9, 21))
            .times(1)
            .return_once(|_, _, _| Ok(Vec::new()));
        let service = DeviceInsightService::new(
            Arc::new(MockUserRepository::new()),
            Arc::new(devices),
            Arc::new(tracking),
            Arc::new(MockConnectivityClient::new()),
        );

        let history = service
            .position_history(
                &superadmin(),
                PositionHistoryRequest {
                    imei: Imei::parse("356938035643809").expect("imei"),
                    date: date(2024, 5, 10),
                    timezone: Tz::Africa__Nairobi,
                },
            )
            .await
            .expect("history");

        assert!(history.positions.is_empty());
    }

    #[tokio::test]
    async fn status_reports_unknown_sim_state_when_provider_fails() {
        let mut devices = MockDeviceRepository::new();
        devices
            .expect_find_by_imei()
            .return_once(|_| Ok(Some(device(Some(3)))));
        let mut tracking = MockTrackingClient::new();
        tracking
            .expect_latest_position()
            .return_once(|_, _| Ok(None));
        let mut connectivity = MockConnectivityClient::new();
        connectivity
            .expect_sim_details()
            .return_once(|_| Err(ConnectivityClientError::timeout("5s")));
        let service = DeviceInsightService::new(
            Arc::new(MockUserRepository::new()),
            Arc::new(devices),
            Arc::new(tracking),
            Arc::new(connectivity),
        );

        let status = service
            .status(
                &CallerIdentity::admin_override(),
                &Imei::parse("356938035643809").expect("imei"),
            )
            .await
            .expect("status");

        assert!(status.sim_state.is_none());
        assert!(status.last_position.is_none());
    }

    #[tokio::test]
    async fn subscriber_without_record_cannot_read_usage() {
        let mut users = MockUserRepository::new();
        users
            .expect_find_by_subject()
            .return_once(|_| Ok(Vec::new()));
        let service = DeviceInsightService::new(
            Arc::new(users),
            Arc::new(MockDeviceRepository::new()),
            Arc::new(MockTrackingClient::new()),
            Arc::new(MockConnectivityClient::new()),
        );
        let caller = CallerIdentity::verified(
            SubjectId::new("uid").expect("subject"),
            EmailAddress::new("u@example.com").expect("email"),
            CallerRole::Subscriber,
        );

        let err = service
            .usage(&caller, &Imei::parse("356938035643809").expect("imei"))
            .await
            .expect_err("not synced");

        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
