//! Shared fixtures for the backend integration suites.
//!
//! Integration tests compile as separate crates, so the world builder lives
//! here and each suite pulls it in with `mod support;`.

#![allow(dead_code, reason = "each suite uses a different subset")]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use fleet_sync::domain::ports::SimState;
use fleet_sync::domain::{
    CallerIdentity, CallerRole, ConnectivityService, CountryCode, DeviceAssignmentService,
    DeviceInsightService, DeviceRecord, EmailAddress, Iccid, Imei, InventoryService,
    NewDeviceRecord, PlatformService, PreloadedMonths, ServerUrl, SubjectId, UserSyncService,
};
use fleet_sync::inbound::http::state::HttpState;
use fleet_sync::test_support::{
    InMemoryRecordStore, InMemorySimProvider, InMemoryTrackingServer, MutableClock,
};

pub type Users = UserSyncService<InMemoryRecordStore, InMemoryRecordStore, InMemoryTrackingServer>;
pub type Assignments =
    DeviceAssignmentService<InMemoryRecordStore, InMemoryRecordStore, InMemoryTrackingServer>;
pub type Connectivity =
    ConnectivityService<InMemoryRecordStore, InMemoryRecordStore, InMemorySimProvider>;

pub const COUNTRY: &str = "KE";

pub fn server() -> ServerUrl {
    ServerUrl::parse("https://ke.track.example").expect("server url")
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub fn subscriber(subject: &str, email: &str) -> CallerIdentity {
    CallerIdentity::verified(
        SubjectId::new(subject).expect("subject"),
        EmailAddress::new(email).expect("email"),
        CallerRole::Subscriber,
    )
}

/// Every fake plus the services wired over them.
pub struct World {
    pub store: Arc<InMemoryRecordStore>,
    pub tracking: Arc<InMemoryTrackingServer>,
    pub sims: Arc<InMemorySimProvider>,
    pub clock: Arc<MutableClock>,
}

impl World {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryRecordStore::new());
        store.add_route(CountryCode::parse(COUNTRY).expect("country"), server());
        Self {
            store,
            tracking: Arc::new(InMemoryTrackingServer::new()),
            sims: Arc::new(InMemorySimProvider::new()),
            clock: Arc::new(MutableClock::new(at(2024, 1, 15, 10))),
        }
    }

    pub fn users(&self) -> Users {
        UserSyncService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.store),
            Arc::clone(&self.tracking),
        )
    }

    pub fn assignments(&self) -> Assignments {
        DeviceAssignmentService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.store),
            Arc::clone(&self.tracking),
        )
    }

    pub fn connectivity(&self) -> Connectivity {
        ConnectivityService::new(
            Arc::clone(&self.store),
            Arc::clone(&self.store),
            Arc::clone(&self.sims),
            Arc::clone(&self.clock) as Arc<dyn mockable::Clock>,
        )
    }

    pub fn http_state(&self) -> HttpState {
        HttpState {
            users: Arc::new(self.users()),
            assignments: Arc::new(self.assignments()),
            connectivity: Arc::new(self.connectivity()),
            inventory: Arc::new(InventoryService::new(
                Arc::clone(&self.store),
                Arc::clone(&self.tracking),
                Arc::clone(&self.sims),
            )),
            insight: Arc::new(DeviceInsightService::new(
                Arc::clone(&self.store),
                Arc::clone(&self.store),
                Arc::clone(&self.tracking),
                Arc::clone(&self.sims),
            )),
            platform: Arc::new(PlatformService::new(
                Arc::clone(&self.store),
                Arc::clone(&self.store),
                Arc::clone(&self.tracking),
                Arc::clone(&self.sims),
            )),
        }
    }

    /// Stock a device in inventory: remote device, disabled SIM and an
    /// unassigned local row.
    pub fn stock_device(&self, imei: &str, iccid: &str, months: u32) -> DeviceRecord {
        let imei = Imei::parse(imei).expect("imei");
        let iccid = Iccid::parse(iccid).expect("iccid");
        let remote = self.tracking.seed_device(&server(), "@@ stock", &imei);
        self.sims.seed_sim(&iccid, SimState::Disabled, Some("@@"));
        self.store.seed_device(NewDeviceRecord {
            imei,
            iccid,
            remote_device_id: remote.id,
            server_url: server(),
            label: None,
            preloaded_months: PreloadedMonths::new(months),
            brand: None,
            model: None,
        })
    }
}

/// Run a first sync for `caller` through the country routing table.
pub async fn enrol(world: &World, caller: &CallerIdentity) -> fleet_sync::domain::UserRecord {
    use fleet_sync::domain::ports::{SyncTarget, SyncUserRequest, UserSyncCommand};

    world
        .users()
        .sync(
            caller,
            SyncUserRequest {
                target: SyncTarget::Country(CountryCode::parse(COUNTRY).expect("country")),
                name: Some("Ada".to_owned()),
                phone: None,
            },
        )
        .await
        .expect("enrolment succeeds");
    world
        .store
        .users()
        .into_iter()
        .find(|user| Some(&user.subject) == caller.subject())
        .expect("enrolled user stored")
}
