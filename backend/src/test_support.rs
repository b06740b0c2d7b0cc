//! In-memory doubles for the driven ports.
//!
//! Compiled for unit tests and, through the `test-support` feature, for the
//! integration suites under `tests/`. Each double keeps its state behind a
//! mutex, records how often every operation ran and can be told to fail a
//! given operation. Every call yields to the scheduler first so concurrent
//! flows driven with `tokio::join!` interleave at each step.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use mockable::Clock;
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::domain::ports::{
    AccountBalance, ConnectivityClient, ConnectivityClientError, DeviceRepository,
    IdentityVerificationError, IdentityVerifier, Position, PositionWindow, RecordStoreError,
    RemoteDevice, RemoteUser, RemoteUserDraft, RoutingRepository, SUBJECT_ATTRIBUTE, ServerInfo,
    SimCard, SimState, SimStateChange, StoreProbe, TrackingClient, TrackingClientError,
    UsageRecord, UserRepository, VerifiedClaims,
};
use crate::domain::{
    CountryCode, DeviceRecord, EmailAddress, Iccid, Imei, LocalDeviceId, LocalUserId,
    NewDeviceRecord, NewUserRecord, ProfileChanges, RemoteDeviceId, RemoteUserId, ServerUrl,
    SubjectId, UserRecord,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call counts and injected failures keyed by operation.
#[derive(Debug)]
struct FaultPlan<Op> {
    failing: HashSet<Op>,
    calls: HashMap<Op, usize>,
}

impl<Op> Default for FaultPlan<Op> {
    fn default() -> Self {
        Self {
            failing: HashSet::new(),
            calls: HashMap::new(),
        }
    }
}

impl<Op: Copy + Eq + Hash> FaultPlan<Op> {
    /// Count the call and report whether it should fail.
    fn record(&mut self, op: Op) -> bool {
        *self.calls.entry(op).or_default() += 1;
        self.failing.contains(&op)
    }

    fn calls(&self, op: Op) -> usize {
        self.calls.get(&op).copied().unwrap_or_default()
    }
}

fn next_id(counter: &AtomicUsize) -> i64 {
    i64::try_from(counter.fetch_add(1, Ordering::SeqCst) + 1).unwrap_or(i64::MAX)
}

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Record store operations that can be counted or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    FindUserBySubject,
    FindUserById,
    InsertUser,
    UpdateRemoteUserId,
    UpdateProfile,
    UpdateSessionToken,
    UpdatePushToken,
    DeleteUser,
    FindDevice,
    InsertDevice,
    AssignDevice,
    UpdateExpiration,
    ServerForCountry,
    Ping,
}

#[derive(Debug, Default)]
struct StoreState {
    users: Vec<UserRecord>,
    devices: Vec<DeviceRecord>,
    routes: HashMap<CountryCode, ServerUrl>,
    faults: FaultPlan<StoreOp>,
}

/// Local record store backed by vectors, enforcing the same unique keys as
/// the PostgreSQL schema.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    state: Mutex<StoreState>,
    user_ids: AtomicUsize,
    device_ids: AtomicUsize,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: StoreOp) {
        lock(&self.state).faults.failing.insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        lock(&self.state).faults.failing.remove(&op);
    }

    pub fn calls(&self, op: StoreOp) -> usize {
        lock(&self.state).faults.calls(op)
    }

    pub fn add_route(&self, country: CountryCode, server: ServerUrl) {
        lock(&self.state).routes.insert(country, server);
    }

    /// Insert a user row directly, bypassing uniqueness checks so tests can
    /// build states the schema would normally reject.
    pub fn seed_user(&self, user: NewUserRecord) -> UserRecord {
        let record = self.materialise_user(&user);
        lock(&self.state).users.push(record.clone());
        record
    }

    pub fn seed_device(&self, device: NewDeviceRecord) -> DeviceRecord {
        let record = self.materialise_device(&device);
        lock(&self.state).devices.push(record.clone());
        record
    }

    pub fn users(&self) -> Vec<UserRecord> {
        lock(&self.state).users.clone()
    }

    pub fn device(&self, imei: &Imei) -> Option<DeviceRecord> {
        lock(&self.state)
            .devices
            .iter()
            .find(|device| &device.imei == imei)
            .cloned()
    }

    fn materialise_user(&self, user: &NewUserRecord) -> UserRecord {
        UserRecord {
            id: LocalUserId::new(next_id(&self.user_ids)).expect("in-memory ids are positive"),
            email: user.email.clone(),
            subject: user.subject.clone(),
            remote_user_id: user.remote_user_id,
            server_url: user.server_url.clone(),
            name: user.name.clone(),
            phone: user.phone.clone(),
            session_token: None,
            push_token: None,
            country_code: user.country_code.clone(),
        }
    }

    fn materialise_device(&self, device: &NewDeviceRecord) -> DeviceRecord {
        DeviceRecord {
            id: LocalDeviceId::new(next_id(&self.device_ids)).expect("in-memory ids are positive"),
            imei: device.imei.clone(),
            iccid: device.iccid.clone(),
            remote_device_id: device.remote_device_id,
            server_url: device.server_url.clone(),
            assigned_user: None,
            label: device.label.clone(),
            preloaded_months: device.preloaded_months,
            expiration: None,
            brand: device.brand.clone(),
            model: device.model.clone(),
        }
    }

    async fn enter(&self, op: StoreOp) -> Result<MutexGuard<'_, StoreState>, RecordStoreError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.faults.record(op) {
            return Err(RecordStoreError::query(format!("injected failure: {op:?}")));
        }
        Ok(state)
    }
}

fn missing(what: impl std::fmt::Display) -> RecordStoreError {
    RecordStoreError::missing(what.to_string())
}

fn user_mut(state: &mut StoreState, id: LocalUserId) -> Result<&mut UserRecord, RecordStoreError> {
    state
        .users
        .iter_mut()
        .find(|user| user.id == id)
        .ok_or_else(|| missing(format!("user {id}")))
}

#[async_trait]
impl UserRepository for InMemoryRecordStore {
    async fn find_by_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Vec<UserRecord>, RecordStoreError> {
        let state = self.enter(StoreOp::FindUserBySubject).await?;
        Ok(state
            .users
            .iter()
            .filter(|user| &user.subject == subject)
            .cloned()
            .collect())
    }

    async fn find_by_id(&self, id: LocalUserId) -> Result<Option<UserRecord>, RecordStoreError> {
        let state = self.enter(StoreOp::FindUserById).await?;
        Ok(state.users.iter().find(|user| user.id == id).cloned())
    }

    async fn insert(&self, user: &NewUserRecord) -> Result<UserRecord, RecordStoreError> {
        let mut state = self.enter(StoreOp::InsertUser).await?;
        if state.users.iter().any(|row| row.subject == user.subject) {
            return Err(RecordStoreError::unique_violation("users_auth_subject_key"));
        }
        let record = self.materialise_user(user);
        state.users.push(record.clone());
        Ok(record)
    }

    async fn update_remote_user_id(
        &self,
        id: LocalUserId,
        remote: RemoteUserId,
    ) -> Result<(), RecordStoreError> {
        let mut state = self.enter(StoreOp::UpdateRemoteUserId).await?;
        user_mut(&mut state, id)?.remote_user_id = remote;
        Ok(())
    }

    async fn update_profile(
        &self,
        id: LocalUserId,
        changes: &ProfileChanges,
    ) -> Result<UserRecord, RecordStoreError> {
        let mut state = self.enter(StoreOp::UpdateProfile).await?;
        let user = user_mut(&mut state, id)?;
        user.email = changes.email.clone();
        user.name = changes.name.clone();
        user.phone = changes.phone.clone();
        Ok(user.clone())
    }

    async fn update_session_token(
        &self,
        id: LocalUserId,
        token: &str,
    ) -> Result<(), RecordStoreError> {
        let mut state = self.enter(StoreOp::UpdateSessionToken).await?;
        user_mut(&mut state, id)?.session_token = Some(token.to_owned());
        Ok(())
    }

    async fn update_push_token(&self, id: LocalUserId, token: &str) -> Result<(), RecordStoreError> {
        let mut state = self.enter(StoreOp::UpdatePushToken).await?;
        user_mut(&mut state, id)?.push_token = Some(token.to_owned());
        Ok(())
    }

    async fn delete(&self, id: LocalUserId) -> Result<(), RecordStoreError> {
        let mut state = self.enter(StoreOp::DeleteUser).await?;
        let before = state.users.len();
        state.users.retain(|user| user.id != id);
        if state.users.len() == before {
            return Err(missing(format!("user {id}")));
        }
        for device in &mut state.devices {
            if device.assigned_user == Some(id) {
                device.assigned_user = None;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceRepository for InMemoryRecordStore {
    async fn find_by_imei(&self, imei: &Imei) -> Result<Option<DeviceRecord>, RecordStoreError> {
        let state = self.enter(StoreOp::FindDevice).await?;
        Ok(state.devices.iter().find(|device| &device.imei == imei).cloned())
    }

    async fn insert(&self, device: &NewDeviceRecord) -> Result<DeviceRecord, RecordStoreError> {
        let mut state = self.enter(StoreOp::InsertDevice).await?;
        if state.devices.iter().any(|row| row.imei == device.imei) {
            return Err(RecordStoreError::unique_violation("device_inventory_imei_key"));
        }
        let record = self.materialise_device(device);
        state.devices.push(record.clone());
        Ok(record)
    }

    async fn assign_if_unassigned(
        &self,
        imei: &Imei,
        user: LocalUserId,
        label: &str,
    ) -> Result<bool, RecordStoreError> {
        let mut state = self.enter(StoreOp::AssignDevice).await?;
        let device = state
            .devices
            .iter_mut()
            .find(|device| &device.imei == imei)
            .ok_or_else(|| missing(format!("device {imei}")))?;
        if device.assigned_user.is_some() {
            return Ok(false);
        }
        device.assigned_user = Some(user);
        device.label = Some(label.to_owned());
        Ok(true)
    }

    async fn update_expiration(
        &self,
        id: LocalDeviceId,
        expiration: DateTime<Utc>,
    ) -> Result<(), RecordStoreError> {
        let mut state = self.enter(StoreOp::UpdateExpiration).await?;
        let device = state
            .devices
            .iter_mut()
            .find(|device| device.id == id)
            .ok_or_else(|| missing(format!("device {id}")))?;
        device.expiration = Some(expiration);
        Ok(())
    }
}

#[async_trait]
impl RoutingRepository for InMemoryRecordStore {
    async fn server_for_country(
        &self,
        country: &CountryCode,
    ) -> Result<Option<ServerUrl>, RecordStoreError> {
        let state = self.enter(StoreOp::ServerForCountry).await?;
        Ok(state.routes.get(country).cloned())
    }
}

#[async_trait]
impl StoreProbe for InMemoryRecordStore {
    async fn ping(&self) -> Result<(), RecordStoreError> {
        self.enter(StoreOp::Ping).await.map(drop)
    }
}

// ---------------------------------------------------------------------------
// Tracking server
// ---------------------------------------------------------------------------

/// Tracking server operations that can be counted or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingOp {
    GetUser,
    CreateUser,
    UpdateUser,
    DeleteUser,
    GetDevice,
    CreateDevice,
    UpdateDevice,
    DeleteDevice,
    LinkDevice,
    UnlinkDevice,
    Positions,
    LatestPosition,
    ServerInfo,
    IssueSessionToken,
}

#[derive(Debug, Default)]
struct TrackingState {
    users: HashMap<(ServerUrl, RemoteUserId), RemoteUser>,
    passwords: HashMap<(ServerUrl, String), String>,
    devices: HashMap<(ServerUrl, RemoteDeviceId), RemoteDevice>,
    permissions: HashSet<(ServerUrl, RemoteUserId, RemoteDeviceId)>,
    positions: HashMap<(ServerUrl, RemoteDeviceId), Vec<Position>>,
    version: Option<String>,
    faults: FaultPlan<TrackingOp>,
}

/// Multi-region tracking server keeping users, devices and permissions per
/// server URL.
#[derive(Debug, Default)]
pub struct InMemoryTrackingServer {
    state: Mutex<TrackingState>,
    ids: AtomicUsize,
}

impl InMemoryTrackingServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: TrackingOp) {
        lock(&self.state).faults.failing.insert(op);
    }

    pub fn recover(&self, op: TrackingOp) {
        lock(&self.state).faults.failing.remove(&op);
    }

    pub fn calls(&self, op: TrackingOp) -> usize {
        lock(&self.state).faults.calls(op)
    }

    pub fn set_version(&self, version: impl Into<String>) {
        lock(&self.state).version = Some(version.into());
    }

    /// Register a user created outside this system, e.g. by hand.
    pub fn seed_user(&self, server: &ServerUrl, name: &str, email: &str) -> RemoteUser {
        let user = RemoteUser {
            id: self.next_user_id(),
            name: name.to_owned(),
            email: email.to_owned(),
            phone: None,
            attributes: Map::new(),
            passthrough: Map::new(),
        };
        lock(&self.state)
            .users
            .insert((server.clone(), user.id), user.clone());
        user
    }

    pub fn seed_device(&self, server: &ServerUrl, name: &str, imei: &Imei) -> RemoteDevice {
        let device = self.new_device(name, imei);
        lock(&self.state)
            .devices
            .insert((server.clone(), device.id), device.clone());
        device
    }

    pub fn seed_position(&self, server: &ServerUrl, position: Position) {
        lock(&self.state)
            .positions
            .entry((server.clone(), position.device_id))
            .or_default()
            .push(position);
    }

    pub fn user(&self, server: &ServerUrl, id: RemoteUserId) -> Option<RemoteUser> {
        lock(&self.state).users.get(&(server.clone(), id)).cloned()
    }

    pub fn users_on(&self, server: &ServerUrl) -> Vec<RemoteUser> {
        lock(&self.state)
            .users
            .iter()
            .filter(|((url, _), _)| url == server)
            .map(|(_, user)| user.clone())
            .collect()
    }

    pub fn device(&self, server: &ServerUrl, id: RemoteDeviceId) -> Option<RemoteDevice> {
        lock(&self.state).devices.get(&(server.clone(), id)).cloned()
    }

    pub fn is_linked(&self, server: &ServerUrl, user: RemoteUserId, device: RemoteDeviceId) -> bool {
        lock(&self.state)
            .permissions
            .contains(&(server.clone(), user, device))
    }

    fn next_user_id(&self) -> RemoteUserId {
        RemoteUserId::new(next_id(&self.ids)).expect("in-memory ids are positive")
    }

    fn new_device(&self, name: &str, imei: &Imei) -> RemoteDevice {
        RemoteDevice {
            id: RemoteDeviceId::new(next_id(&self.ids)).expect("in-memory ids are positive"),
            name: name.to_owned(),
            unique_id: imei.to_string(),
            status: None,
            last_update: None,
            passthrough: Map::new(),
        }
    }

    async fn enter(&self, op: TrackingOp) -> Result<MutexGuard<'_, TrackingState>, TrackingClientError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.faults.record(op) {
            return Err(TrackingClientError::transport(format!("injected failure: {op:?}")));
        }
        Ok(state)
    }
}

fn not_found(what: impl std::fmt::Display) -> TrackingClientError {
    TrackingClientError::not_found(what.to_string())
}

#[async_trait]
impl TrackingClient for InMemoryTrackingServer {
    async fn get_user(
        &self,
        server: &ServerUrl,
        id: RemoteUserId,
    ) -> Result<RemoteUser, TrackingClientError> {
        let state = self.enter(TrackingOp::GetUser).await?;
        state
            .users
            .get(&(server.clone(), id))
            .cloned()
            .ok_or_else(|| not_found(format!("user {id}")))
    }

    async fn create_user(
        &self,
        server: &ServerUrl,
        draft: &RemoteUserDraft,
    ) -> Result<RemoteUser, TrackingClientError> {
        let mut state = self.enter(TrackingOp::CreateUser).await?;
        let taken = state.users.iter().any(|((url, _), user)| {
            url == server && user.email.eq_ignore_ascii_case(draft.email.as_str())
        });
        if taken {
            return Err(TrackingClientError::duplicate(format!(
                "email {} already registered",
                draft.email
            )));
        }
        let mut attributes = Map::new();
        attributes.insert(
            SUBJECT_ATTRIBUTE.to_owned(),
            Value::String(draft.subject.as_str().to_owned()),
        );
        let user = RemoteUser {
            id: self.next_user_id(),
            name: draft.name.clone(),
            email: draft.email.as_str().to_owned(),
            phone: draft.phone.clone(),
            attributes,
            passthrough: Map::new(),
        };
        state.passwords.insert(
            (server.clone(), draft.email.as_str().to_owned()),
            draft.password.to_string(),
        );
        state.users.insert((server.clone(), user.id), user.clone());
        Ok(user)
    }

    async fn update_user(
        &self,
        server: &ServerUrl,
        user: &RemoteUser,
        password: Option<Zeroizing<String>>,
    ) -> Result<RemoteUser, TrackingClientError> {
        let mut state = self.enter(TrackingOp::UpdateUser).await?;
        let slot = state
            .users
            .get_mut(&(server.clone(), user.id))
            .ok_or_else(|| not_found(format!("user {}", user.id)))?;
        let previous_email = std::mem::replace(slot, user.clone()).email;
        // Credentials follow the login email; a new secret replaces the old.
        if previous_email != user.email {
            if let Some(kept) = state.passwords.remove(&(server.clone(), previous_email)) {
                state.passwords.insert((server.clone(), user.email.clone()), kept);
            }
        }
        if let Some(secret) = password {
            state
                .passwords
                .insert((server.clone(), user.email.clone()), secret.to_string());
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, server: &ServerUrl, id: RemoteUserId) -> Result<(), TrackingClientError> {
        let mut state = self.enter(TrackingOp::DeleteUser).await?;
        state
            .users
            .remove(&(server.clone(), id))
            .ok_or_else(|| not_found(format!("user {id}")))?;
        state
            .permissions
            .retain(|(url, user, _)| !(url == server && *user == id));
        Ok(())
    }

    async fn get_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let state = self.enter(TrackingOp::GetDevice).await?;
        state
            .devices
            .get(&(server.clone(), id))
            .cloned()
            .ok_or_else(|| not_found(format!("device {id}")))
    }

    async fn create_device(
        &self,
        server: &ServerUrl,
        name: &str,
        unique_id: &Imei,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let mut state = self.enter(TrackingOp::CreateDevice).await?;
        let taken = state
            .devices
            .iter()
            .any(|((url, _), device)| url == server && device.unique_id == unique_id.as_str());
        if taken {
            return Err(TrackingClientError::duplicate(format!(
                "unique id {unique_id} already registered"
            )));
        }
        let device = self.new_device(name, unique_id);
        state
            .devices
            .insert((server.clone(), device.id), device.clone());
        Ok(device)
    }

    async fn update_device(
        &self,
        server: &ServerUrl,
        device: &RemoteDevice,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let mut state = self.enter(TrackingOp::UpdateDevice).await?;
        let slot = state
            .devices
            .get_mut(&(server.clone(), device.id))
            .ok_or_else(|| not_found(format!("device {}", device.id)))?;
        *slot = device.clone();
        Ok(device.clone())
    }

    async fn delete_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let mut state = self.enter(TrackingOp::DeleteDevice).await?;
        state
            .devices
            .remove(&(server.clone(), id))
            .ok_or_else(|| not_found(format!("device {id}")))?;
        state
            .permissions
            .retain(|(url, _, device)| !(url == server && *device == id));
        Ok(())
    }

    async fn link_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let mut state = self.enter(TrackingOp::LinkDevice).await?;
        let key = server.clone();
        if !state.users.contains_key(&(key.clone(), user)) {
            return Err(not_found(format!("user {user}")));
        }
        if !state.devices.contains_key(&(key.clone(), device)) {
            return Err(not_found(format!("device {device}")));
        }
        state.permissions.insert((key, user, device));
        Ok(())
    }

    async fn unlink_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let mut state = self.enter(TrackingOp::UnlinkDevice).await?;
        state.permissions.remove(&(server.clone(), user, device));
        Ok(())
    }

    async fn positions(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
        window: PositionWindow,
    ) -> Result<Vec<Position>, TrackingClientError> {
        let state = self.enter(TrackingOp::Positions).await?;
        Ok(state
            .positions
            .get(&(server.clone(), device))
            .map(|positions| {
                positions
                    .iter()
                    .filter(|p| p.fix_time >= window.start && p.fix_time < window.end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn latest_position(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
    ) -> Result<Option<Position>, TrackingClientError> {
        let state = self.enter(TrackingOp::LatestPosition).await?;
        Ok(state
            .positions
            .get(&(server.clone(), device))
            .and_then(|positions| positions.iter().max_by_key(|p| p.fix_time).cloned()))
    }

    async fn server_info(&self, _server: &ServerUrl) -> Result<ServerInfo, TrackingClientError> {
        let state = self.enter(TrackingOp::ServerInfo).await?;
        Ok(ServerInfo {
            version: state.version.clone(),
        })
    }

    async fn issue_session_token(
        &self,
        server: &ServerUrl,
        email: &EmailAddress,
        password: &str,
    ) -> Result<String, TrackingClientError> {
        let state = self.enter(TrackingOp::IssueSessionToken).await?;
        match state.passwords.get(&(server.clone(), email.as_str().to_owned())) {
            Some(stored) if stored == password => Ok(format!("session-{}", email.as_str())),
            _ => Err(TrackingClientError::rejected("invalid credentials")),
        }
    }
}

// ---------------------------------------------------------------------------
// SIM provider
// ---------------------------------------------------------------------------

/// Connectivity provider operations that can be counted or failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOp {
    Details,
    Rename,
    SetState,
    Usage,
    Balance,
}

#[derive(Debug, Default)]
struct SimProviderState {
    sims: HashMap<Iccid, SimCard>,
    usage: HashMap<Iccid, Vec<UsageRecord>>,
    balance: Option<AccountBalance>,
    faults: FaultPlan<SimOp>,
}

/// SIM provider holding per-card state, names and usage.
#[derive(Debug, Default)]
pub struct InMemorySimProvider {
    state: Mutex<SimProviderState>,
}

impl InMemorySimProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: SimOp) {
        lock(&self.state).faults.failing.insert(op);
    }

    pub fn recover(&self, op: SimOp) {
        lock(&self.state).faults.failing.remove(&op);
    }

    pub fn calls(&self, op: SimOp) -> usize {
        lock(&self.state).faults.calls(op)
    }

    pub fn seed_sim(&self, iccid: &Iccid, state: SimState, name: Option<&str>) {
        lock(&self.state).sims.insert(
            iccid.clone(),
            SimCard {
                iccid: iccid.clone(),
                state,
                name: name.map(str::to_owned),
            },
        );
    }

    pub fn seed_usage(&self, iccid: &Iccid, records: Vec<UsageRecord>) {
        lock(&self.state).usage.insert(iccid.clone(), records);
    }

    pub fn set_balance(&self, balance: AccountBalance) {
        lock(&self.state).balance = Some(balance);
    }

    pub fn sim(&self, iccid: &Iccid) -> Option<SimCard> {
        lock(&self.state).sims.get(iccid).cloned()
    }

    async fn enter(&self, op: SimOp) -> Result<MutexGuard<'_, SimProviderState>, ConnectivityClientError> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.faults.record(op) {
            return Err(ConnectivityClientError::transport(format!("injected failure: {op:?}")));
        }
        Ok(state)
    }
}

fn unknown_sim(iccid: &Iccid) -> ConnectivityClientError {
    ConnectivityClientError::not_found(iccid.to_string())
}

#[async_trait]
impl ConnectivityClient for InMemorySimProvider {
    async fn sim_details(&self, iccid: &Iccid) -> Result<SimCard, ConnectivityClientError> {
        let state = self.enter(SimOp::Details).await?;
        state.sims.get(iccid).cloned().ok_or_else(|| unknown_sim(iccid))
    }

    async fn rename_sim(&self, iccid: &Iccid, name: &str) -> Result<(), ConnectivityClientError> {
        let mut state = self.enter(SimOp::Rename).await?;
        let sim = state.sims.get_mut(iccid).ok_or_else(|| unknown_sim(iccid))?;
        sim.name = Some(name.to_owned());
        Ok(())
    }

    async fn set_sim_state(
        &self,
        iccid: &Iccid,
        change: SimStateChange,
    ) -> Result<(), ConnectivityClientError> {
        let mut state = self.enter(SimOp::SetState).await?;
        let sim = state.sims.get_mut(iccid).ok_or_else(|| unknown_sim(iccid))?;
        sim.state = match change {
            SimStateChange::Enable => SimState::Enabled,
            SimStateChange::Disable => SimState::Disabled,
        };
        Ok(())
    }

    async fn usage(&self, iccid: &Iccid) -> Result<Vec<UsageRecord>, ConnectivityClientError> {
        let state = self.enter(SimOp::Usage).await?;
        if !state.sims.contains_key(iccid) {
            return Err(unknown_sim(iccid));
        }
        Ok(state.usage.get(iccid).cloned().unwrap_or_default())
    }

    async fn account_balance(&self) -> Result<AccountBalance, ConnectivityClientError> {
        let state = self.enter(SimOp::Balance).await?;
        state
            .balance
            .clone()
            .ok_or_else(|| ConnectivityClientError::not_found("no balance configured"))
    }
}

// ---------------------------------------------------------------------------
// Identity provider and clock
// ---------------------------------------------------------------------------

/// Identity provider answering from a fixed token table.
#[derive(Debug, Default)]
pub struct StaticIdentityVerifier {
    tokens: Mutex<HashMap<String, Result<VerifiedClaims, IdentityVerificationError>>>,
    calls: AtomicUsize,
}

impl StaticIdentityVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accept(&self, token: &str, subject: SubjectId, email: Option<EmailAddress>) {
        lock(&self.tokens).insert(token.to_owned(), Ok(VerifiedClaims { subject, email }));
    }

    pub fn reject(&self, token: &str, error: IdentityVerificationError) {
        lock(&self.tokens).insert(token.to_owned(), Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, IdentityVerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.tokens)
            .get(token)
            .cloned()
            .unwrap_or_else(|| Err(IdentityVerificationError::invalid("token signature invalid")))
    }
}

/// Clock whose time only moves when a test moves it.
#[derive(Debug)]
pub struct MutableClock {
    now: Mutex<DateTime<Utc>>,
}

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *lock(&self.now) = now;
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}
