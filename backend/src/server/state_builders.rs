//! Wiring of outbound adapters into the domain services behind
//! [`HttpState`].

use std::sync::Arc;

use mockable::DefaultClock;
use url::Url;

use fleet_sync::domain::{
    AuthorizationGate, ConnectivityService, DeviceAssignmentService, DeviceInsightService,
    InventoryService, PlatformService, UserSyncService,
};
use fleet_sync::inbound::http::state::HttpState;
use fleet_sync::outbound::firebase::{FIREBASE_JWKS_URL, FirebaseTokenVerifier};
use fleet_sync::outbound::persistence::{
    DbPool, DieselDeviceRepository, DieselRoutingRepository, DieselStoreProbe,
    DieselUserRepository,
};
use fleet_sync::outbound::simbase::SimbaseHttpClient;
use fleet_sync::outbound::traccar::TraccarHttpClient;

use super::ServerConfig;

/// Failures constructing remote adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterBuildError {
    #[error("failed to build {adapter} client: {source}")]
    Client {
        adapter: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid identity key endpoint: {0}")]
    KeyEndpoint(#[from] url::ParseError),
}

fn client_error(adapter: &'static str) -> impl FnOnce(reqwest::Error) -> AdapterBuildError {
    move |source| AdapterBuildError::Client { adapter, source }
}

/// Handler state and the authorization gate for one server instance.
pub struct AppPorts {
    pub http_state: HttpState,
    pub gate: AuthorizationGate,
}

/// Build every service over the Diesel repositories and HTTP adapters.
///
/// # Errors
///
/// Returns [`AdapterBuildError`] when a reqwest client cannot be built.
pub fn build_app_ports(config: &ServerConfig, pool: &DbPool) -> Result<AppPorts, AdapterBuildError> {
    let users = Arc::new(DieselUserRepository::new(pool.clone()));
    let devices = Arc::new(DieselDeviceRepository::new(pool.clone()));
    let routing = Arc::new(DieselRoutingRepository::new(pool.clone()));
    let probe = Arc::new(DieselStoreProbe::new(pool.clone()));

    let tracking = Arc::new(
        TraccarHttpClient::new(config.tracking_credentials.clone(), config.remote_timeout)
            .map_err(client_error("tracking"))?,
    );
    let connectivity = Arc::new(
        SimbaseHttpClient::new(
            config.connectivity_base_url.clone(),
            config.connectivity_api_key.clone(),
            config.remote_timeout,
        )
        .map_err(client_error("connectivity"))?,
    );
    let verifier = Arc::new(
        FirebaseTokenVerifier::new(
            config.identity_project_id.clone(),
            Url::parse(FIREBASE_JWKS_URL)?,
            config.remote_timeout,
        )
        .map_err(client_error("identity"))?,
    );

    let http_state = HttpState {
        users: Arc::new(UserSyncService::new(
            Arc::clone(&users),
            Arc::clone(&routing),
            Arc::clone(&tracking),
        )),
        assignments: Arc::new(DeviceAssignmentService::new(
            Arc::clone(&users),
            Arc::clone(&devices),
            Arc::clone(&tracking),
        )),
        connectivity: Arc::new(ConnectivityService::new(
            Arc::clone(&users),
            Arc::clone(&devices),
            Arc::clone(&connectivity),
            Arc::new(DefaultClock),
        )),
        inventory: Arc::new(InventoryService::new(
            Arc::clone(&devices),
            Arc::clone(&tracking),
            Arc::clone(&connectivity),
        )),
        insight: Arc::new(DeviceInsightService::new(
            users,
            devices,
            Arc::clone(&tracking),
            Arc::clone(&connectivity),
        )),
        platform: Arc::new(
            PlatformService::new(probe, routing, tracking, connectivity)
                .with_default_server(config.default_server.clone()),
        ),
    };

    Ok(AppPorts {
        http_state,
        gate: AuthorizationGate::new(verifier, config.auth_policy.clone()),
    })
}
