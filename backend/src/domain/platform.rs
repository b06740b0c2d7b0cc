//! Platform health and country routing lookups.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::failures::store_failure;
use crate::domain::ports::{
    ConnectivityClient, DependencyStatus, PlatformQuery, PlatformStatus, RoutingRepository,
    StoreProbe, TrackingClient,
};
use crate::domain::{CountryCode, Error, ServerUrl};

/// Service implementing [`PlatformQuery`].
#[derive(Clone)]
pub struct PlatformService<P, R, T, C> {
    probe: Arc<P>,
    routing: Arc<R>,
    tracking: Arc<T>,
    connectivity: Arc<C>,
    default_server: Option<ServerUrl>,
}

impl<P, R, T, C> PlatformService<P, R, T, C> {
    pub fn new(probe: Arc<P>, routing: Arc<R>, tracking: Arc<T>, connectivity: Arc<C>) -> Self {
        Self {
            probe,
            routing,
            tracking,
            connectivity,
            default_server: None,
        }
    }

    /// Tracking server probed when the caller names none.
    pub fn with_default_server(mut self, server: Option<ServerUrl>) -> Self {
        self.default_server = server;
        self
    }
}

#[async_trait]
impl<P, R, T, C> PlatformQuery for PlatformService<P, R, T, C>
where
    P: StoreProbe,
    R: RoutingRepository,
    T: TrackingClient,
    C: ConnectivityClient,
{
    async fn server_status(&self, server: Option<ServerUrl>) -> Result<PlatformStatus, Error> {
        let record_store = match self.probe.ping().await {
            Ok(()) => DependencyStatus::Online { detail: None },
            Err(err) => DependencyStatus::Error {
                message: err.to_string(),
            },
        };

        let tracking_server = match server.or_else(|| self.default_server.clone()) {
            None => DependencyStatus::Error {
                message: "no tracking server configured".to_owned(),
            },
            Some(server) => match self.tracking.server_info(&server).await {
                Ok(info) => DependencyStatus::Online {
                    detail: info.version,
                },
                Err(err) => DependencyStatus::Error {
                    message: err.to_string(),
                },
            },
        };

        let connectivity = match self.connectivity.account_balance().await {
            Ok(balance) => DependencyStatus::Online {
                detail: Some(match balance.currency {
                    Some(currency) => format!("{} {currency}", balance.amount),
                    None => balance.amount.to_string(),
                }),
            },
            Err(err) => DependencyStatus::Error {
                message: err.to_string(),
            },
        };

        Ok(PlatformStatus {
            record_store,
            tracking_server,
            connectivity,
        })
    }

    async fn lookup_route(&self, country: &CountryCode) -> Result<ServerUrl, Error> {
        self.routing
            .server_for_country(country)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| {
                Error::routing_not_found(format!("no tracking server registered for country {country}"))
            })
    }
}
