//! Country routing table and store liveness probe.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error, map_row_error};
use super::pool::DbPool;
use super::schema::country_servers;
use crate::domain::ports::{RecordStoreError, RoutingRepository, StoreProbe};
use crate::domain::{CountryCode, ServerUrl};

#[derive(Clone)]
pub struct DieselRoutingRepository {
    pool: DbPool,
}

impl DieselRoutingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoutingRepository for DieselRoutingRepository {
    async fn server_for_country(
        &self,
        country: &CountryCode,
    ) -> Result<Option<ServerUrl>, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let stored: Option<String> = country_servers::table
            .find(country.as_str())
            .select(country_servers::server_url)
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        stored
            .map(|raw| {
                ServerUrl::parse(&raw)
                    .map_err(|err| map_row_error(format!("country_servers {country}: {err}")))
            })
            .transpose()
    }
}

/// Answers `SELECT 1` through a pooled connection.
#[derive(Clone)]
pub struct DieselStoreProbe {
    pool: DbPool,
}

impl DieselStoreProbe {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StoreProbe for DieselStoreProbe {
    async fn ping(&self) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::sql_query("SELECT 1")
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(())
    }
}
