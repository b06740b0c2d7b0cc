//! PostgreSQL-backed `DeviceRepository`.
//!
//! Assignment is a single conditional `UPDATE ... WHERE assigned_user_id IS
//! NULL`, so two concurrent claims can never both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use tracing::debug;

use super::error_mapping::{
    expect_one_row, map_diesel_error, map_pool_error, map_row_error,
};
use super::models::{DeviceRow, NewDeviceRow};
use super::pool::DbPool;
use super::schema::device_inventory;
use crate::domain::ports::{DeviceRepository, RecordStoreError};
use crate::domain::{DeviceRecord, Imei, LocalDeviceId, LocalUserId, NewDeviceRecord};

#[derive(Clone)]
pub struct DieselDeviceRepository {
    pool: DbPool,
}

impl DieselDeviceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DeviceRepository for DieselDeviceRepository {
    async fn find_by_imei(&self, imei: &Imei) -> Result<Option<DeviceRecord>, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        device_inventory::table
            .filter(device_inventory::imei.eq(imei.as_str()))
            .select(DeviceRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(|row| row.into_domain().map_err(map_row_error))
            .transpose()
    }

    async fn insert(&self, device: &NewDeviceRecord) -> Result<DeviceRecord, RecordStoreError> {
        let values = NewDeviceRow::try_from_record(device).map_err(RecordStoreError::query)?;
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(device_inventory::table)
            .values(values)
            .returning(DeviceRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        row.into_domain().map_err(map_row_error)
    }

    async fn assign_if_unassigned(
        &self,
        imei: &Imei,
        user: LocalUserId,
        label: &str,
    ) -> Result<bool, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::update(
            device_inventory::table
                .filter(device_inventory::imei.eq(imei.as_str()))
                .filter(device_inventory::assigned_user_id.is_null()),
        )
        .set((
            device_inventory::assigned_user_id.eq(Some(user.get())),
            device_inventory::label.eq(Some(label)),
            device_inventory::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        debug!(%imei, user = %user, claimed = affected == 1, "conditional assignment");
        Ok(affected == 1)
    }

    async fn update_expiration(
        &self,
        id: LocalDeviceId,
        expiration: DateTime<Utc>,
    ) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::update(device_inventory::table.find(id.get()))
            .set((
                device_inventory::expiration.eq(Some(expiration)),
                device_inventory::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        expect_one_row(affected, &format!("device {id}"))
    }
}
