//! PostgreSQL-backed `UserRepository`.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{expect_one_row, map_diesel_error, map_pool_error, map_row_error};
use super::models::{NewUserRow, ProfileUpdate, UserRow};
use super::pool::DbPool;
use super::schema::users;
use crate::domain::ports::{RecordStoreError, UserRepository};
use crate::domain::{
    LocalUserId, NewUserRecord, ProfileChanges, RemoteUserId, SubjectId, UserRecord,
};

#[derive(Clone)]
pub struct DieselUserRepository {
    pool: DbPool,
}

impl DieselUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn to_record(row: UserRow) -> Result<UserRecord, RecordStoreError> {
    row.into_domain().map_err(map_row_error)
}

#[async_trait]
impl UserRepository for DieselUserRepository {
    async fn find_by_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Vec<UserRecord>, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows = users::table
            .filter(users::auth_subject.eq(subject.as_str()))
            .order(users::id.asc())
            .select(UserRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        rows.into_iter().map(to_record).collect()
    }

    async fn find_by_id(&self, id: LocalUserId) -> Result<Option<UserRecord>, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        users::table
            .find(id.get())
            .select(UserRow::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .map(to_record)
            .transpose()
    }

    async fn insert(&self, user: &NewUserRecord) -> Result<UserRecord, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::insert_into(users::table)
            .values(NewUserRow::from(user))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_record(row)
    }

    async fn update_remote_user_id(
        &self,
        id: LocalUserId,
        remote: RemoteUserId,
    ) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::update(users::table.find(id.get()))
            .set((
                users::remote_user_id.eq(remote.get()),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        expect_one_row(affected, &format!("user {id}"))
    }

    async fn update_profile(
        &self,
        id: LocalUserId,
        changes: &ProfileChanges,
    ) -> Result<UserRecord, RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = diesel::update(users::table.find(id.get()))
            .set(ProfileUpdate::new(changes, Utc::now()))
            .returning(UserRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        to_record(row)
    }

    async fn update_session_token(
        &self,
        id: LocalUserId,
        token: &str,
    ) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::update(users::table.find(id.get()))
            .set((
                users::session_token.eq(Some(token)),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        expect_one_row(affected, &format!("user {id}"))
    }

    async fn update_push_token(
        &self,
        id: LocalUserId,
        token: &str,
    ) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::update(users::table.find(id.get()))
            .set((
                users::push_token.eq(Some(token)),
                users::updated_at.eq(Utc::now()),
            ))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        expect_one_row(affected, &format!("user {id}"))
    }

    async fn delete(&self, id: LocalUserId) -> Result<(), RecordStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let affected = diesel::delete(users::table.find(id.get()))
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        expect_one_row(affected, &format!("user {id}"))
    }
}
