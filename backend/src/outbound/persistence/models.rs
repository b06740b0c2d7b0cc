//! Internal Diesel row structs.
//!
//! Rows never leave the persistence layer; repositories convert them to
//! domain records, rejecting values the domain newtypes would not accept.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::{device_inventory, users};
use crate::domain::{
    CountryCode, DeviceRecord, EmailAddress, Iccid, Imei, LocalDeviceId, LocalUserId,
    NewDeviceRecord, NewUserRecord, PreloadedMonths, ProfileChanges, RemoteDeviceId,
    RemoteUserId, ServerUrl, SubjectId, UserRecord,
};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct UserRow {
    pub id: i64,
    pub email: String,
    pub auth_subject: String,
    pub remote_user_id: i64,
    pub server_url: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub session_token: Option<String>,
    pub push_token: Option<String>,
    pub country_code: Option<String>,
}

impl UserRow {
    pub(crate) fn into_domain(self) -> Result<UserRecord, String> {
        let id = self.id;
        let invalid = move |field: &str, err: &dyn std::fmt::Display| {
            format!("users row {id} has invalid {field}: {err}")
        };
        Ok(UserRecord {
            id: LocalUserId::new(self.id).map_err(|err| invalid("id", &err))?,
            email: EmailAddress::new(self.email).map_err(|err| invalid("email", &err))?,
            subject: SubjectId::new(self.auth_subject)
                .map_err(|err| invalid("auth_subject", &err))?,
            remote_user_id: RemoteUserId::new(self.remote_user_id)
                .map_err(|err| invalid("remote_user_id", &err))?,
            server_url: ServerUrl::parse(&self.server_url)
                .map_err(|err| invalid("server_url", &err))?,
            name: self.display_name,
            phone: self.phone,
            session_token: self.session_token,
            push_token: self.push_token,
            country_code: self
                .country_code
                .as_deref()
                .map(CountryCode::parse)
                .transpose()
                .map_err(|err| invalid("country_code", &err))?,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub(crate) struct NewUserRow<'a> {
    pub email: &'a str,
    pub auth_subject: &'a str,
    pub remote_user_id: i64,
    pub server_url: &'a str,
    pub display_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub country_code: Option<&'a str>,
}

impl<'a> From<&'a NewUserRecord> for NewUserRow<'a> {
    fn from(user: &'a NewUserRecord) -> Self {
        Self {
            email: user.email.as_str(),
            auth_subject: user.subject.as_str(),
            remote_user_id: user.remote_user_id.get(),
            server_url: user.server_url.as_str(),
            display_name: user.name.as_deref(),
            phone: user.phone.as_deref(),
            country_code: user.country_code.as_ref().map(CountryCode::as_str),
        }
    }
}

/// Profile changeset; `None` clears the column.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = users)]
#[diesel(treat_none_as_null = true)]
pub(crate) struct ProfileUpdate<'a> {
    pub email: &'a str,
    pub display_name: Option<&'a str>,
    pub phone: Option<&'a str>,
    pub updated_at: DateTime<Utc>,
}

impl<'a> ProfileUpdate<'a> {
    pub(crate) fn new(changes: &'a ProfileChanges, now: DateTime<Utc>) -> Self {
        Self {
            email: changes.email.as_str(),
            display_name: changes.name.as_deref(),
            phone: changes.phone.as_deref(),
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = device_inventory)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct DeviceRow {
    pub id: i64,
    pub imei: String,
    pub sim_iccid: String,
    pub remote_device_id: i64,
    pub server_url: String,
    pub assigned_user_id: Option<i64>,
    pub label: Option<String>,
    pub preloaded_months: i32,
    pub expiration: Option<DateTime<Utc>>,
    pub brand: Option<String>,
    pub model: Option<String>,
}

impl DeviceRow {
    pub(crate) fn into_domain(self) -> Result<DeviceRecord, String> {
        let id = self.id;
        let invalid = move |field: &str, err: &dyn std::fmt::Display| {
            format!("device_inventory row {id} has invalid {field}: {err}")
        };
        Ok(DeviceRecord {
            id: LocalDeviceId::new(self.id).map_err(|err| invalid("id", &err))?,
            imei: Imei::parse(&self.imei).map_err(|err| invalid("imei", &err))?,
            iccid: Iccid::parse(&self.sim_iccid).map_err(|err| invalid("sim_iccid", &err))?,
            remote_device_id: RemoteDeviceId::new(self.remote_device_id)
                .map_err(|err| invalid("remote_device_id", &err))?,
            server_url: ServerUrl::parse(&self.server_url)
                .map_err(|err| invalid("server_url", &err))?,
            assigned_user: self
                .assigned_user_id
                .map(LocalUserId::new)
                .transpose()
                .map_err(|err| invalid("assigned_user_id", &err))?,
            label: self.label,
            preloaded_months: PreloadedMonths::from_stored(Some(self.preloaded_months)),
            expiration: self.expiration,
            brand: self.brand,
            model: self.model,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = device_inventory)]
pub(crate) struct NewDeviceRow<'a> {
    pub imei: &'a str,
    pub sim_iccid: &'a str,
    pub remote_device_id: i64,
    pub server_url: &'a str,
    pub label: Option<&'a str>,
    pub preloaded_months: i32,
    pub brand: Option<&'a str>,
    pub model: Option<&'a str>,
}

impl<'a> NewDeviceRow<'a> {
    pub(crate) fn try_from_record(device: &'a NewDeviceRecord) -> Result<Self, String> {
        let preloaded_months = i32::try_from(device.preloaded_months.get())
            .map_err(|_| "preloaded months out of range".to_owned())?;
        Ok(Self {
            imei: device.imei.as_str(),
            sim_iccid: device.iccid.as_str(),
            remote_device_id: device.remote_device_id.get(),
            server_url: device.server_url.as_str(),
            label: device.label.as_deref(),
            preloaded_months,
            brand: device.brand.as_deref(),
            model: device.model.as_deref(),
        })
    }
}
