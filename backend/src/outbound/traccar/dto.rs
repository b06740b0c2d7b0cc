//! Wire DTOs for the Traccar REST API.
//!
//! Users and devices keep every field the server sent in `extra` so an
//! update can send them back untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use zeroize::Zeroizing;

use crate::domain::ports::{Position, RemoteDevice, RemoteUser, RemoteUserDraft, SUBJECT_ATTRIBUTE};
use crate::domain::{RemoteDeviceId, RemoteUserId};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UserDto {
    pub(super) id: i64,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) email: String,
    #[serde(default)]
    pub(super) phone: Option<String>,
    #[serde(default)]
    pub(super) attributes: Map<String, Value>,
    /// Write-only; the server never returns it.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub(super) password: Option<Zeroizing<String>>,
    #[serde(flatten)]
    pub(super) extra: Map<String, Value>,
}

impl UserDto {
    pub(super) fn into_domain(self) -> Result<RemoteUser, String> {
        let id = RemoteUserId::new(self.id).map_err(|err| format!("user id {}: {err}", self.id))?;
        Ok(RemoteUser {
            id,
            name: self.name,
            email: self.email,
            phone: self.phone.filter(|phone| !phone.is_empty()),
            attributes: self.attributes,
            passthrough: self.extra,
        })
    }

    pub(super) fn from_domain(user: &RemoteUser, password: Option<Zeroizing<String>>) -> Self {
        Self {
            id: user.id.get(),
            name: user.name.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            attributes: user.attributes.clone(),
            password,
            extra: user.passthrough.clone(),
        }
    }
}

/// Body for `POST /api/users`; `id = -1` asks the server to allocate one.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NewUserDto<'a> {
    id: i64,
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<&'a str>,
    password: &'a str,
    disabled: bool,
    admin: bool,
    map: &'a str,
    device_limit: i64,
    expiration_time: Option<DateTime<Utc>>,
    attributes: Map<String, Value>,
}

impl<'a> NewUserDto<'a> {
    pub(super) fn from_draft(draft: &'a RemoteUserDraft) -> Self {
        let mut attributes = Map::new();
        attributes.insert(
            SUBJECT_ATTRIBUTE.to_owned(),
            Value::String(draft.subject.as_str().to_owned()),
        );
        Self {
            id: -1,
            name: &draft.name,
            email: draft.email.as_str(),
            phone: draft.phone.as_deref(),
            password: draft.password.as_str(),
            disabled: false,
            admin: false,
            map: "osm",
            device_limit: -1,
            expiration_time: None,
            attributes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct DeviceDto {
    pub(super) id: i64,
    #[serde(default)]
    pub(super) name: String,
    #[serde(default)]
    pub(super) unique_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) last_update: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub(super) extra: Map<String, Value>,
}

impl DeviceDto {
    pub(super) fn into_domain(self) -> Result<RemoteDevice, String> {
        let id =
            RemoteDeviceId::new(self.id).map_err(|err| format!("device id {}: {err}", self.id))?;
        Ok(RemoteDevice {
            id,
            name: self.name,
            unique_id: self.unique_id,
            status: self.status,
            last_update: self.last_update,
            passthrough: self.extra,
        })
    }

    pub(super) fn from_domain(device: &RemoteDevice) -> Self {
        Self {
            id: device.id.get(),
            name: device.name.clone(),
            unique_id: device.unique_id.clone(),
            status: device.status.clone(),
            last_update: device.last_update,
            extra: device.passthrough.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct NewDeviceDto<'a> {
    pub(super) id: i64,
    pub(super) name: &'a str,
    pub(super) unique_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PermissionDto {
    pub(super) user_id: i64,
    pub(super) device_id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PositionDto {
    device_id: i64,
    fix_time: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    course: f64,
    #[serde(default)]
    altitude: f64,
}

impl PositionDto {
    pub(super) fn into_domain(self) -> Result<Position, String> {
        let device_id = RemoteDeviceId::new(self.device_id)
            .map_err(|err| format!("position device id {}: {err}", self.device_id))?;
        Ok(Position {
            device_id,
            fix_time: self.fix_time,
            latitude: self.latitude,
            longitude: self.longitude,
            speed: self.speed,
            course: self.course,
            altitude: self.altitude,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServerDto {
    #[serde(default)]
    pub(super) version: Option<String>,
}
