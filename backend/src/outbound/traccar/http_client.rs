//! Reqwest-backed tracking server adapter.
//!
//! Owns transport details only: admin basic auth, timeouts, status mapping
//! and JSON decoding into domain records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;
use zeroize::Zeroizing;

use super::dto::{
    DeviceDto, NewDeviceDto, NewUserDto, PermissionDto, PositionDto, ServerDto, UserDto,
};
use crate::domain::ports::{
    Position, PositionWindow, RemoteDevice, RemoteUser, RemoteUserDraft, ServerInfo,
    TrackingClient, TrackingClientError,
};
use crate::domain::{EmailAddress, Imei, RemoteDeviceId, RemoteUserId, ServerUrl};

/// Administrator account used for every management call.
#[derive(Clone)]
pub struct TraccarCredentials {
    pub user: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for TraccarCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraccarCredentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Tracking client addressing any server by its base URL.
pub struct TraccarHttpClient {
    client: Client,
    credentials: TraccarCredentials,
}

impl TraccarHttpClient {
    /// Build an adapter whose requests all share `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(credentials: TraccarCredentials, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            credentials,
        })
    }

    fn admin(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .basic_auth(&self.credentials.user, Some(self.credentials.password.as_str()))
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, TrackingClientError> {
        let body = send(self.admin(request)).await?;
        serde_json::from_slice(&body).map_err(|error| {
            TrackingClientError::decode(format!("invalid tracking server JSON: {error}"))
        })
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), TrackingClientError> {
        send(self.admin(request)).await.map(|_| ())
    }
}

fn endpoint(server: &ServerUrl, path: &str) -> Result<Url, TrackingClientError> {
    Url::parse(&format!("{}/api/{path}", server.as_str())).map_err(|error| {
        TrackingClientError::transport(format!("invalid tracking server URL: {error}"))
    })
}

async fn send(request: RequestBuilder) -> Result<Vec<u8>, TrackingClientError> {
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status();
    let body = response.bytes().await.map_err(map_transport_error)?;
    if !status.is_success() {
        return Err(map_status_error(status, body.as_ref()));
    }
    Ok(body.to_vec())
}

fn decode_user(dto: UserDto) -> Result<RemoteUser, TrackingClientError> {
    dto.into_domain().map_err(TrackingClientError::decode)
}

fn decode_device(dto: DeviceDto) -> Result<RemoteDevice, TrackingClientError> {
    dto.into_domain().map_err(TrackingClientError::decode)
}

fn decode_positions(dtos: Vec<PositionDto>) -> Result<Vec<Position>, TrackingClientError> {
    dtos.into_iter()
        .map(|dto| dto.into_domain().map_err(TrackingClientError::decode))
        .collect()
}

/// Keep fixes inside the half-open window; the server treats `to` as inclusive.
fn within_window(positions: Vec<Position>, window: PositionWindow) -> Vec<Position> {
    positions
        .into_iter()
        .filter(|position| position.fix_time >= window.start && position.fix_time < window.end)
        .collect()
}

#[async_trait]
impl TrackingClient for TraccarHttpClient {
    async fn get_user(
        &self,
        server: &ServerUrl,
        id: RemoteUserId,
    ) -> Result<RemoteUser, TrackingClientError> {
        let url = endpoint(server, &format!("users/{id}"))?;
        decode_user(self.fetch(self.client.get(url)).await?)
    }

    async fn create_user(
        &self,
        server: &ServerUrl,
        draft: &RemoteUserDraft,
    ) -> Result<RemoteUser, TrackingClientError> {
        let url = endpoint(server, "users")?;
        let payload = NewUserDto::from_draft(draft);
        let user = decode_user(self.fetch(self.client.post(url).json(&payload)).await?)?;
        debug!(server = %server, remote_user = %user.id, "created remote user");
        Ok(user)
    }

    async fn update_user(
        &self,
        server: &ServerUrl,
        user: &RemoteUser,
        password: Option<Zeroizing<String>>,
    ) -> Result<RemoteUser, TrackingClientError> {
        let url = endpoint(server, &format!("users/{}", user.id))?;
        let payload = UserDto::from_domain(user, password);
        decode_user(self.fetch(self.client.put(url).json(&payload)).await?)
    }

    async fn delete_user(
        &self,
        server: &ServerUrl,
        id: RemoteUserId,
    ) -> Result<(), TrackingClientError> {
        let url = endpoint(server, &format!("users/{id}"))?;
        self.execute(self.client.delete(url)).await
    }

    async fn get_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let url = endpoint(server, &format!("devices/{id}"))?;
        decode_device(self.fetch(self.client.get(url)).await?)
    }

    async fn create_device(
        &self,
        server: &ServerUrl,
        name: &str,
        unique_id: &Imei,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let url = endpoint(server, "devices")?;
        let payload = NewDeviceDto {
            id: -1,
            name,
            unique_id: unique_id.as_str(),
        };
        decode_device(self.fetch(self.client.post(url).json(&payload)).await?)
    }

    async fn update_device(
        &self,
        server: &ServerUrl,
        device: &RemoteDevice,
    ) -> Result<RemoteDevice, TrackingClientError> {
        let url = endpoint(server, &format!("devices/{}", device.id))?;
        let payload = DeviceDto::from_domain(device);
        decode_device(self.fetch(self.client.put(url).json(&payload)).await?)
    }

    async fn delete_device(
        &self,
        server: &ServerUrl,
        id: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let url = endpoint(server, &format!("devices/{id}"))?;
        self.execute(self.client.delete(url)).await
    }

    async fn link_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let url = endpoint(server, "permissions")?;
        let payload = PermissionDto {
            user_id: user.get(),
            device_id: device.get(),
        };
        self.execute(self.client.post(url).json(&payload)).await
    }

    async fn unlink_device(
        &self,
        server: &ServerUrl,
        user: RemoteUserId,
        device: RemoteDeviceId,
    ) -> Result<(), TrackingClientError> {
        let url = endpoint(server, "permissions")?;
        let payload = PermissionDto {
            user_id: user.get(),
            device_id: device.get(),
        };
        self.execute(self.client.delete(url).json(&payload)).await
    }

    async fn positions(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
        window: PositionWindow,
    ) -> Result<Vec<Position>, TrackingClientError> {
        let url = endpoint(server, "positions")?;
        let query = [
            ("deviceId", device.to_string()),
            ("from", window.start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("to", window.end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ];
        let dtos: Vec<PositionDto> = self.fetch(self.client.get(url).query(&query)).await?;
        Ok(within_window(decode_positions(dtos)?, window))
    }

    async fn latest_position(
        &self,
        server: &ServerUrl,
        device: RemoteDeviceId,
    ) -> Result<Option<Position>, TrackingClientError> {
        let url = endpoint(server, "positions")?;
        let query = [("deviceId", device.to_string())];
        let dtos: Vec<PositionDto> = self.fetch(self.client.get(url).query(&query)).await?;
        Ok(decode_positions(dtos)?.into_iter().next())
    }

    async fn server_info(&self, server: &ServerUrl) -> Result<ServerInfo, TrackingClientError> {
        let url = endpoint(server, "server")?;
        let dto: ServerDto = self.fetch(self.client.get(url)).await?;
        Ok(ServerInfo {
            version: dto.version,
        })
    }

    async fn issue_session_token(
        &self,
        server: &ServerUrl,
        email: &EmailAddress,
        password: &str,
    ) -> Result<String, TrackingClientError> {
        // Token requests authenticate as the user, not the administrator.
        let url = endpoint(server, "session/token")?;
        let request = self
            .client
            .post(url)
            .basic_auth(email.as_str(), Some(password));
        let body = send(request).await?;
        let token = String::from_utf8(body)
            .map_err(|error| TrackingClientError::decode(format!("token is not UTF-8: {error}")))?;
        let token = token.trim();
        if token.is_empty() {
            return Err(TrackingClientError::decode("empty session token"));
        }
        Ok(token.to_owned())
    }
}

fn map_transport_error(error: reqwest::Error) -> TrackingClientError {
    if error.is_timeout() {
        TrackingClientError::timeout(error.to_string())
    } else {
        TrackingClientError::transport(error.to_string())
    }
}

/// Traccar reports unique-constraint hits as 400 with the database message.
fn is_duplicate_message(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    lowered.contains("duplicate") || lowered.contains("unique")
}

fn map_status_error(status: StatusCode, body: &[u8]) -> TrackingClientError {
    let body_preview = body_preview(body);
    let message = if body_preview.is_empty() {
        format!("status {}", status.as_u16())
    } else {
        format!("status {}: {}", status.as_u16(), body_preview)
    };

    match status {
        StatusCode::NOT_FOUND => TrackingClientError::not_found(message),
        StatusCode::CONFLICT => TrackingClientError::duplicate(message),
        StatusCode::BAD_REQUEST if is_duplicate_message(&body_preview) => {
            TrackingClientError::duplicate(message)
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => {
            TrackingClientError::timeout(message)
        }
        _ if status.is_client_error() => TrackingClientError::rejected(message),
        _ => TrackingClientError::transport(message),
    }
}

fn body_preview(body: &[u8]) -> String {
    const PREVIEW_CHAR_LIMIT: usize = 160;

    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview = compact.chars().take(PREVIEW_CHAR_LIMIT).collect::<String>();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
