//! User provisioning handlers.
//!
//! ```text
//! POST /api/v1/user/sync {"country_code":"KE","name":"Ada"}
//! POST /api/v1/user/update {"user_id":7,"server_user_id":41,"server_url":"https://ke.example"}
//! POST /api/v1/user/delete {"user_id":7,"server_user_id":41,"server_url":"https://ke.example"}
//! POST /api/v1/user/push-token {"token":"fcm-123"}
//! POST /api/v1/server/token {}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use super::ApiResult;
use super::auth::Caller;
use super::state::HttpState;
use super::validation::{
    FieldName, missing_field_error, parse_country_code, parse_optional_server_url,
    parse_positive_id, parse_server_url,
};
use crate::domain::ports::{DeleteUserRequest, SyncTarget, SyncUserRequest, UpdateUserRequest};
use crate::domain::{Error, LocalUserId, RemoteUserId, ServerUrl, UserProfile};

const USER_ID: FieldName = FieldName::new("user_id");
const SERVER_USER_ID: FieldName = FieldName::new("server_user_id");
const TOKEN: FieldName = FieldName::new("token");

/// Body for `POST /api/v1/user/sync`.
///
/// `server_url` takes precedence when both routing keys are present.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SyncUserBody {
    pub server_url: Option<String>,
    #[schema(example = "KE")]
    pub country_code: Option<String>,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl TryFrom<SyncUserBody> for SyncUserRequest {
    type Error = Error;

    fn try_from(body: SyncUserBody) -> Result<Self, Self::Error> {
        let target = match (parse_optional_server_url(body.server_url.as_deref())?, body.country_code) {
            (Some(server), _) => SyncTarget::Server(server),
            (None, Some(country)) if !country.trim().is_empty() => {
                SyncTarget::Country(parse_country_code(&country)?)
            }
            (None, _) => {
                return Err(Error::invalid_request(
                    "either server_url or country_code is required",
                )
                .with_details(json!({
                    "field": "server_url",
                    "code": "missing_field",
                })));
            }
        };
        Ok(Self {
            target,
            name: body.name,
            phone: body.phone,
        })
    }
}

/// Profile returned by provisioning calls; internal ids are never exposed.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserProfileBody {
    pub server_url: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub session_token: Option<String>,
}

impl From<UserProfile> for UserProfileBody {
    fn from(profile: UserProfile) -> Self {
        Self {
            server_url: profile.server_url.to_string(),
            name: profile.name,
            phone: profile.phone,
            session_token: profile.session_token,
        }
    }
}

/// Identifies the record an update or delete targets.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UserRecordBody {
    /// Local record id.
    pub user_id: i64,
    /// User id on the tracking server.
    pub server_user_id: i64,
    pub server_url: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

struct RecordKey {
    local_id: LocalUserId,
    remote_id: RemoteUserId,
    server_url: ServerUrl,
}

fn record_key(body: &UserRecordBody) -> Result<RecordKey, Error> {
    Ok(RecordKey {
        local_id: parse_positive_id(body.user_id, USER_ID, LocalUserId::new)?,
        remote_id: parse_positive_id(body.server_user_id, SERVER_USER_ID, RemoteUserId::new)?,
        server_url: parse_server_url(&body.server_url)?,
    })
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PushTokenBody {
    pub token: String,
}

#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
pub struct SessionTokenBody {
    pub server_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct SessionTokenResponse {
    pub token: String,
}

/// Create or reconcile the caller's tracking account.
///
/// Responds 201 when a new account was provisioned and 200 when the caller
/// already had one.
#[utoipa::path(
    post,
    path = "/api/v1/user/sync",
    request_body = SyncUserBody,
    responses(
        (status = 200, description = "Existing user reconciled", body = UserProfileBody),
        (status = 201, description = "User provisioned", body = UserProfileBody),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Unauthorized", body = Error),
        (status = 404, description = "No server for country", body = Error),
        (status = 409, description = "Remote account needs manual linking", body = Error),
        (status = 500, description = "Persistence failure", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["users"],
    operation_id = "syncUser"
)]
#[post("/user/sync")]
pub async fn sync_user(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<SyncUserBody>,
) -> ApiResult<HttpResponse> {
    let request = SyncUserRequest::try_from(payload.into_inner())?;
    let outcome = state.users.sync(&caller.0, request).await?;
    let body = UserProfileBody::from(outcome.profile);
    Ok(if outcome.created {
        HttpResponse::Created().json(body)
    } else {
        HttpResponse::Ok().json(body)
    })
}

/// Update the caller's name and phone on the tracking server and locally.
#[utoipa::path(
    post,
    path = "/api/v1/user/update",
    request_body = UserRecordBody,
    responses(
        (status = 200, description = "Profile updated", body = UserProfileBody),
        (status = 400, description = "Invalid request", body = Error),
        (status = 403, description = "Record belongs to someone else", body = Error),
        (status = 404, description = "Unknown record", body = Error),
        (status = 500, description = "Persistence failure", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["users"],
    operation_id = "updateUser"
)]
#[post("/user/update")]
pub async fn update_user(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<UserRecordBody>,
) -> ApiResult<web::Json<UserProfileBody>> {
    let body = payload.into_inner();
    let key = record_key(&body)?;
    let profile = state
        .users
        .update_profile(
            &caller.0,
            UpdateUserRequest {
                local_id: key.local_id,
                remote_id: key.remote_id,
                server_url: key.server_url,
                name: body.name,
                phone: body.phone,
            },
        )
        .await?;
    Ok(web::Json(profile.into()))
}

/// Delete the user from the tracking server, then locally.
#[utoipa::path(
    post,
    path = "/api/v1/user/delete",
    request_body = UserRecordBody,
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Record belongs to someone else", body = Error),
        (status = 404, description = "Unknown record", body = Error),
        (status = 500, description = "Persistence failure", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["users"],
    operation_id = "deleteUser"
)]
#[post("/user/delete")]
pub async fn delete_user(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<UserRecordBody>,
) -> ApiResult<HttpResponse> {
    let key = record_key(&payload)?;
    state
        .users
        .delete(
            &caller.0,
            DeleteUserRequest {
                local_id: key.local_id,
                remote_id: key.remote_id,
                server_url: key.server_url,
            },
        )
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Store the caller's push notification token.
#[utoipa::path(
    post,
    path = "/api/v1/user/push-token",
    request_body = PushTokenBody,
    responses(
        (status = 204, description = "Token stored"),
        (status = 400, description = "Invalid request", body = Error),
        (status = 404, description = "Caller has no record", body = Error)
    ),
    tags = ["users"],
    operation_id = "registerPushToken"
)]
#[post("/user/push-token")]
pub async fn register_push_token(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<PushTokenBody>,
) -> ApiResult<HttpResponse> {
    let token = payload.into_inner().token.trim().to_owned();
    if token.is_empty() {
        return Err(missing_field_error(TOKEN));
    }
    state.users.register_push_token(&caller.0, token).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// Obtain a tracking-server session token for the caller and store it.
#[utoipa::path(
    post,
    path = "/api/v1/server/token",
    request_body = SessionTokenBody,
    responses(
        (status = 200, description = "Session token issued", body = SessionTokenResponse),
        (status = 404, description = "Caller has no record", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["users"],
    operation_id = "issueSessionToken"
)]
#[post("/server/token")]
pub async fn issue_session_token(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: Option<web::Json<SessionTokenBody>>,
) -> ApiResult<web::Json<SessionTokenResponse>> {
    let body = payload.map(web::Json::into_inner).unwrap_or_default();
    let server = parse_optional_server_url(body.server_url.as_deref())?;
    let token = state.users.issue_session_token(&caller.0, server).await?;
    Ok(web::Json(SessionTokenResponse { token }))
}
