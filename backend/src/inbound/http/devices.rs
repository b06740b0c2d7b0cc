//! Device assignment, connectivity and status handlers.
//!
//! ```text
//! POST /api/v1/user/link-device {"imei":"356321089455217","name":"Van 3"}
//! POST /api/v1/device/enable {"imei":"356321089455217"}
//! POST /api/v1/device/disable {"imei":"356321089455217"}
//! GET  /api/v1/device/status?imei=356321089455217
//! GET  /api/v1/device/usage?imei=356321089455217
//! ```

use actix_web::{get, post, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ApiResult;
use super::auth::Caller;
use super::history::PositionBody;
use super::state::HttpState;
use super::validation::{FieldName, missing_field_error, parse_imei};
use crate::domain::Error;
use crate::domain::ports::{LinkDeviceRequest, SimState, UsageRecord};

const NAME: FieldName = FieldName::new("name");

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ImeiBody {
    #[schema(example = "356321089455217")]
    pub imei: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LinkDeviceBody {
    pub imei: String,
    /// Name shown for the device on the tracking server.
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LinkedDeviceBody {
    pub imei: String,
    pub name: String,
}

/// Connectivity state after an enable or disable call.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ConnectivityBody {
    pub imei: String,
    pub enabled: bool,
    /// True when the SIM was already in the requested state.
    pub unchanged: bool,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DeviceStatusBody {
    pub imei: String,
    pub last_position: Option<PositionBody>,
    /// `enabled`, `disabled`, the provider's raw value, or `unknown`.
    #[schema(example = "enabled")]
    pub sim_state: String,
    pub expiration: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct UsageBody {
    pub period: String,
    pub data_bytes: u64,
    pub sms_count: u64,
    pub cost: Option<f64>,
}

impl From<UsageRecord> for UsageBody {
    fn from(record: UsageRecord) -> Self {
        Self {
            period: record.period,
            data_bytes: record.data_bytes,
            sms_count: record.sms_count,
            cost: record.cost,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DeviceUsageBody {
    pub imei: String,
    pub usage: Vec<UsageBody>,
}

fn sim_state_label(state: Option<SimState>) -> String {
    match state {
        Some(SimState::Enabled) => "enabled".to_owned(),
        Some(SimState::Disabled) => "disabled".to_owned(),
        Some(SimState::Other(raw)) => raw,
        None => "unknown".to_owned(),
    }
}

/// Bind an inventory device to the caller on the tracking server and locally.
#[utoipa::path(
    post,
    path = "/api/v1/user/link-device",
    request_body = LinkDeviceBody,
    responses(
        (status = 200, description = "Device linked", body = LinkedDeviceBody),
        (status = 400, description = "Invalid request", body = Error),
        (status = 403, description = "Device belongs to another server", body = Error),
        (status = 404, description = "Unknown device or user", body = Error),
        (status = 409, description = "Device already assigned", body = Error),
        (status = 500, description = "Persistence failure, rollback reported", body = Error),
        (status = 502, description = "Tracking server failure, rollback reported", body = Error)
    ),
    tags = ["devices"],
    operation_id = "linkDevice"
)]
#[post("/user/link-device")]
pub async fn link_device(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<LinkDeviceBody>,
) -> ApiResult<web::Json<LinkedDeviceBody>> {
    let body = payload.into_inner();
    let imei = parse_imei(&body.imei)?;
    let name = body.name.trim().to_owned();
    if name.is_empty() {
        return Err(missing_field_error(NAME));
    }
    let linked = state
        .assignments
        .link_device(&caller.0, LinkDeviceRequest { imei, name })
        .await?;
    Ok(web::Json(LinkedDeviceBody {
        imei: linked.imei.to_string(),
        name: linked.name,
    }))
}

/// Activate the device's SIM and start its entitlement period.
#[utoipa::path(
    post,
    path = "/api/v1/device/enable",
    request_body = ImeiBody,
    responses(
        (status = 200, description = "SIM enabled", body = ConnectivityBody),
        (status = 400, description = "Device is not assigned", body = Error),
        (status = 403, description = "Not the owner, or entitlement expired", body = Error),
        (status = 404, description = "Unknown device", body = Error),
        (status = 502, description = "SIM provider failure", body = Error)
    ),
    tags = ["devices"],
    operation_id = "enableDevice"
)]
#[post("/device/enable")]
pub async fn enable_device(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<ImeiBody>,
) -> ApiResult<web::Json<ConnectivityBody>> {
    let imei = parse_imei(&payload.imei)?;
    let outcome = state.connectivity.enable(&caller.0, &imei).await?;
    Ok(web::Json(ConnectivityBody {
        imei: imei.to_string(),
        enabled: true,
        unchanged: outcome.already_enabled,
        expiration: outcome.expiration,
    }))
}

/// Suspend the device's SIM. Stored entitlement is left untouched.
#[utoipa::path(
    post,
    path = "/api/v1/device/disable",
    request_body = ImeiBody,
    responses(
        (status = 200, description = "SIM disabled", body = ConnectivityBody),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown device", body = Error),
        (status = 502, description = "SIM provider failure", body = Error)
    ),
    tags = ["devices"],
    operation_id = "disableDevice"
)]
#[post("/device/disable")]
pub async fn disable_device(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<ImeiBody>,
) -> ApiResult<web::Json<ConnectivityBody>> {
    let imei = parse_imei(&payload.imei)?;
    let outcome = state.connectivity.disable(&caller.0, &imei).await?;
    Ok(web::Json(ConnectivityBody {
        imei: imei.to_string(),
        enabled: false,
        unchanged: outcome.already_disabled,
        expiration: None,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/device/status",
    params(("imei" = String, Query, description = "Device IMEI")),
    responses(
        (status = 200, description = "Current device status", body = DeviceStatusBody),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown device", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["devices"],
    operation_id = "deviceStatus"
)]
#[get("/device/status")]
pub async fn device_status(
    state: web::Data<HttpState>,
    caller: Caller,
    query: web::Query<ImeiBody>,
) -> ApiResult<web::Json<DeviceStatusBody>> {
    let imei = parse_imei(&query.imei)?;
    let status = state.insight.status(&caller.0, &imei).await?;
    Ok(web::Json(DeviceStatusBody {
        imei: status.imei.to_string(),
        last_position: status.last_position.map(PositionBody::from),
        sim_state: sim_state_label(status.sim_state),
        expiration: status.expiration,
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/device/usage",
    params(("imei" = String, Query, description = "Device IMEI")),
    responses(
        (status = 200, description = "SIM usage history", body = DeviceUsageBody),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown device", body = Error),
        (status = 502, description = "SIM provider failure", body = Error)
    ),
    tags = ["devices"],
    operation_id = "deviceUsage"
)]
#[get("/device/usage")]
pub async fn device_usage(
    state: web::Data<HttpState>,
    caller: Caller,
    query: web::Query<ImeiBody>,
) -> ApiResult<web::Json<DeviceUsageBody>> {
    let imei = parse_imei(&query.imei)?;
    let usage = state.insight.usage(&caller.0, &imei).await?;
    Ok(web::Json(DeviceUsageBody {
        imei: imei.to_string(),
        usage: usage.into_iter().map(UsageBody::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{ActivationOutcome, DeviceStatus, LinkedDevice};
    use crate::inbound::http::test_utils::{MockPorts, call_api, subscriber};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use chrono::TimeZone;
    use serde_json::json;

    const IMEI: &str = "356321089455217";

    #[actix_web::test]
    async fn link_device_trims_the_name() {
        let mut ports = MockPorts::default();
        ports
            .assignments
            .expect_link_device()
            .withf(|_, request| request.name == "Van 3" && request.imei.as_str() == IMEI)
            .times(1)
            .return_once(|_, request| {
                Ok(LinkedDevice {
                    imei: request.imei,
                    name: request.name,
                })
            });

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::post()
                .uri("/api/v1/user/link-device")
                .set_json(json!({ "imei": IMEI, "name": "  Van 3 " })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "imei": IMEI, "name": "Van 3" }));
    }

    #[actix_web::test]
    async fn link_device_failure_carries_rollback_details() {
        let mut ports = MockPorts::default();
        ports.assignments.expect_link_device().return_once(|_, _| {
            Err(Error::persistence_failed("could not record assignment").with_details(json!({
                "failedStep": "persist_assignment",
                "rollback": { "complete": true, "actions": [] },
            })))
        });

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::post()
                .uri("/api/v1/user/link-device")
                .set_json(json!({ "imei": IMEI, "name": "Van 3" })),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"]["failedStep"], "persist_assignment");
        assert_eq!(body["details"]["rollback"]["complete"], true);
    }

    #[actix_web::test]
    async fn enable_reports_the_new_expiration() {
        let expiration = Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).single().expect("time");
        let mut ports = MockPorts::default();
        ports.connectivity.expect_enable().times(1).return_once(move |_, _| {
            Ok(ActivationOutcome {
                already_enabled: false,
                expiration: Some(expiration),
            })
        });

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::post()
                .uri("/api/v1/device/enable")
                .set_json(json!({ "imei": IMEI })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["enabled"], true);
        assert_eq!(body["unchanged"], false);
        assert_eq!(body["expiration"], "2025-02-28T23:59:59Z");
    }

    #[actix_web::test]
    async fn enable_after_expiry_is_forbidden() {
        let mut ports = MockPorts::default();
        ports
            .connectivity
            .expect_enable()
            .return_once(|_, _| Err(Error::already_expired("entitlement expired")));

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::post()
                .uri("/api/v1/device/enable")
                .set_json(json!({ "imei": IMEI })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "already_expired");
    }

    #[actix_web::test]
    async fn malformed_imei_never_reaches_the_core() {
        let mut ports = MockPorts::default();
        ports.connectivity.expect_disable().times(0);

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::post()
                .uri("/api/v1/device/disable")
                .set_json(json!({ "imei": "12-34" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["field"], "imei");
    }

    #[actix_web::test]
    async fn status_reports_unknown_sim_state() {
        let mut ports = MockPorts::default();
        ports.insight.expect_status().return_once(|_, imei| {
            Ok(DeviceStatus {
                imei: imei.clone(),
                last_position: None,
                sim_state: None,
                expiration: None,
            })
        });

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::get().uri(&format!("/api/v1/device/status?imei={IMEI}")),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sim_state"], "unknown");
        assert!(body["last_position"].is_null());
    }
}
