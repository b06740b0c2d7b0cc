//! Inventory intake for operators.
//!
//! ```text
//! POST /api/v1/inventory/createRecord
//!   {"server_url":"https://ke.example","imei":"356321089455217","iccid":"8925402100000000001F"}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ApiResult;
use super::auth::Caller;
use super::state::HttpState;
use super::validation::{parse_iccid, parse_imei, parse_server_url};
use crate::domain::ports::CreateInventoryRecord;
use crate::domain::{Error, PreloadedMonths};

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct CreateRecordBody {
    pub server_url: String,
    pub imei: String,
    pub iccid: String,
    pub brand: Option<String>,
    pub model: Option<String>,
    /// Entitlement granted on first activation; defaults to one month.
    pub preloaded_months: Option<u32>,
}

impl TryFrom<CreateRecordBody> for CreateInventoryRecord {
    type Error = Error;

    fn try_from(body: CreateRecordBody) -> Result<Self, Self::Error> {
        Ok(Self {
            server_url: parse_server_url(&body.server_url)?,
            imei: parse_imei(&body.imei)?,
            iccid: parse_iccid(&body.iccid)?,
            brand: body.brand,
            model: body.model,
            preloaded_months: body.preloaded_months.map(PreloadedMonths::new),
        })
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RecordCreatedBody {
    pub id: i64,
    pub server_device_id: i64,
    /// Placeholder name given to the device on the tracking server.
    #[schema(example = "@@ 5217/001F")]
    pub name: String,
}

/// Register a tracker and its SIM as unassigned inventory.
///
/// The SIM must be disabled and unnamed at the provider.
#[utoipa::path(
    post,
    path = "/api/v1/inventory/createRecord",
    request_body = CreateRecordBody,
    responses(
        (status = 201, description = "Inventory record created", body = RecordCreatedBody),
        (status = 400, description = "Invalid identifiers or ineligible SIM", body = Error),
        (status = 403, description = "Caller is not an operator", body = Error),
        (status = 409, description = "Device already registered", body = Error),
        (status = 500, description = "Persistence failure, rollback reported", body = Error),
        (status = 502, description = "Remote failure, rollback reported", body = Error)
    ),
    tags = ["inventory"],
    operation_id = "createInventoryRecord"
)]
#[post("/inventory/createRecord")]
pub async fn create_record(
    state: web::Data<HttpState>,
    caller: Caller,
    payload: web::Json<CreateRecordBody>,
) -> ApiResult<HttpResponse> {
    caller.0.require_admin()?;
    let request = CreateInventoryRecord::try_from(payload.into_inner())?;
    let created = state.inventory.create_record(&caller.0, request).await?;
    Ok(HttpResponse::Created().json(RecordCreatedBody {
        id: created.local_id.get(),
        server_device_id: created.remote_device_id.get(),
        name: created.generated_name,
    }))
}
