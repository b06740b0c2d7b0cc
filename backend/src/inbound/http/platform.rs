//! Routing lookup and dependency status.
//!
//! ```text
//! GET /api/v1/routing/KE
//! GET /api/v1/server/status?server_url=https://ke.example
//! ```

use actix_web::{get, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ApiResult;
use super::auth::Caller;
use super::state::HttpState;
use super::validation::{parse_country_code, parse_optional_server_url};
use crate::domain::Error;
use crate::domain::ports::DependencyStatus;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RouteBody {
    pub country_code: String,
    pub server_url: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ServerStatusQuery {
    /// Tracking server to probe; the configured default when absent.
    pub server_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct DependencyBody {
    /// `online` or `error`.
    #[schema(example = "online")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl From<DependencyStatus> for DependencyBody {
    fn from(status: DependencyStatus) -> Self {
        match status {
            DependencyStatus::Online { detail } => Self {
                status: "online".to_owned(),
                detail,
            },
            DependencyStatus::Error { message } => Self {
                status: "error".to_owned(),
                detail: Some(message),
            },
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ServerStatusBody {
    pub database: DependencyBody,
    pub tracking_server: DependencyBody,
    pub connectivity: DependencyBody,
}

/// Resolve the tracking server that serves a country. Public.
#[utoipa::path(
    get,
    path = "/api/v1/routing/{country_code}",
    params(("country_code" = String, Path, description = "ISO 3166-1 alpha-2 code")),
    responses(
        (status = 200, description = "Server for the country", body = RouteBody),
        (status = 400, description = "Malformed country code", body = Error),
        (status = 404, description = "No server for the country", body = Error)
    ),
    tags = ["platform"],
    operation_id = "lookupRoute",
    security([])
)]
#[get("/routing/{country_code}")]
pub async fn lookup_route(
    state: web::Data<HttpState>,
    path: web::Path<String>,
) -> ApiResult<web::Json<RouteBody>> {
    let country = parse_country_code(&path.into_inner())?;
    let server = state.platform.lookup_route(&country).await?;
    Ok(web::Json(RouteBody {
        country_code: country.to_string(),
        server_url: server.to_string(),
    }))
}

/// Report whether the record store, tracking server and SIM provider answer.
#[utoipa::path(
    get,
    path = "/api/v1/server/status",
    params(ServerStatusQuery),
    responses(
        (status = 200, description = "Dependency status", body = ServerStatusBody),
        (status = 400, description = "Malformed server url", body = Error),
        (status = 401, description = "Unauthorized", body = Error)
    ),
    tags = ["platform"],
    operation_id = "serverStatus"
)]
#[get("/server/status")]
pub async fn server_status(
    state: web::Data<HttpState>,
    _caller: Caller,
    query: web::Query<ServerStatusQuery>,
) -> ApiResult<web::Json<ServerStatusBody>> {
    let server = parse_optional_server_url(query.server_url.as_deref())?;
    let status = state.platform.server_status(server).await?;
    Ok(web::Json(ServerStatusBody {
        database: status.record_store.into(),
        tracking_server: status.tracking_server.into(),
        connectivity: status.connectivity.into(),
    }))
}
