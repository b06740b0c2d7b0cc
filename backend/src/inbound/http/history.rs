//! Position history for one local calendar day.
//!
//! ```text
//! GET /api/v1/history/positions?imei=356321089455217&date=2024-03-10&timezone=America/New_York
//! ```

use actix_web::{get, web};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::ApiResult;
use super::auth::Caller;
use super::state::HttpState;
use super::validation::{FieldName, parse_date, parse_imei, parse_timezone};
use crate::domain::Error;
use crate::domain::ports::{Position, PositionHistoryRequest};

const DATE: FieldName = FieldName::new("date");
const TIMEZONE: FieldName = FieldName::new("timezone");

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PositionHistoryQuery {
    pub imei: String,
    /// Local calendar day, `YYYY-MM-DD`.
    pub date: String,
    /// IANA timezone the day is interpreted in.
    pub timezone: String,
}

/// One reported fix.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct PositionBody {
    pub fix_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    /// Knots.
    pub speed: f64,
    pub course: f64,
    pub altitude: f64,
}

impl From<Position> for PositionBody {
    fn from(position: Position) -> Self {
        Self {
            fix_time: position.fix_time,
            latitude: position.latitude,
            longitude: position.longitude,
            speed: position.speed,
            course: position.course,
            altitude: position.altitude,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct PositionHistoryBody {
    pub imei: String,
    /// Inclusive UTC start of the local day.
    pub from: DateTime<Utc>,
    /// Exclusive UTC end of the local day.
    pub to: DateTime<Utc>,
    pub positions: Vec<PositionBody>,
}

/// Positions recorded during one local day.
///
/// Owners see their own devices; administrators see any device.
#[utoipa::path(
    get,
    path = "/api/v1/history/positions",
    params(PositionHistoryQuery),
    responses(
        (status = 200, description = "Positions for the day", body = PositionHistoryBody),
        (status = 400, description = "Invalid imei, date or timezone", body = Error),
        (status = 403, description = "Not the owner", body = Error),
        (status = 404, description = "Unknown device", body = Error),
        (status = 502, description = "Tracking server failure", body = Error)
    ),
    tags = ["devices"],
    operation_id = "positionHistory"
)]
#[get("/history/positions")]
pub async fn position_history(
    state: web::Data<HttpState>,
    caller: Caller,
    query: web::Query<PositionHistoryQuery>,
) -> ApiResult<web::Json<PositionHistoryBody>> {
    let request = PositionHistoryRequest {
        imei: parse_imei(&query.imei)?,
        date: parse_date(&query.date, DATE)?,
        timezone: parse_timezone(&query.timezone, TIMEZONE)?,
    };
    let imei = request.imei.to_string();
    let history = state.insight.position_history(&caller.0, request).await?;
    Ok(web::Json(PositionHistoryBody {
        imei,
        from: history.window.start,
        to: history.window.end,
        positions: history.positions.into_iter().map(PositionBody::from).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{PositionHistory, PositionWindow};
    use crate::domain::{RemoteDeviceId, local_day_window};
    use crate::inbound::http::test_utils::{MockPorts, call_api, subscriber};
    use actix_web::http::StatusCode;
    use actix_web::test;
    use chrono_tz::Tz;

    #[actix_web::test]
    async fn forwards_the_parsed_day_and_zone() {
        let mut ports = MockPorts::default();
        ports
            .insight
            .expect_position_history()
            .withf(|_, request| {
                request.timezone == Tz::America__New_York
                    && request.date.to_string() == "2024-03-10"
            })
            .times(1)
            .return_once(|_, request| {
                let window: PositionWindow =
                    local_day_window(request.date, request.timezone).expect("window");
                Ok(PositionHistory {
                    positions: vec![Position {
                        device_id: RemoteDeviceId::new(9).expect("id"),
                        fix_time: window.start,
                        latitude: 40.7,
                        longitude: -74.0,
                        speed: 0.0,
                        course: 0.0,
                        altitude: 10.0,
                    }],
                    window,
                })
            });

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::get().uri(
                "/api/v1/history/positions?imei=356321089455217&date=2024-03-10&timezone=America/New_York",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["from"], "2024-03-10T05:00:00Z");
        assert_eq!(body["to"], "2024-03-11T04:00:00Z");
        assert_eq!(body["positions"].as_array().map(Vec::len), Some(1));
    }

    #[actix_web::test]
    async fn unknown_timezone_is_a_bad_request() {
        let mut ports = MockPorts::default();
        ports.insight.expect_position_history().times(0);

        let (status, body) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::get().uri(
                "/api/v1/history/positions?imei=356321089455217&date=2024-03-10&timezone=Nowhere/Land",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"]["code"], "unknown_timezone");
    }

    #[actix_web::test]
    async fn foreign_device_is_forbidden() {
        let mut ports = MockPorts::default();
        ports
            .insight
            .expect_position_history()
            .return_once(|_, _| Err(Error::ownership_mismatch("device belongs to another user")));

        let (status, _) = call_api(
            ports,
            Some(subscriber()),
            test::TestRequest::get().uri(
                "/api/v1/history/positions?imei=356321089455217&date=2024-03-10&timezone=UTC",
            ),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
