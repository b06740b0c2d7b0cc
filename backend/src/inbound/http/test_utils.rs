//! Test helpers for inbound HTTP handlers.

use std::sync::Arc;

use actix_web::dev::Service;
use actix_web::http::StatusCode;
use actix_web::{App, HttpMessage, test, web};
use serde_json::Value;

use super::state::HttpState;
use crate::domain::ports::{
    MockConnectivityCommand, MockDeviceAssignmentCommand, MockDeviceInsightQuery,
    MockInventoryCommand, MockPlatformQuery, MockUserSyncCommand,
};
use crate::domain::{CallerIdentity, CallerRole, EmailAddress, SubjectId};

/// Driving-port mocks; unset expectations fail the test when called.
#[derive(Default)]
pub struct MockPorts {
    pub users: MockUserSyncCommand,
    pub assignments: MockDeviceAssignmentCommand,
    pub connectivity: MockConnectivityCommand,
    pub inventory: MockInventoryCommand,
    pub insight: MockDeviceInsightQuery,
    pub platform: MockPlatformQuery,
}

impl MockPorts {
    pub fn into_state(self) -> HttpState {
        HttpState {
            users: Arc::new(self.users),
            assignments: Arc::new(self.assignments),
            connectivity: Arc::new(self.connectivity),
            inventory: Arc::new(self.inventory),
            insight: Arc::new(self.insight),
            platform: Arc::new(self.platform),
        }
    }
}

pub fn subscriber() -> CallerIdentity {
    CallerIdentity::verified(
        SubjectId::new("uid-ada").expect("subject"),
        EmailAddress::new("ada@example.com").expect("email"),
        CallerRole::Subscriber,
    )
}

/// Send `request` through the API scope with `caller` attached, returning the
/// status and the decoded JSON body (`Null` when empty).
pub async fn call_api(
    ports: MockPorts,
    caller: Option<CallerIdentity>,
    request: test::TestRequest,
) -> (StatusCode, Value) {
    let app = test::init_service(
        App::new()
            .app_data(web::Data::new(ports.into_state()))
            .wrap_fn(move |req, srv| {
                if let Some(caller) = caller.clone() {
                    req.extensions_mut().insert(caller);
                }
                srv.call(req)
            })
            .service(web::scope("/api/v1").configure(super::configure_api)),
    )
    .await;
    let response = test::call_service(&app, request.to_request()).await;
    let status = response.status();
    let body = test::read_body(response).await;
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).expect("json body")
    };
    (status, json)
}
