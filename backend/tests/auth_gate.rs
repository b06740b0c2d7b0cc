//! End-to-end checks of the authorization gate in front of the API scope,
//! using in-memory doubles for every remote system.

mod support;

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{App, test, web};
use serde_json::{Value, json};
use zeroize::Zeroizing;

use fleet_sync::Trace;
use fleet_sync::domain::{
    AuthGatePolicy, AuthorizationGate, EmailAddress, RouteAllowlist, SubjectId, TRACE_ID_HEADER,
};
use fleet_sync::inbound::http::{ADMIN_KEY_HEADER, AuthGate, configure_api};
use fleet_sync::test_support::{StaticIdentityVerifier, StoreOp, TrackingOp};

use support::World;

const ADMIN_KEY: &str = "s3cret";

fn gate(verifier: &Arc<StaticIdentityVerifier>) -> AuthorizationGate {
    AuthorizationGate::new(
        Arc::clone(verifier) as Arc<dyn fleet_sync::domain::ports::IdentityVerifier>,
        AuthGatePolicy {
            admin_key: Some(Zeroizing::new(ADMIN_KEY.to_owned())),
            superadmin_email: None,
            allowlist: RouteAllowlist::new(["/api/v1/routing/*"]),
        },
    )
}

fn verifier() -> Arc<StaticIdentityVerifier> {
    let verifier = Arc::new(StaticIdentityVerifier::new());
    verifier.accept(
        "ada-token",
        SubjectId::new("uid-ada").expect("subject"),
        Some(EmailAddress::new("ada@example.com").expect("email")),
    );
    verifier
}

macro_rules! api {
    ($world:expr, $verifier:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($world.http_state()))
                .wrap(Trace)
                .service(
                    web::scope("/api/v1")
                        .wrap(AuthGate::new(gate($verifier)))
                        .configure(configure_api),
                ),
        )
        .await
    };
}

async fn json_body(response: actix_web::dev::ServiceResponse) -> Value {
    let body = test::read_body(response).await;
    serde_json::from_slice(&body).expect("json body")
}

#[actix_web::test]
async fn malformed_credential_is_rejected_before_any_backend_call() {
    let world = World::new();
    let verifier = verifier();
    let app = api!(world, &verifier);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/user/sync")
            .insert_header(("Authorization", "Token ada-token"))
            .set_json(json!({ "country_code": "KE" }))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key(TRACE_ID_HEADER));
    let body = json_body(response).await;
    assert_eq!(body["code"], "malformed_credential");
    assert_eq!(verifier.calls(), 0);
    assert_eq!(world.store.calls(StoreOp::FindUserBySubject), 0);
    assert_eq!(world.tracking.calls(TrackingOp::CreateUser), 0);
}

#[actix_web::test]
async fn unknown_token_is_unauthorized() {
    let world = World::new();
    let verifier = verifier();
    let app = api!(world, &verifier);

    let response = test::call_service(
        &app,
        test::TestRequest::get()
            .uri("/api/v1/device/status?imei=356938035643809")
            .insert_header(("Authorization", "Bearer forged"))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = json_body(response).await;
    assert_eq!(body["code"], "unauthorized");
    assert_eq!(verifier.calls(), 1);
}

#[actix_web::test]
async fn bearer_sync_creates_then_reconciles() {
    let world = World::new();
    let verifier = verifier();
    let app = api!(world, &verifier);
    let sync = || {
        test::TestRequest::post()
            .uri("/api/v1/user/sync")
            .insert_header(("Authorization", "Bearer ada-token"))
            .set_json(json!({ "country_code": "KE", "name": "Ada" }))
            .to_request()
    };

    let first = test::call_service(&app, sync()).await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let created = json_body(first).await;
    let second = test::call_service(&app, sync()).await;
    assert_eq!(second.status(), StatusCode::OK);
    let reconciled = json_body(second).await;

    assert_eq!(created["server_url"], "https://ke.track.example");
    assert_eq!(created, reconciled);
    assert_eq!(world.store.users().len(), 1);
    assert_eq!(world.tracking.calls(TrackingOp::CreateUser), 1);
}

#[actix_web::test]
async fn admin_key_creates_inventory_records() {
    let world = World::new();
    let verifier = verifier();
    let iccid = fleet_sync::domain::Iccid::parse("8925402000000000017").expect("iccid");
    world
        .sims
        .seed_sim(&iccid, fleet_sync::domain::ports::SimState::Disabled, None);
    let app = api!(world, &verifier);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/inventory/createRecord")
            .insert_header((ADMIN_KEY_HEADER, ADMIN_KEY))
            .set_json(json!({
                "server_url": "https://ke.track.example",
                "imei": "356938035643809",
                "iccid": "8925402000000000017",
                "preloaded_months": 3
            }))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(verifier.calls(), 0);
    let imei = fleet_sync::domain::Imei::parse("356938035643809").expect("imei");
    let row = world.store.device(&imei).expect("device stored");
    assert_eq!(row.preloaded_months.get(), 3);
    assert_eq!(row.assigned_user, None);
}

#[actix_web::test]
async fn wrong_admin_key_falls_back_to_bearer_checks() {
    let world = World::new();
    let verifier = verifier();
    let app = api!(world, &verifier);

    let response = test::call_service(
        &app,
        test::TestRequest::post()
            .uri("/api/v1/inventory/createRecord")
            .insert_header((ADMIN_KEY_HEADER, "guess"))
            .set_json(json!({}))
            .to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn routing_lookup_is_public() {
    let world = World::new();
    let verifier = verifier();
    let app = api!(world, &verifier);

    let response = test::call_service(
        &app,
        test::TestRequest::get().uri("/api/v1/routing/KE").to_request(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({ "country_code": "KE", "server_url": "https://ke.track.example" })
    );
    assert_eq!(verifier.calls(), 0);
}
