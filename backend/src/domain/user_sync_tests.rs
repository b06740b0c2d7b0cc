//! Tests for the user sync coordinator.

use std::sync::Arc;

use serde_json::{Map, json};

use super::*;
use crate::domain::ErrorCode;
use crate::domain::ports::{
    MockRoutingRepository, MockTrackingClient, MockUserRepository, RecordStoreError,
};
use crate::domain::{CallerRole, RemoteUserId};

type Service = UserSyncService<MockUserRepository, MockRoutingRepository, MockTrackingClient>;

const EMAIL: &str = "rider@example.com";

fn server() -> ServerUrl {
    ServerUrl::parse("https://eu.track.example").expect("server url")
}

fn caller() -> CallerIdentity {
    CallerIdentity::verified(
        SubjectId::new("uid-42").expect("subject"),
        EmailAddress::new(EMAIL).expect("email"),
        CallerRole::Subscriber,
    )
}

fn stored_user() -> UserRecord {
    UserRecord {
        id: LocalUserId::new(7).expect("id"),
        email: EmailAddress::new(EMAIL).expect("email"),
        subject: SubjectId::new("uid-42").expect("subject"),
        remote_user_id: RemoteUserId::new(300).expect("id"),
        server_url: server(),
        name: Some("Rider".to_owned()),
        phone: Some("+254700000001".to_owned()),
        session_token: None,
        push_token: None,
        country_code: None,
    }
}

fn matching_remote(id: i64) -> RemoteUser {
    let mut attributes = Map::new();
    attributes.insert(SUBJECT_ATTRIBUTE.to_owned(), json!("uid-42"));
    RemoteUser {
        id: RemoteUserId::new(id).expect("id"),
        name: "Rider".to_owned(),
        email: EMAIL.to_owned(),
        phone: Some("+254700000001".to_owned()),
        attributes,
        passthrough: Map::new(),
    }
}

fn service(
    users: MockUserRepository,
    routing: MockRoutingRepository,
    tracking: MockTrackingClient,
) -> Service {
    UserSyncService::new(Arc::new(users), Arc::new(routing), Arc::new(tracking))
}

fn sync_request(name: Option<&str>) -> SyncUserRequest {
    SyncUserRequest {
        target: SyncTarget::Country(CountryCode::parse("KE").expect("country")),
        name: name.map(str::to_owned),
        phone: Some("+254700000001".to_owned()),
    }
}

fn routing_to_server() -> MockRoutingRepository {
    let mut routing = MockRoutingRepository::new();
    routing
        .expect_server_for_country()
        .times(1)
        .return_once(|_| Ok(Some(server())));
    routing
}

#[tokio::test]
async fn sync_provisions_remote_then_local() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .times(1)
        .return_once(|_| Ok(Vec::new()));
    users
        .expect_insert()
        .withf(|record| {
            record.remote_user_id.get() == 300
                && record.country_code.as_ref().map(CountryCode::as_str) == Some("KE")
                && record.name.is_none()
        })
        .times(1)
        .return_once(|_| {
            let mut row = stored_user();
            row.name = None;
            Ok(row)
        });
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_create_user()
        .withf(|_, draft| {
            draft.name == EMAIL && draft.password.as_str() == "cmlkZXJAZXhhbXBsZS5jb20"
        })
        .times(1)
        .return_once(|_, _| Ok(matching_remote(300)));

    let outcome = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(None))
        .await
        .expect("sync succeeds");

    assert!(outcome.created);
    assert_eq!(outcome.profile.server_url, server());
}

#[tokio::test]
async fn unknown_country_fails_before_any_remote_call() {
    let mut routing = MockRoutingRepository::new();
    routing
        .expect_server_for_country()
        .times(1)
        .return_once(|_| Ok(None));

    let err = service(MockUserRepository::new(), routing, MockTrackingClient::new())
        .sync(&caller(), sync_request(None))
        .await
        .expect_err("routing fails");

    assert_eq!(err.code(), ErrorCode::RoutingNotFound);
}

#[tokio::test]
async fn duplicate_remote_email_requires_linking() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(Vec::new()));
    users.expect_insert().times(0);
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_create_user()
        .return_once(|_, _| Err(TrackingClientError::duplicate("email taken")));

    let err = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(Some("Rider")))
        .await
        .expect_err("linking required");

    assert_eq!(err.code(), ErrorCode::LinkingRequired);
}

#[tokio::test]
async fn failed_insert_deletes_remote_user() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(Vec::new()));
    users
        .expect_insert()
        .return_once(|_| Err(RecordStoreError::connection("pool timed out")));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_create_user()
        .return_once(|_, _| Ok(matching_remote(301)));
    tracking
        .expect_delete_user()
        .withf(|_, id| id.get() == 301)
        .times(1)
        .return_once(|_, _| Ok(()));

    let err = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(Some("Rider")))
        .await
        .expect_err("persistence fails");

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    let details = err.details().expect("rollback details");
    assert_eq!(details["failedStep"], "persist local user");
    assert_eq!(details["rollback"]["complete"], true);
    assert_eq!(details["rollback"]["actions"][0]["action"], "delete remote user");
}

#[tokio::test]
async fn in_sync_user_issues_no_remote_mutation() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    users.expect_update_profile().times(0);
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_get_user()
        .times(1)
        .return_once(|_, _| Ok(matching_remote(300)));
    tracking.expect_update_user().times(0);
    tracking.expect_create_user().times(0);

    let outcome = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(Some("Rider")))
        .await
        .expect("sync succeeds");

    assert!(!outcome.created);
    assert_eq!(outcome.profile.name.as_deref(), Some("Rider"));
}

#[tokio::test]
async fn drifted_remote_user_is_updated_with_merged_state() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    let mut tracking = MockTrackingClient::new();
    tracking.expect_get_user().return_once(|_, _| {
        let mut remote = matching_remote(300);
        remote.name = "Old name".to_owned();
        remote.passthrough.insert("map".to_owned(), json!("osm"));
        Ok(remote)
    });
    tracking
        .expect_update_user()
        .withf(|_, user, password| {
            user.name == "Rider"
                && user.passthrough.get("map") == Some(&json!("osm"))
                && password.is_none()
        })
        .times(1)
        .returning(|_, user, _| Ok(user.clone()));

    let outcome = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(Some("Rider")))
        .await
        .expect("sync succeeds");

    assert!(!outcome.created);
}

#[tokio::test]
async fn email_change_replaces_and_restores_remote_secret() {
    const NEW_EMAIL: &str = "rider.new@example.com";
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    users
        .expect_update_profile()
        .withf(|_, changes| changes.email.as_str() == NEW_EMAIL)
        .times(1)
        .return_once(|_, _| Err(RecordStoreError::query("deadlock")));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_get_user()
        .return_once(|_, _| Ok(matching_remote(300)));
    let mut sequence = mockall::Sequence::new();
    tracking
        .expect_update_user()
        .withf(|_, user, password| {
            user.email == NEW_EMAIL
                && password.as_ref().map(|secret| secret.as_str())
                    == Some("cmlkZXIubmV3QGV4YW1wbGUuY29t")
        })
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, user, _| Ok(user.clone()));
    tracking
        .expect_update_user()
        .withf(|_, user, password| {
            user.email == EMAIL
                && password.as_ref().map(|secret| secret.as_str())
                    == Some("cmlkZXJAZXhhbXBsZS5jb20")
        })
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, user, _| Ok(user.clone()));
    let caller = CallerIdentity::verified(
        SubjectId::new("uid-42").expect("subject"),
        EmailAddress::new(NEW_EMAIL).expect("email"),
        CallerRole::Subscriber,
    );

    let err = service(users, routing_to_server(), tracking)
        .sync(&caller, sync_request(Some("Rider")))
        .await
        .expect_err("persistence fails");

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert_eq!(err.details().expect("details")["rollback"]["complete"], true);
}

#[tokio::test]
async fn missing_remote_user_is_recreated_and_rebound() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    users
        .expect_update_remote_user_id()
        .withf(|id, remote| id.get() == 7 && remote.get() == 555)
        .times(1)
        .return_once(|_, _| Ok(()));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_get_user()
        .return_once(|_, _| Err(TrackingClientError::not_found("user 300")));
    tracking
        .expect_create_user()
        .times(1)
        .return_once(|_, _| Ok(matching_remote(555)));

    let outcome = service(users, routing_to_server(), tracking)
        .sync(&caller(), sync_request(Some("Rider")))
        .await
        .expect("self-heal succeeds");

    assert!(!outcome.created);
}

#[tokio::test]
async fn duplicate_subject_rows_are_an_integrity_violation() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user(), stored_user()]));

    let err = service(users, routing_to_server(), MockTrackingClient::new())
        .sync(&caller(), sync_request(None))
        .await
        .expect_err("integrity violation");

    assert_eq!(err.code(), ErrorCode::IntegrityViolation);
}

#[tokio::test]
async fn admin_override_cannot_sync() {
    let err = service(
        MockUserRepository::new(),
        MockRoutingRepository::new(),
        MockTrackingClient::new(),
    )
    .sync(&CallerIdentity::admin_override(), sync_request(None))
    .await
    .expect_err("admin rejected");

    assert_eq!(err.code(), ErrorCode::Forbidden);
}

#[tokio::test]
async fn update_rejects_mismatched_remote_identifiers() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_id()
        .return_once(|_| Ok(Some(stored_user())));

    let err = service(users, MockRoutingRepository::new(), MockTrackingClient::new())
        .update_profile(
            &caller(),
            UpdateUserRequest {
                local_id: LocalUserId::new(7).expect("id"),
                remote_id: RemoteUserId::new(999).expect("id"),
                server_url: server(),
                name: Some("New".to_owned()),
                phone: None,
            },
        )
        .await
        .expect_err("mismatch");

    assert_eq!(err.code(), ErrorCode::OwnershipMismatch);
}

#[tokio::test]
async fn update_restores_remote_when_local_write_fails() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_id()
        .return_once(|_| Ok(Some(stored_user())));
    users
        .expect_update_profile()
        .return_once(|_, _| Err(RecordStoreError::query("deadlock")));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_get_user()
        .return_once(|_, _| Ok(matching_remote(300)));
    let mut sequence = mockall::Sequence::new();
    tracking
        .expect_update_user()
        .withf(|_, user, _| user.name == "Renamed")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, user, _| Ok(user.clone()));
    tracking
        .expect_update_user()
        .withf(|_, user, _| user.name == "Rider")
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, user, _| Ok(user.clone()));

    let err = service(users, MockRoutingRepository::new(), tracking)
        .update_profile(
            &caller(),
            UpdateUserRequest {
                local_id: LocalUserId::new(7).expect("id"),
                remote_id: RemoteUserId::new(300).expect("id"),
                server_url: server(),
                name: Some("Renamed".to_owned()),
                phone: None,
            },
        )
        .await
        .expect_err("persistence fails");

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert_eq!(err.details().expect("details")["failedStep"], "update local user");
}

#[tokio::test]
async fn delete_recreates_remote_user_when_local_delete_fails() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_id()
        .return_once(|_| Ok(Some(stored_user())));
    users
        .expect_delete()
        .return_once(|_| Err(RecordStoreError::query("fk violation")));
    users
        .expect_update_remote_user_id()
        .withf(|_, remote| remote.get() == 777)
        .times(1)
        .return_once(|_, _| Ok(()));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_delete_user()
        .times(1)
        .return_once(|_, _| Ok(()));
    tracking
        .expect_create_user()
        .times(1)
        .return_once(|_, _| Ok(matching_remote(777)));

    let err = service(users, MockRoutingRepository::new(), tracking)
        .delete(
            &caller(),
            DeleteUserRequest {
                local_id: LocalUserId::new(7).expect("id"),
                remote_id: RemoteUserId::new(300).expect("id"),
                server_url: server(),
            },
        )
        .await
        .expect_err("persistence fails");

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    assert_eq!(err.details().expect("details")["rollback"]["complete"], true);
}

#[tokio::test]
async fn session_token_is_issued_with_derived_secret_and_stored() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    users
        .expect_update_session_token()
        .withf(|id, token| id.get() == 7 && token == "tok-1")
        .times(1)
        .return_once(|_, _| Ok(()));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_issue_session_token()
        .withf(|_, email, password| {
            email.as_str() == EMAIL && password == "cmlkZXJAZXhhbXBsZS5jb20"
        })
        .times(1)
        .return_once(|_, _, _| Ok("tok-1".to_owned()));

    let token = service(users, MockRoutingRepository::new(), tracking)
        .issue_session_token(&caller(), None)
        .await
        .expect("token issued");

    assert_eq!(token, "tok-1");
}

#[tokio::test]
async fn unstored_session_token_reports_the_failed_step() {
    let mut users = MockUserRepository::new();
    users
        .expect_find_by_subject()
        .return_once(|_| Ok(vec![stored_user()]));
    users
        .expect_update_session_token()
        .times(1)
        .return_once(|_, _| Err(RecordStoreError::connection("pool exhausted")));
    let mut tracking = MockTrackingClient::new();
    tracking
        .expect_issue_session_token()
        .times(1)
        .return_once(|_, _, _| Ok("tok-1".to_owned()));

    let err = service(users, MockRoutingRepository::new(), tracking)
        .issue_session_token(&caller(), None)
        .await
        .expect_err("store fails");

    assert_eq!(err.code(), ErrorCode::PersistenceFailed);
    let details = err.details().expect("details");
    assert_eq!(details["failedStep"], "store session token");
    assert!(details.get("rollback").is_none());
}

#[tokio::test]
async fn blank_push_token_is_rejected() {
    let err = service(
        MockUserRepository::new(),
        MockRoutingRepository::new(),
        MockTrackingClient::new(),
    )
    .register_push_token(&caller(), "  ".to_owned())
    .await
    .expect_err("invalid");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}
