//! HTTP inbound adapter exposing the REST endpoints under `/api/v1`.

pub mod auth;
pub mod devices;
pub mod error;
pub mod health;
pub mod history;
pub mod inventory;
pub mod platform;
pub mod state;
#[cfg(test)]
pub mod test_utils;
pub mod users;
pub(crate) mod validation;

use actix_web::web;

pub use auth::{ADMIN_KEY_HEADER, AuthGate, Caller};
pub use error::ApiResult;

use crate::domain::Error;

/// Register every `/api/v1` handler on the enclosing scope.
///
/// Body and query decoding failures are reported as `invalid_request`.
pub fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| Error::invalid_request(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| Error::invalid_request(err.to_string()).into()),
    )
    .service(users::sync_user)
    .service(users::update_user)
    .service(users::delete_user)
    .service(users::register_push_token)
    .service(users::issue_session_token)
    .service(devices::link_device)
    .service(devices::enable_device)
    .service(devices::disable_device)
    .service(devices::device_status)
    .service(devices::device_usage)
    .service(history::position_history)
    .service(inventory::create_record)
    .service(platform::lookup_route)
    .service(platform::server_status);
}
