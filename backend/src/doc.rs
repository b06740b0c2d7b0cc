//! OpenAPI documentation.
//!
//! [`ApiDoc`] registers every `/api/v1` handler, the health probes and the
//! two accepted credentials: an identity-provider bearer token or the
//! operator `X-Admin-Key`. Swagger UI serves it in debug builds.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{Error, ErrorCode};
use crate::inbound::http::{devices, history, inventory, platform, users};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "BearerToken",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Identity-provider ID token."))
                    .build(),
            ),
        );
        components.add_security_scheme(
            "AdminKey",
            SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                "X-Admin-Key",
                "Operator key; grants administrative access.",
            ))),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Fleet sync API",
        description = "Keeps tracking-server accounts, SIM state and local records consistent."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("BearerToken" = []), ("AdminKey" = [])),
    paths(
        users::sync_user,
        users::update_user,
        users::delete_user,
        users::register_push_token,
        users::issue_session_token,
        devices::link_device,
        devices::enable_device,
        devices::disable_device,
        devices::device_status,
        devices::device_usage,
        history::position_history,
        inventory::create_record,
        platform::lookup_route,
        platform::server_status,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(Error, ErrorCode)),
    tags(
        (name = "users", description = "Account provisioning and profile sync"),
        (name = "devices", description = "Device assignment, connectivity and telemetry"),
        (name = "inventory", description = "Operator inventory intake"),
        (name = "platform", description = "Routing and dependency status"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
