//! Server construction and middleware wiring.

mod config;
mod state_builders;

pub use config::{ServerConfig, SettingsError, load_server_config};
pub use state_builders::{AdapterBuildError, AppPorts, build_app_ports};

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};

use fleet_sync::Trace;
#[cfg(debug_assertions)]
use fleet_sync::doc::ApiDoc;
use fleet_sync::domain::AuthorizationGate;
use fleet_sync::inbound::http::health::{HealthState, live, ready};
use fleet_sync::inbound::http::state::HttpState;
use fleet_sync::inbound::http::{AuthGate, configure_api};
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

fn build_app(
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
    gate: AuthorizationGate,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let api = web::scope("/api/v1")
        .wrap(AuthGate::new(gate))
        .configure(configure_api);

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));

    app
}

/// Bind the HTTP server.
///
/// # Errors
///
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: &ServerConfig,
    ports: AppPorts,
) -> std::io::Result<Server> {
    let AppPorts { http_state, gate } = ports;
    let http_state = web::Data::new(http_state);
    let server_health_state = health_state.clone();

    let server = HttpServer::new(move || {
        build_app(
            server_health_state.clone(),
            http_state.clone(),
            gate.clone(),
        )
    })
    .bind(config.bind_addr)?
    .run();

    health_state.mark_ready();
    Ok(server)
}
