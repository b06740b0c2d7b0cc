//! Service entry point: loads settings, applies migrations and serves the
//! HTTP API.

mod server;

use actix_web::web;
use color_eyre::eyre::{Result, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use fleet_sync::inbound::http::health::HealthState;
use fleet_sync::outbound::persistence::{DbPool, PoolConfig, run_pending_migrations};

use server::{build_app_ports, create_server, load_server_config};

#[actix_web::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let config = load_server_config().wrap_err("invalid configuration")?;

    if config.run_migrations {
        run_pending_migrations(&config.database_url)
            .await
            .wrap_err("database migrations failed")?;
    }

    let pool_config = PoolConfig::new(config.database_url.as_str())
        .with_checkout_timeout(config.remote_timeout);
    let pool = DbPool::new(pool_config)
        .await
        .wrap_err("failed to build database pool")?;
    let ports = build_app_ports(&config, &pool).wrap_err("failed to build remote adapters")?;

    let health_state = web::Data::new(HealthState::new());
    let server = create_server(health_state.clone(), &config, ports)
        .wrap_err_with(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    let result = server.await;
    health_state.mark_unhealthy();
    result.wrap_err("server terminated with an error")
}
