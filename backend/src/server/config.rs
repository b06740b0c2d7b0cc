//! Application settings and the validated server configuration built from
//! them.
//!
//! [`AppSettings`] is loaded by OrthoConfig from CLI flags, `FLEET_*`
//! environment variables and configuration files. [`ServerConfig::from_settings`]
//! checks required keys and turns raw strings into typed values.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use fleet_sync::domain::{AuthGatePolicy, EmailAddress, RouteAllowlist, ServerUrl};
use fleet_sync::outbound::traccar::TraccarCredentials;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_CONNECTIVITY_BASE_URL: &str = "https://api.simbase.com/v1/";
const DEFAULT_PUBLIC_ROUTES: &str = "/api/v1/routing/*";
const MIN_REMOTE_TIMEOUT_SECS: u64 = 1;
const MAX_REMOTE_TIMEOUT_SECS: u64 = 9;

/// Raw settings as loaded from flags, environment and files.
#[derive(Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "FLEET")]
pub struct AppSettings {
    /// PostgreSQL connection URL.
    pub database_url: Option<String>,
    /// Listen address, `host:port`.
    pub bind_addr: Option<String>,
    /// Administrator account on every tracking server.
    pub tracking_admin_user: Option<String>,
    pub tracking_admin_password: Option<String>,
    /// Tracking server used when a request names none.
    pub default_server_url: Option<String>,
    pub connectivity_base_url: Option<String>,
    pub connectivity_api_key: Option<String>,
    /// Identity-provider project that issues bearer tokens.
    pub identity_project_id: Option<String>,
    /// Operator key accepted in `X-Admin-Key`; disabled when unset.
    pub admin_key: Option<String>,
    /// Email granted cross-owner read access.
    pub superadmin_email: Option<String>,
    /// Comma-separated routes that skip authentication.
    pub public_routes: Option<String>,
    /// Ceiling for every remote call, clamped to 1..=9 seconds.
    #[ortho_config(default = 5)]
    pub remote_timeout_secs: u64,
    /// Apply embedded migrations before serving.
    #[ortho_config(default = true)]
    pub run_migrations: bool,
}

impl std::fmt::Debug for AppSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppSettings")
            .field("bind_addr", &self.bind_addr)
            .field("tracking_admin_user", &self.tracking_admin_user)
            .field("default_server_url", &self.default_server_url)
            .field("connectivity_base_url", &self.connectivity_base_url)
            .field("identity_project_id", &self.identity_project_id)
            .field("superadmin_email", &self.superadmin_email)
            .field("public_routes", &self.public_routes)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .field("run_migrations", &self.run_migrations)
            .finish_non_exhaustive()
    }
}

/// Startup configuration failures.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(String),
    #[error("missing required setting `{key}`")]
    Missing { key: &'static str },
    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn required(value: Option<String>, key: &'static str) -> Result<String, SettingsError> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
        .ok_or(SettingsError::Missing { key })
}

fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_owned())
        .filter(|raw| !raw.is_empty())
}

fn invalid(key: &'static str, reason: impl ToString) -> SettingsError {
    SettingsError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

/// Validated configuration consumed by the server bootstrap.
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Zeroizing<String>,
    pub run_migrations: bool,
    pub tracking_credentials: TraccarCredentials,
    pub default_server: Option<ServerUrl>,
    pub connectivity_base_url: Url,
    pub connectivity_api_key: Zeroizing<String>,
    pub identity_project_id: String,
    pub auth_policy: AuthGatePolicy,
    pub remote_timeout: Duration,
}

impl ServerConfig {
    /// Validate raw settings.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::Missing`] when a required key is absent and
    /// [`SettingsError::Invalid`] when a value cannot be parsed.
    pub fn from_settings(settings: AppSettings) -> Result<Self, SettingsError> {
        let bind_addr = settings
            .bind_addr
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse::<SocketAddr>()
            .map_err(|err| invalid("bind_addr", err))?;
        let database_url = Zeroizing::new(required(settings.database_url, "database_url")?);
        let tracking_credentials = TraccarCredentials {
            user: required(settings.tracking_admin_user, "tracking_admin_user")?,
            password: Zeroizing::new(required(
                settings.tracking_admin_password,
                "tracking_admin_password",
            )?),
        };
        let default_server = optional(settings.default_server_url)
            .map(|raw| ServerUrl::parse(&raw).map_err(|err| invalid("default_server_url", err)))
            .transpose()?;
        let connectivity_base_url = optional(settings.connectivity_base_url)
            .as_deref()
            .unwrap_or(DEFAULT_CONNECTIVITY_BASE_URL)
            .parse::<Url>()
            .map_err(|err| invalid("connectivity_base_url", err))?;
        let connectivity_api_key =
            Zeroizing::new(required(settings.connectivity_api_key, "connectivity_api_key")?);
        let identity_project_id = required(settings.identity_project_id, "identity_project_id")?;
        let superadmin_email = optional(settings.superadmin_email)
            .map(|raw| EmailAddress::new(raw).map_err(|err| invalid("superadmin_email", err)))
            .transpose()?;
        let public_routes = optional(settings.public_routes);
        let allowlist = RouteAllowlist::new(
            public_routes
                .as_deref()
                .unwrap_or(DEFAULT_PUBLIC_ROUTES)
                .split(','),
        );

        Ok(Self {
            bind_addr,
            database_url,
            run_migrations: settings.run_migrations,
            tracking_credentials,
            default_server,
            connectivity_base_url,
            connectivity_api_key,
            identity_project_id,
            auth_policy: AuthGatePolicy {
                admin_key: optional(settings.admin_key).map(Zeroizing::new),
                superadmin_email,
                allowlist,
            },
            remote_timeout: Duration::from_secs(
                settings
                    .remote_timeout_secs
                    .clamp(MIN_REMOTE_TIMEOUT_SECS, MAX_REMOTE_TIMEOUT_SECS),
            ),
        })
    }
}

/// Load settings from the process arguments and environment.
///
/// # Errors
///
/// Returns [`SettingsError`] when loading or validation fails.
pub fn load_server_config() -> Result<ServerConfig, SettingsError> {
    let settings = AppSettings::load_from_iter(std::env::args_os())
        .map_err(|err| SettingsError::Load(err.to_string()))?;
    ServerConfig::from_settings(settings)
}
