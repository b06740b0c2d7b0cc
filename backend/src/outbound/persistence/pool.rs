//! Shared PostgreSQL pool behind every Diesel repository.
//!
//! Connections open lazily, so the service starts without touching the
//! database and a dead database shows up as a checkout failure on the first
//! request that needs a row.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use tracing::debug;
use zeroize::Zeroizing;

/// A checked-out connection; returned to the pool on drop.
pub type PgConnection<'a> = PooledConnection<'a, AsyncPgConnection>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// No connection became available before the checkout timeout.
    #[error("database checkout failed: {message}")]
    Checkout { message: String },

    /// The pool rejected its own configuration.
    #[error("database pool could not be built: {message}")]
    Build { message: String },
}

impl PoolError {
    pub fn checkout(message: impl Into<String>) -> Self {
        Self::Checkout {
            message: message.into(),
        }
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
        }
    }
}

/// Where the pool connects and how long a repository call may wait for a
/// connection. Not `Debug`: the URL may carry credentials.
#[derive(Clone)]
pub struct PoolConfig {
    database_url: Zeroizing<String>,
    max_connections: u32,
    checkout_timeout: Duration,
}

impl PoolConfig {
    const MAX_CONNECTIONS: u32 = 10;
    const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: Zeroizing::new(database_url.into()),
            max_connections: Self::MAX_CONNECTIONS,
            checkout_timeout: Self::CHECKOUT_TIMEOUT,
        }
    }

    /// Local writes follow remote calls, so the bootstrap aligns this with
    /// the remote call timeout.
    pub fn with_checkout_timeout(mut self, timeout: Duration) -> Self {
        self.checkout_timeout = timeout;
        self
    }
}

#[derive(Clone)]
pub struct DbPool {
    inner: Pool<AsyncPgConnection>,
}

impl DbPool {
    /// # Errors
    ///
    /// Returns [`PoolError::Build`] when bb8 rejects the configuration.
    pub async fn new(config: PoolConfig) -> Result<Self, PoolError> {
        let manager =
            AsyncDieselConnectionManager::<AsyncPgConnection>::new(config.database_url.as_str());
        let inner = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(None)
            .connection_timeout(config.checkout_timeout)
            .build(manager)
            .await
            .map_err(|err| PoolError::build(err.to_string()))?;
        debug!(
            max_connections = config.max_connections,
            checkout_timeout = ?config.checkout_timeout,
            "database pool ready"
        );
        Ok(Self { inner })
    }

    /// # Errors
    ///
    /// Returns [`PoolError::Checkout`] when the database is unreachable or
    /// every connection stays busy past the checkout timeout.
    pub async fn get(&self) -> Result<PgConnection<'_>, PoolError> {
        self.inner
            .get()
            .await
            .map_err(|err| PoolError::checkout(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_timeout_follows_the_bootstrap() {
        let config = PoolConfig::new("postgres://fleet@localhost/fleet")
            .with_checkout_timeout(Duration::from_secs(12));

        assert_eq!(config.max_connections, 10);
        assert_eq!(config.checkout_timeout, Duration::from_secs(12));
        assert_eq!(config.database_url.as_str(), "postgres://fleet@localhost/fleet");
    }

    #[tokio::test]
    async fn unreachable_database_fails_at_checkout_not_startup() {
        let config = PoolConfig::new("postgres://fleet@127.0.0.1:9/fleet")
            .with_checkout_timeout(Duration::from_millis(200));
        let pool = DbPool::new(config).await.expect("lazy pool builds");

        let err = pool.get().await.err().expect("checkout fails");

        assert!(matches!(err, PoolError::Checkout { .. }));
    }
}
