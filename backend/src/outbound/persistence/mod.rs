//! PostgreSQL persistence adapters.
//!
//! Repositories translate between Diesel rows and domain records and carry no
//! business rules. Rows that fail domain validation surface as query errors.
//!
//! ```ignore
//! use fleet_sync::outbound::persistence::{DbPool, DieselUserRepository, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/fleet")).await?;
//! let users = DieselUserRepository::new(pool.clone());
//! ```

mod diesel_device_repository;
mod diesel_routing_repository;
mod diesel_user_repository;
mod error_mapping;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_device_repository::DieselDeviceRepository;
pub use diesel_routing_repository::{DieselRoutingRepository, DieselStoreProbe};
pub use diesel_user_repository::DieselUserRepository;
pub use migrations::{MIGRATIONS, MigrationError, run_pending_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
