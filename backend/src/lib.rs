//! Multi-system synchronisation backend.
//!
//! Keeps regional tracking-server accounts, SIM connectivity state and the
//! local record store consistent. The crate follows a hexagonal layout:
//! [`domain`] holds the synchronisation core and its ports, [`outbound`] the
//! adapters for remote systems and PostgreSQL, and [`inbound`] the HTTP
//! surface.

pub mod doc;
pub mod domain;
pub mod inbound;
pub mod middleware;
pub mod outbound;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

/// Public OpenAPI surface used by Swagger UI and tooling.
pub use doc::ApiDoc;
pub use middleware::Trace;
