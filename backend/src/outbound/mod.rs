//! Outbound adapters implementing the driven ports.
//!
//! - **traccar**: tracking servers over their REST API
//! - **simbase**: SIM connectivity provider
//! - **firebase**: identity token verification
//! - **persistence**: PostgreSQL record store via Diesel
//!
//! Adapters translate between wire or row formats and domain types. They
//! contain no business rules.

pub mod firebase;
pub mod persistence;
pub mod simbase;
pub mod traccar;
