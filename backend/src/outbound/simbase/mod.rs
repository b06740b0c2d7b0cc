//! Connectivity provider outbound adapter.
//!
//! Implements `ConnectivityClient` against the Simbase REST API.

mod dto;
mod http_client;

pub use http_client::SimbaseHttpClient;
