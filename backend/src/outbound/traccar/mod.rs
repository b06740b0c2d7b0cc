//! Tracking server outbound adapter.
//!
//! A reqwest implementation of the `TrackingClient` port speaking the
//! Traccar REST API under `<server>/api/`.

mod dto;
mod http_client;

pub use http_client::{TraccarCredentials, TraccarHttpClient};
