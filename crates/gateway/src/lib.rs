//! HTTP surface of the fieldgate gateway: the GraphQL proxy endpoint, the
//! SSE subscription endpoint and a health check.

pub mod routes;
pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, serve, start_gateway},
    state::GatewayState,
};
