//! GraphQL proxying for the fieldgate gateway.
//!
//! - [`QueryProxy`] forwards queries and mutations, relaying successful
//!   upstream bodies untouched and answering with an [`Envelope`] otherwise.
//! - [`SubscriptionRelay`] re-streams upstream SSE subscriptions with
//!   disconnects propagated upstream as cancellation.
//! - [`GatewayClient`] consumes a running gateway from Rust.

pub mod client;
pub mod envelope;
pub mod error;
pub mod proxy;
pub mod relay;
pub mod sse;
pub mod upstream;

pub use {
    client::{GatewayClient, SubscriptionEvent},
    envelope::{Envelope, GraphQlError, GraphQlRequest, PathSegment},
    error::{Error, Result},
    proxy::{ProxyReply, QueryProxy},
    relay::{AbortHandle, RelayFrame, RelayStream, SubscriptionRelay},
    upstream::{FailureKind, Upstream},
};
