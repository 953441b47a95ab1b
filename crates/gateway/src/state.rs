use std::sync::Arc;

use {
    fieldgate_config::UpstreamConfig,
    fieldgate_graphql::{QueryProxy, Result, SubscriptionRelay, Upstream},
    tokio_util::sync::CancellationToken,
};

/// Shared, immutable gateway state. Nothing in here changes per request.
pub struct GatewayState {
    pub proxy: QueryProxy,
    pub relay: SubscriptionRelay,
    pub upstream: Arc<Upstream>,
    /// Cancelled on server shutdown; every live relay hangs off it.
    pub shutdown: CancellationToken,
    pub version: String,
}

impl GatewayState {
    pub fn new(upstream: Upstream) -> Result<Arc<Self>> {
        let upstream = Arc::new(upstream);
        let client = upstream.http_client()?;
        Ok(Arc::new(Self {
            proxy: QueryProxy::with_client(client.clone(), Arc::clone(&upstream)),
            relay: SubscriptionRelay::with_client(client, Arc::clone(&upstream)),
            upstream,
            shutdown: CancellationToken::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }))
    }

    pub fn from_config(config: &UpstreamConfig) -> Result<Arc<Self>> {
        Self::new(Upstream::from_config(config)?)
    }
}
