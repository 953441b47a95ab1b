//! Configuration schema.

use {serde::Deserialize, url::Url};

use crate::{Error, Result};

/// Upstream GraphQL endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:4000/graphql";
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3012;
/// `next` is what GraphQL Yoga sends; unnamed events arrive as `message`.
pub const DEFAULT_SUBSCRIPTION_EVENTS: [&str; 2] = ["next", "message"];

/// Bound of the hand-off channel between a relay's upstream reader and the
/// downstream response body.
const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Root configuration (`fieldgate.toml`).
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FieldgateConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
}

impl FieldgateConfig {
    /// Check every value that would otherwise only fail on first use.
    pub fn validate(&self) -> Result<()> {
        self.upstream.endpoint_url()?;
        if self.upstream.channel_capacity == 0 {
            return Err(Error::invalid(
                "upstream.channel_capacity",
                "must be at least 1",
            ));
        }
        if self.upstream.subscription_events.is_empty() {
            return Err(Error::invalid(
                "upstream.subscription_events",
                "must name at least one event",
            ));
        }
        if self.server.bind.trim().is_empty() {
            return Err(Error::invalid("server.bind", "must not be empty"));
        }
        Ok(())
    }
}

/// Listener settings for the HTTP server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            port: DEFAULT_PORT,
        }
    }
}

/// Where and how to reach the upstream GraphQL service.
///
/// The endpoint is only ever used server-side; nothing in this struct is
/// echoed back to browsers except the bare host in connection errors.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct UpstreamConfig {
    /// GraphQL-over-HTTP endpoint. Queries are POSTed here and
    /// subscriptions are opened with a GET against the same URL.
    pub endpoint: String,
    /// SSE event names that carry subscription data. GraphQL Yoga sends
    /// `next`; servers that leave the event name out produce `message`.
    pub subscription_events: Vec<String>,
    /// Optional TCP connect timeout. Requests and subscriptions themselves
    /// are never time-bounded.
    pub connect_timeout_secs: Option<u64>,
    /// Number of frames a relay may buffer ahead of a slow client.
    pub channel_capacity: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            subscription_events: DEFAULT_SUBSCRIPTION_EVENTS.into_iter().map(String::from).collect(),
            connect_timeout_secs: None,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl UpstreamConfig {
    /// Parse the endpoint. It must be an absolute `http`/`https` URL with a
    /// host.
    pub fn endpoint_url(&self) -> Result<Url> {
        let url = Url::parse(self.endpoint.trim())
            .map_err(|e| Error::invalid("upstream.endpoint", e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::invalid(
                "upstream.endpoint",
                format!("unsupported scheme `{}`", url.scheme()),
            ));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(Error::invalid("upstream.endpoint", "missing host"));
        }
        Ok(url)
    }
}
