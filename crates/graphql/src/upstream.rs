//! The resolved upstream endpoint and transport-failure classification.

use std::{error::Error as StdError, io, time::Duration};

use {fieldgate_config::UpstreamConfig, url::Url};

use crate::Result;

/// Upstream GraphQL endpoint, resolved once at startup and shared by the
/// proxy and the relay.
#[derive(Debug, Clone)]
pub struct Upstream {
    endpoint: Url,
    host: String,
    data_events: Vec<String>,
    connect_timeout: Option<Duration>,
    channel_capacity: usize,
}

impl Upstream {
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let endpoint = config.endpoint_url()?;
        let host = display_host(&endpoint);
        Ok(Self {
            endpoint,
            host,
            data_events: config.subscription_events.clone(),
            connect_timeout: config.connect_timeout_secs.map(Duration::from_secs),
            channel_capacity: config.channel_capacity.max(1),
        })
    }

    /// Shorthand for an endpoint with every other setting at its default.
    pub fn parse(endpoint: &str) -> Result<Self> {
        Self::from_config(&UpstreamConfig {
            endpoint: endpoint.into(),
            ..UpstreamConfig::default()
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// `host[:port]` of the endpoint, the only part of it ever shown to
    /// clients. The port is omitted when it is the scheme default.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn data_events(&self) -> &[String] {
        &self.data_events
    }

    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Endpoint URL with the subscription operation encoded as query-string
    /// parameters. Existing parameters on the endpoint are kept.
    pub fn subscription_url(&self, query: &str, variables: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            if let Some(variables) = variables {
                pairs.append_pair("variables", variables);
            }
        }
        url
    }

    /// HTTP client for talking to this upstream. Only the connect phase can
    /// be time-bounded; bodies are read for as long as the upstream keeps
    /// them open.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// Message shown when the upstream host cannot be reached.
    pub fn unreachable_message(&self) -> String {
        format!("Cannot connect to GraphQL server at {}", self.host)
    }

    /// Client-facing description of a failed request, i.e. one that never
    /// produced a response. Never contains the endpoint URL.
    pub fn describe_failure(&self, err: reqwest::Error) -> String {
        match classify(&err) {
            FailureKind::Unreachable => self.unreachable_message(),
            FailureKind::Other => err.without_url().to_string(),
        }
    }

    /// Client-facing description of a failure while reading a response body.
    /// The host was reachable, so this is never the unreachable message.
    pub fn describe_read_failure(&self, err: reqwest::Error) -> String {
        err.without_url().to_string()
    }
}

/// Coarse category of a failed upstream call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The host could not be reached: DNS failure, refused connection or
    /// unreachable host/network.
    Unreachable,
    Other,
}

pub fn classify(err: &reqwest::Error) -> FailureKind {
    if err.is_connect() {
        return FailureKind::Unreachable;
    }
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>()
            && is_unreachable_kind(io_err.kind())
        {
            return FailureKind::Unreachable;
        }
        source = cause.source();
    }
    FailureKind::Other
}

fn is_unreachable_kind(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
    )
}

fn display_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
