//! Query/mutation proxy.

use std::sync::Arc;

use {
    bytes::Bytes,
    serde::de::IgnoredAny,
    tracing::{debug, instrument, warn},
};

use crate::{Envelope, GraphQlRequest, Result, Upstream};

/// Outcome of one proxied operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyReply {
    /// A 2xx upstream body, byte for byte. Known to be JSON, otherwise
    /// unchecked.
    Upstream(Bytes),
    /// Envelope produced by the proxy because the upstream could not answer.
    Local(Envelope),
}

impl ProxyReply {
    /// JSON body for the downstream response.
    pub fn into_body(self) -> Result<Bytes> {
        match self {
            Self::Upstream(body) => Ok(body),
            Self::Local(envelope) => Ok(serde_json::to_vec(&envelope)?.into()),
        }
    }
}

/// Forwards queries and mutations to the upstream and always answers with a
/// GraphQL response body, whatever happened on the way.
#[derive(Debug, Clone)]
pub struct QueryProxy {
    client: reqwest::Client,
    upstream: Arc<Upstream>,
}

impl QueryProxy {
    pub fn new(upstream: Arc<Upstream>) -> Result<Self> {
        let client = upstream.http_client()?;
        Ok(Self::with_client(client, upstream))
    }

    pub fn with_client(client: reqwest::Client, upstream: Arc<Upstream>) -> Self {
        Self { client, upstream }
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Execute one operation against the upstream. Single attempt.
    ///
    /// - non-2xx: `GraphQL request failed: <status> <statusText>`
    /// - host unreachable: `Cannot connect to GraphQL server at <host>`
    /// - 2xx: the upstream body, unmodified
    #[instrument(skip_all, fields(query_len = request.query.len()))]
    pub async fn execute(&self, request: &GraphQlRequest) -> ProxyReply {
        if request.query.is_empty() {
            return ProxyReply::Local(Envelope::error("Query is required"));
        }

        let response = match self
            .client
            .post(self.upstream.endpoint().clone())
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                let message = self.upstream.describe_failure(e);
                warn!(host = self.upstream.host(), error = %message, "graphql upstream request failed");
                return ProxyReply::Local(Envelope::error(message));
            },
        };

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "graphql upstream returned error status");
            return ProxyReply::Local(Envelope::request_failed(status));
        }

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                let message = self.upstream.describe_read_failure(e);
                warn!(error = %message, "failed to read graphql upstream response");
                return ProxyReply::Local(Envelope::error(message));
            },
        };

        if let Err(e) = serde_json::from_slice::<IgnoredAny>(&body) {
            warn!(error = %e, "graphql upstream returned invalid json");
            return ProxyReply::Local(Envelope::error(format!(
                "Invalid response from GraphQL server: {e}"
            )));
        }
        debug!(bytes = body.len(), "graphql upstream responded");
        ProxyReply::Upstream(body)
    }
}
