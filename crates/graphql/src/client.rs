//! Client for a running fieldgate gateway.
//!
//! Talks to the gateway's own `/api/graphql` endpoints, never to the
//! upstream, so it works wherever a browser would.

use {
    bytes::Bytes,
    fieldgate_config::DEFAULT_SUBSCRIPTION_EVENTS,
    futures::{Stream, StreamExt, stream::BoxStream},
    reqwest::header::{ACCEPT, HeaderValue},
    serde_json::{Map, Value},
    tracing::debug,
    url::Url,
};

use crate::{
    Envelope, Error, GraphQlRequest, Result,
    envelope::request_failed_message,
    sse::{ERROR_EVENT, EVENT_STREAM, SseDecoder, SseEvent, Utf8ChunkDecoder},
};

const QUERY_PATH: &str = "/api/graphql";
const SUBSCRIBE_PATH: &str = "/api/graphql/subscribe";

/// Message received on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionEvent {
    /// A data event. The envelope may still carry GraphQL `errors`.
    Data(Envelope),
    /// An `error` event produced by the gateway or the upstream.
    Error(Envelope),
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    base: Url,
    data_events: Vec<String>,
}

impl GatewayClient {
    /// `base` is the gateway root, e.g. `http://localhost:3012`. Data events
    /// default to [`DEFAULT_SUBSCRIPTION_EVENTS`].
    pub fn new(base: Url) -> Self {
        Self {
            client: reqwest::Client::new(),
            base,
            data_events: DEFAULT_SUBSCRIPTION_EVENTS
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Replace the SSE event names treated as subscription data, normally
    /// with `upstream.subscription_events` from the config.
    #[must_use]
    pub fn with_data_events(mut self, events: Vec<String>) -> Self {
        self.data_events = events;
        self
    }

    /// Run a query or mutation through the gateway.
    pub async fn query(
        &self,
        query: &str,
        variables: Option<Map<String, Value>>,
    ) -> Result<Envelope> {
        let url = self.endpoint(QUERY_PATH)?;
        let mut request = GraphQlRequest::new(query);
        request.variables = variables;

        let response = self.client.post(url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::message(request_failed_message(status)));
        }
        Ok(response.json().await?)
    }

    /// Open a subscription. The returned stream ends when the gateway closes
    /// the connection; dropping it disconnects.
    pub async fn subscribe(
        &self,
        query: &str,
        variables: Option<&Map<String, Value>>,
    ) -> Result<BoxStream<'static, Result<SubscriptionEvent>>> {
        let mut url = self.endpoint(SUBSCRIBE_PATH)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            if let Some(variables) = variables {
                pairs.append_pair("variables", &serde_json::to_string(variables)?);
            }
        }

        let response = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::message(request_failed_message(status)));
        }

        Ok(sse_events(response.bytes_stream(), self.data_events.clone()).boxed())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| Error::message(format!("invalid gateway url: {e}")))
    }
}

/// Decode an SSE byte stream into subscription events.
fn sse_events(
    body: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
    data_events: Vec<String>,
) -> impl Stream<Item = Result<SubscriptionEvent>> + Send + 'static {
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut text = Utf8ChunkDecoder::default();
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in decoder.push(&text.decode(&chunk)) {
                if let Some(event) = classify_event(event, &data_events)? {
                    yield event;
                }
            }
        }
        debug!("subscription stream closed by gateway");
    }
}

fn classify_event(event: SseEvent, data_events: &[String]) -> Result<Option<SubscriptionEvent>> {
    if event.event == ERROR_EVENT {
        let envelope =
            serde_json::from_str(&event.data).unwrap_or_else(|_| Envelope::error(event.data));
        return Ok(Some(SubscriptionEvent::Error(envelope)));
    }
    if data_events.iter().any(|name| *name == event.event) {
        return Ok(Some(SubscriptionEvent::Data(serde_json::from_str(&event.data)?)));
    }
    debug!(event = %event.event, "ignoring subscription event");
    Ok(None)
}
