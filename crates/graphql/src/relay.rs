//! Subscription relay: re-streams an upstream SSE subscription to one
//! downstream client.
//!
//! Each relay is a producer task that owns the upstream response and pushes
//! decoded text into a bounded channel; the [`RelayStream`] handed to the
//! caller is the consumer end. The producer waits on a single
//! [`CancellationToken`] at every suspension point, so cancelling it drops the
//! upstream response (closing that connection) even if nobody is polling the
//! stream. The token is cancelled by whichever comes first:
//!
//! - the caller's `disconnect` token (the relay token is a child of it),
//! - the [`RelayStream`] being dropped,
//! - [`AbortHandle::abort`].
//!
//! Cancellation ends the stream silently; only upstream failures produce an
//! `error` frame.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use {
    futures::Stream,
    reqwest::{
        StatusCode,
        header::{ACCEPT, HeaderValue},
    },
    tokio::sync::mpsc,
    tokio_stream::wrappers::ReceiverStream,
    tokio_util::sync::{CancellationToken, DropGuard},
    tracing::{Instrument, debug, debug_span, warn},
    url::Url,
};

use crate::{
    Error, Result, Upstream,
    sse::{EVENT_STREAM, Utf8ChunkDecoder, error_event},
};

pub const NO_BODY_MESSAGE: &str = "No response body from GraphQL server";

/// One unit written to the downstream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayFrame {
    /// Upstream bytes, decoded as UTF-8 and forwarded verbatim.
    Chunk(String),
    /// Relay-generated `event: error` frame with this message.
    Error(String),
}

impl RelayFrame {
    #[cfg(test)]
    fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Wire representation.
    pub fn encode(self) -> String {
        match self {
            Self::Chunk(text) => text,
            Self::Error(message) => error_event(&message),
        }
    }
}

/// Idempotent cancel switch for one relay.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    token: CancellationToken,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.token.cancel();
    }

    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Downstream end of a relay. Dropping it aborts the upstream read.
pub struct RelayStream {
    frames: ReceiverStream<RelayFrame>,
    abort: AbortHandle,
    _cancel_on_drop: DropGuard,
}

impl RelayStream {
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl Stream for RelayStream {
    type Item = RelayFrame;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().frames).poll_next(cx)
    }
}

/// Opens relays against the configured upstream.
#[derive(Debug, Clone)]
pub struct SubscriptionRelay {
    client: reqwest::Client,
    upstream: Arc<Upstream>,
}

impl SubscriptionRelay {
    pub fn new(upstream: Arc<Upstream>) -> Result<Self> {
        let client = upstream.http_client()?;
        Ok(Self::with_client(client, upstream))
    }

    pub fn with_client(client: reqwest::Client, upstream: Arc<Upstream>) -> Self {
        Self { client, upstream }
    }

    /// Start relaying `query`. `variables` is already JSON-encoded.
    ///
    /// Fails with [`Error::MissingQuery`] before touching the upstream when
    /// `query` is empty. Must be called from within a tokio runtime.
    pub fn open(
        &self,
        query: &str,
        variables: Option<&str>,
        disconnect: &CancellationToken,
    ) -> Result<RelayStream> {
        if query.is_empty() {
            return Err(Error::MissingQuery);
        }

        let url = self.upstream.subscription_url(query, variables);
        let token = disconnect.child_token();
        let (tx, rx) = mpsc::channel(self.upstream.channel_capacity());

        let pump = Pump {
            client: self.client.clone(),
            upstream: Arc::clone(&self.upstream),
            token: token.clone(),
            tx,
        };
        let span = debug_span!("relay", host = self.upstream.host());
        tokio::spawn(pump.run(url).instrument(span));

        Ok(RelayStream {
            frames: ReceiverStream::new(rx),
            abort: AbortHandle {
                token: token.clone(),
            },
            _cancel_on_drop: token.drop_guard(),
        })
    }
}

enum RelayEnd {
    Completed,
    Cancelled,
    Failed(String),
}

struct Pump {
    client: reqwest::Client,
    upstream: Arc<Upstream>,
    token: CancellationToken,
    tx: mpsc::Sender<RelayFrame>,
}

impl Pump {
    async fn run(self, url: Url) {
        match self.relay(url).await {
            RelayEnd::Completed => debug!("upstream closed subscription"),
            RelayEnd::Cancelled => debug!("subscription cancelled"),
            RelayEnd::Failed(_) if self.token.is_cancelled() => {
                debug!("subscription cancelled while failing");
            },
            RelayEnd::Failed(message) => {
                warn!(%message, "subscription relay failed");
                self.forward(RelayFrame::Error(message)).await;
            },
        }
    }

    async fn relay(&self, url: Url) -> RelayEnd {
        let request = self
            .client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(EVENT_STREAM))
            .send();

        let response = tokio::select! {
            biased;
            () = self.token.cancelled() => return RelayEnd::Cancelled,
            response = request => response,
        };
        let mut response = match response {
            Ok(response) => response,
            Err(e) => return RelayEnd::Failed(self.upstream.describe_failure(e)),
        };

        let status = response.status();
        if !status.is_success() {
            return RelayEnd::Failed(format!("GraphQL server returned {}", status.as_u16()));
        }
        if !has_body(status, response.content_length()) {
            return RelayEnd::Failed(NO_BODY_MESSAGE.to_string());
        }
        debug!(status = status.as_u16(), "upstream subscription open");

        let mut decoder = Utf8ChunkDecoder::default();
        loop {
            let chunk = tokio::select! {
                biased;
                () = self.token.cancelled() => return RelayEnd::Cancelled,
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    let text = decoder.decode(&bytes);
                    if !text.is_empty() && !self.forward(RelayFrame::Chunk(text)).await {
                        return RelayEnd::Cancelled;
                    }
                },
                Ok(None) => {
                    let rest = decoder.finish();
                    if !rest.is_empty() && !self.forward(RelayFrame::Chunk(rest)).await {
                        return RelayEnd::Cancelled;
                    }
                    return RelayEnd::Completed;
                },
                Err(e) => return RelayEnd::Failed(self.upstream.describe_read_failure(e)),
            }
        }
    }

    /// Hand a frame to the consumer. `false` once the relay is cancelled or
    /// the consumer is gone.
    async fn forward(&self, frame: RelayFrame) -> bool {
        tokio::select! {
            biased;
            () = self.token.cancelled() => false,
            sent = self.tx.send(frame) => sent.is_ok(),
        }
    }
}

fn has_body(status: StatusCode, content_length: Option<u64>) -> bool {
    !matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) && content_length != Some(0)
}
