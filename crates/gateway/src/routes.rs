//! `/api/graphql` handlers.

use std::{convert::Infallible, sync::Arc};

use {
    axum::{
        Json,
        body::{Body, Bytes},
        extract::{Query, State},
        http::{
            StatusCode,
            header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
        },
        response::{IntoResponse, Response},
    },
    fieldgate_graphql::{Envelope, Error, GraphQlRequest, sse::EVENT_STREAM},
    futures::StreamExt,
    serde::Deserialize,
    serde_json::{Map, Value},
    tracing::{debug, warn},
};

use crate::state::GatewayState;

const QUERY_REQUIRED: &str = "Query is required";
const QUERY_PARAM_REQUIRED: &str = "Query parameter is required";
const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Deserialize)]
struct GraphQlBody {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeParams {
    query: Option<String>,
    variables: Option<String>,
}

fn envelope_response(status: StatusCode, envelope: Envelope) -> Response {
    (status, Json(envelope)).into_response()
}

// ── Queries and mutations ────────────────────────────────────────────────────

/// `POST /api/graphql`
///
/// 200 whenever the request could be proxied: the upstream body as received,
/// or an envelope describing why there is none. 400 without a query, 500
/// when the request body cannot be understood.
pub async fn graphql_handler(State(state): State<Arc<GatewayState>>, body: Bytes) -> Response {
    let body: GraphQlBody = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, "unreadable graphql request body");
            return envelope_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Envelope::error(e.to_string()),
            );
        },
    };

    let Some(query) = body.query.filter(|q| !q.is_empty()) else {
        return envelope_response(StatusCode::BAD_REQUEST, Envelope::error(QUERY_REQUIRED));
    };

    let request = GraphQlRequest {
        query,
        variables: body.variables,
    };
    match state.proxy.execute(&request).await.into_body() {
        Ok(body) => ([(CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to encode graphql response");
            envelope_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Envelope::error(e.to_string()),
            )
        },
    }
}

// ── Subscriptions ────────────────────────────────────────────────────────────

/// `GET /api/graphql/subscribe?query=..&variables=..`
///
/// Streams the upstream subscription back as `text/event-stream`. The relay
/// ends when the client goes away (the body is dropped) or on shutdown.
pub async fn subscribe_handler(
    State(state): State<Arc<GatewayState>>,
    Query(params): Query<SubscribeParams>,
) -> Response {
    let query = params.query.unwrap_or_default();
    let variables = params.variables.filter(|v| !v.is_empty());

    let frames = match state
        .relay
        .open(&query, variables.as_deref(), &state.shutdown)
    {
        Ok(frames) => frames,
        Err(Error::MissingQuery) => {
            debug!("subscription rejected: no query");
            return (StatusCode::BAD_REQUEST, QUERY_PARAM_REQUIRED).into_response();
        },
        Err(e) => {
            warn!(error = %e, "failed to open subscription relay");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        },
    };

    let body = Body::from_stream(frames.map(|frame| Ok::<_, Infallible>(frame.encode())));
    (
        [
            (CONTENT_TYPE, EVENT_STREAM),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response()
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": state.version,
    }))
}
