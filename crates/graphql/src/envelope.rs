//! GraphQL request and response envelope types.
//!
//! Successful upstream bodies are relayed as raw bytes; [`Envelope`] is what
//! the gateway builds itself when the upstream could not answer, and what
//! [`GatewayClient`](crate::GatewayClient) decodes on the consuming side.

use {
    reqwest::StatusCode,
    serde::{Deserialize, Deserializer, Serialize},
    serde_json::{Map, Value},
};

/// A GraphQL operation as sent to the upstream. Both fields are passed
/// through opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Map<String, Value>>,
}

impl GraphQlRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            variables: None,
        }
    }

    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = Some(variables);
        self
    }
}

/// `{ data?, errors? }` response envelope.
///
/// Unknown top-level keys (e.g. `extensions`) survive a round trip, and an
/// explicit `"data": null` stays distinguishable from an absent `data`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQlError>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Envelope carrying a single error and no data.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: Some(vec![GraphQlError::new(message)]),
            ..Self::default()
        }
    }

    #[cfg(test)]
    pub(crate) fn from_data(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::default()
        }
    }

    /// Error for an upstream HTTP failure:
    /// `GraphQL request failed: <status> <statusText>`.
    pub fn request_failed(status: StatusCode) -> Self {
        Self::error(request_failed_message(status))
    }

    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|errors| !errors.is_empty())
    }

    pub fn first_error_message(&self) -> Option<&str> {
        self.errors
            .as_deref()
            .and_then(<[GraphQlError]>::first)
            .map(|e| e.message.as_str())
    }
}

/// Single entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,
    /// `locations`, `extensions` and anything else the upstream adds.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GraphQlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extra: Map::new(),
        }
    }
}

/// Element of an error `path`: a field name or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(u64),
}

pub(crate) fn request_failed_message(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("GraphQL request failed: {} {reason}", status.as_u16()),
        None => format!("GraphQL request failed: {}", status.as_u16()),
    }
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
