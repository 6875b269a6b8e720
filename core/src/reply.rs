//! The outcome of one request as seen by its callback.

use std::time::Duration;

use serde_json::Value;
use url::Url;

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpResponse};

/// Identifies one scheduled request for the lifetime of a `Connector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Status, parsed body and timing of a finished request.
///
/// Transport failures and HTTP errors are delivered the same way. A failed
/// transport yields `status == 0`, an empty body and `transport_error` set;
/// when only the body read failed, the received status and headers are kept.
#[derive(Debug, Clone)]
pub struct Reply {
    pub id: RequestId,
    pub method: HttpMethod,
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub raw_body: String,
    /// `Value::Null` when the body is empty or not JSON.
    pub body: Value,
    pub elapsed: Duration,
    pub transport_error: Option<String>,
}

impl Reply {
    pub(crate) fn new(
        id: RequestId,
        method: HttpMethod,
        url: Url,
        outcome: Result<HttpResponse, TransportError>,
        elapsed: Duration,
    ) -> Self {
        let (status, headers, raw_body, transport_error) = match outcome {
            Ok(response) => (response.status, response.headers, response.body, None),
            Err(TransportError {
                message,
                response: Some(partial),
            }) => (partial.status, partial.headers, String::new(), Some(message)),
            Err(TransportError { message, response: None }) => (0, Vec::new(), String::new(), Some(message)),
        };
        let body = parse_body(&raw_body);
        Self {
            id,
            method,
            url,
            status,
            headers,
            raw_body,
            body,
            elapsed,
            transport_error,
        }
    }

    /// A 2xx status with the whole body received.
    pub fn is_success(&self) -> bool {
        self.transport_error.is_none() && (200..300).contains(&self.status)
    }

    /// Status >= 400, or no HTTP response at all.
    pub fn is_error(&self) -> bool {
        self.transport_error.is_some() || self.status >= 400
    }

    /// `thingId` of a created thing.
    pub fn thing_id(&self) -> Option<&str> {
        self.body.get("thingId").and_then(Value::as_str)
    }

    /// Top-level fields of an object body, for printing error reports.
    /// Strings are rendered bare, everything else as compact JSON.
    pub fn error_fields(&self) -> Vec<(String, String)> {
        let Some(object) = self.body.as_object() else {
            return Vec::new();
        };
        object
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), rendered)
            })
            .collect()
    }

    pub fn pretty_body(&self) -> String {
        if self.body.is_null() {
            return String::new();
        }
        serde_json::to_string_pretty(&self.body).unwrap_or_else(|_| self.raw_body.clone())
    }
}

fn parse_body(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(raw).unwrap_or(Value::Null)
}
