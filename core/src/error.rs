//! Error types for the Things API connector.
//!
//! # Design
//! Only programmer errors live here: a base URL or thing id that cannot form
//! a valid request URL, a body that cannot be serialized, or a send after
//! `close()`. HTTP statuses (including 4xx/5xx) and transport failures are
//! never errors at this layer; they reach the caller as a `Reply`.

use thiserror::Error;

use crate::http::HttpResponse;

/// Errors returned synchronously when a request cannot be scheduled.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The request URL could not be built from the configured base URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `close()` was already called on the connector.
    #[error("connector is closed")]
    Closed,
}

impl From<url::ParseError> for ClientError {
    fn from(e: url::ParseError) -> Self {
        ClientError::InvalidUrl(e.to_string())
    }
}

/// A failure below HTTP: connect, DNS, TLS, timeout or body read.
///
/// `response` holds the status line and headers when the server answered
/// but the body could not be read; its `body` is empty.
#[derive(Debug, Clone, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
    pub response: Option<HttpResponse>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            response: None,
        }
    }

    /// Body read failed after `status` and `headers` arrived.
    pub fn body_read(message: impl Into<String>, status: u16, headers: Vec<(String, String)>) -> Self {
        Self {
            message: message.into(),
            response: Some(HttpResponse {
                status,
                headers,
                body: String::new(),
            }),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::new(e.to_string())
    }
}
