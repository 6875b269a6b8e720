//! Pluggable HTTP execution and credential lookup.
//!
//! # Design
//! The connector never talks to the network itself. A `Transport` executes
//! one `HttpRequest` and reports whatever the server (or the network stack)
//! produced. When the server answers with a Basic challenge the transport
//! asks the `CredentialProvider` synchronously, at most once per request,
//! and resends with the returned credentials.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Username/password pair for HTTP basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Supplies credentials when a server challenges a request.
///
/// Returning `None` leaves the challenge unanswered; the 401 reply is then
/// delivered as-is.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self, request: &HttpRequest, realm: Option<&str>) -> Option<Credentials>;
}

/// Executes a single HTTP request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        request: HttpRequest,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<HttpResponse, TransportError>;
}

/// `Transport` backed by a shared `reqwest::Client`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a caller-built client, for timeouts, proxies or TLS roots the
    /// default client does not set.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn send(
        &self,
        request: &HttpRequest,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        if let Some(creds) = credentials {
            builder = builder.basic_auth(&creds.username, Some(&creds.password));
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %request.url, status, error = %e, "reading response body failed");
                return Err(TransportError::body_read(e.to_string(), status, headers));
            }
        };
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: HttpRequest,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<HttpResponse, TransportError> {
        let response = self.send(&request, None).await?;
        let Some(challenge) = basic_challenge(&response) else {
            return Ok(response);
        };
        let Some(creds) = credentials.credentials(&request, challenge.realm.as_deref()) else {
            return Ok(response);
        };
        debug!(url = %request.url, realm = ?challenge.realm, "answering basic auth challenge");
        self.send(&request, Some(&creds)).await
    }
}

/// A parsed `WWW-Authenticate: Basic ...` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicChallenge {
    pub realm: Option<String>,
}

/// Detect a Basic challenge on a 401 response.
pub fn basic_challenge(response: &HttpResponse) -> Option<BasicChallenge> {
    if response.status != 401 {
        return None;
    }
    let header = response.header("www-authenticate")?.trim();
    let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let realm = params.split(',').find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("realm")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    Some(BasicChallenge { realm })
}
