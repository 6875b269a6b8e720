//! Connection settings for the Things API.

use std::fmt;

use serde::Deserialize;
use url::Url;

use crate::error::ClientError;
use crate::http::HttpRequest;
use crate::transport::{CredentialProvider, Credentials};

/// Base URL, basic-auth credentials and API token for one Things tenant.
///
/// Never mutated after the `Connector` takes ownership of it. Can be read
/// from TOML:
///
/// ```toml
/// base_url = "https://things.apps.bosch-iot-cloud.com/api/1"
/// username = "alice"
/// password = "secret"
/// api_token = "0123456789abcdef"
/// ```
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub api_token: String,
}

impl ClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        api_token: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            api_token: api_token.into(),
        }
    }

    /// Parse the base URL, failing fast on anything that cannot take
    /// `/things` path segments.
    pub fn validate(&self) -> Result<Url, ClientError> {
        let url = Url::parse(self.base_url.trim_end_matches('/'))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                self.base_url
            )));
        }
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {:?} in {}",
                url.scheme(),
                self.base_url
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(ClientError::InvalidUrl(format!(
                "{} must not carry a query or fragment",
                self.base_url
            )));
        }
        Ok(url)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// The configured username/password answer every challenge.
impl CredentialProvider for ClientConfig {
    fn credentials(&self, _request: &HttpRequest, _realm: Option<&str>) -> Option<Credentials> {
        Some(Credentials {
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}
