//! Plain HTTP client for the API.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, trace};

use quire_core::error::{Error, ProtocolError};
use quire_core::{ApiUrl, Result};

use crate::endpoints::ErrorResponse;

/// Default timeout for establishing a connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Settings for building an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every endpoint path is joined onto.
    pub base_url: ApiUrl,
    /// `User-Agent` header value.
    pub user_agent: String,
    /// Connect timeout. Applies to connection setup only, never to reading a
    /// response body, so long-lived streams are not cut off.
    pub connect_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(base_url: ApiUrl) -> Self {
        Self {
            base_url,
            user_agent: concat!("quire/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// HTTP client bound to one API base URL.
///
/// Requests made directly through this type carry no credentials; it is
/// used for login and refresh, and as the connection pool underneath the
/// authenticated transport and the streaming session.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base: ApiUrl,
}

impl HttpClient {
    /// Create a client with default settings.
    pub fn new(base: ApiUrl) -> Self {
        Self::with_config(ClientConfig::new(base))
    }

    /// Create a client from explicit settings.
    pub fn with_config(config: ClientConfig) -> Self {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder.build().expect("failed to build HTTP client");

        Self {
            client,
            base: config.base_url,
        }
    }

    /// Returns the base URL this client is configured for.
    pub fn base_url(&self) -> &ApiUrl {
        &self.base
    }

    /// Returns the absolute URL for an endpoint path.
    pub fn url(&self, path: &str) -> String {
        self.base.endpoint(path)
    }

    pub(crate) fn inner(&self) -> &reqwest::Client {
        &self.client
    }

    /// Make an unauthenticated JSON POST.
    #[instrument(skip(self, body), fields(base = %self.base))]
    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%url, "POST");

        let response = self
            .client
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(body)
            .send()
            .await?;

        handle_response(response).await
    }
}

/// Parse a JSON body on success, or turn the status into a [`ProtocolError`].
pub(crate) async fn handle_response<R: DeserializeOwned>(response: reqwest::Response) -> Result<R> {
    let status = response.status();
    trace!(status = %status, "API response");

    if status.is_success() {
        let body = response.json::<R>().await?;
        Ok(body)
    } else {
        Err(Error::Protocol(parse_error_response(response).await))
    }
}

/// Build a [`ProtocolError`] from a failed response, reading `detail` if the
/// body carries one.
pub(crate) async fn parse_error_response(response: reqwest::Response) -> ProtocolError {
    let status = response.status().as_u16();

    match response.bytes().await {
        Ok(body) => ProtocolError::new(status, ErrorResponse::detail_from_slice(&body)),
        Err(_) => ProtocolError::new(status, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let api = ApiUrl::new("https://proposals.example.com/api/v1").unwrap();
        let client = HttpClient::new(api.clone());
        assert_eq!(client.base_url(), &api);
        assert_eq!(
            client.url("auth/me"),
            "https://proposals.example.com/api/v1/auth/me"
        );
    }

    #[test]
    fn config_defaults() {
        let api = ApiUrl::new("http://localhost:8000").unwrap();
        let config = ClientConfig::new(api)
            .with_user_agent("tests/1.0")
            .with_connect_timeout(None);
        assert_eq!(config.user_agent, "tests/1.0");
        assert!(config.connect_timeout.is_none());
    }
}
