//! Authenticated request dispatch with transparent token renewal.

use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use quire_core::error::{AuthError, Error, InvalidInputError};
use quire_core::{AccessToken, Result};

use crate::client::{handle_response, parse_error_response};
use crate::endpoints::{ME, User};
use crate::session::AuthSession;

/// A request description that can be sent, and replayed once, by the
/// [`AuthenticatedTransport`].
///
/// The body is held as JSON so the replay sends exactly what the first
/// attempt sent.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// A POST with a JSON body.
    pub fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self> {
        Self::new(Method::POST, path).with_json(body)
    }

    /// A PUT with a JSON body.
    pub fn put<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self> {
        Self::new(Method::PUT, path).with_json(body)
    }

    /// Attach a JSON body.
    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| InvalidInputError::Other {
            message: format!("request body is not serializable: {e}"),
        })?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns true once the request has been replayed after a renewal.
    pub fn is_retried(&self) -> bool {
        self.retried
    }
}

/// Sends requests with the session's bearer token and recovers from 401s.
///
/// A 401 triggers one shared refresh (see [`AuthSession`]) and a single
/// replay of the request with the new token. A second 401 is reported as
/// [`AuthError::Unauthenticated`]. Any other response, successful or not,
/// is handed back to the caller.
#[derive(Debug, Clone)]
pub struct AuthenticatedTransport {
    session: AuthSession,
}

impl AuthenticatedTransport {
    pub fn new(session: AuthSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &AuthSession {
        &self.session
    }

    /// Send a request and return the raw response.
    ///
    /// # Errors
    ///
    /// Transport failures, [`AuthError::SessionExpired`] when renewal fails,
    /// and [`AuthError::Unauthenticated`] when the replay is rejected too.
    /// Non-401 error statuses are not errors here.
    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    pub async fn dispatch(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        let mut token = self.session.access_token();

        loop {
            let response = self.send_once(&request, token.as_ref()).await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                trace!(status = %response.status(), "API response");
                return Ok(response);
            }

            if request.retried {
                warn!("Request rejected after token renewal");
                return Err(AuthError::Unauthenticated.into());
            }

            debug!("Access token rejected; renewing");
            let renewed = self.session.renew_after_rejection(token.as_ref()).await?;
            token = Some(renewed);
            request.retried = true;
        }
    }

    async fn send_once(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<reqwest::Response> {
        let client = self.session.client();
        let url = client.url(&request.path);
        debug!(%url, retried = request.retried, "Sending request");

        let mut builder = client
            .inner()
            .request(request.method.clone(), &url)
            .header(ACCEPT, HeaderValue::from_static("application/json"));

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, bearer_header(token)?);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }

    /// Send a request and decode a JSON success body.
    ///
    /// Non-success statuses become [`Error::Protocol`].
    pub async fn send_json<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<R> {
        let response = self.dispatch(request).await?;
        handle_response(response).await
    }

    pub async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R> {
        self.send_json(ApiRequest::get(path)).await
    }

    pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send_json(ApiRequest::post(path, body)?).await
    }

    pub async fn put_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send_json(ApiRequest::put(path, body)?).await
    }

    /// Send a DELETE, ignoring any success body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.dispatch(ApiRequest::delete(path)).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::Protocol(parse_error_response(response).await))
        }
    }

    /// Fetch the signed-in user.
    pub async fn current_user(&self) -> Result<User> {
        self.get_json(ME).await
    }
}

pub(crate) fn bearer_header(token: &AccessToken) -> Result<HeaderValue> {
    let mut value =
        HeaderValue::from_str(&token.bearer()).map_err(|_| InvalidInputError::Header {
            name: AUTHORIZATION.to_string(),
        })?;
    value.set_sensitive(true);
    Ok(value)
}
