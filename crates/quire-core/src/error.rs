//! Error types for quire.
//!
//! A single error type with explicit variants for transport, authentication,
//! protocol, input validation and storage failures, so callers can tell a
//! dropped connection apart from an expired session.

use std::fmt;
use thiserror::Error;

/// The unified error type for quire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Network transport errors (DNS, TLS, connection, timeout, body read).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (bad credentials, expired session).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-success HTTP responses from the API.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Input validation errors.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),

    /// Durable token storage errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl Error {
    /// Returns true when the caller should send the user back to a login flow.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            Error::Auth(
                AuthError::SessionExpired { .. }
                    | AuthError::Unauthenticated
                    | AuthError::InvalidCredentials
            )
        )
    }

    /// Returns the HTTP status for protocol errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Protocol(e) => Some(e.status),
            _ => None,
        }
    }
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request timed out.
    #[error("request timed out: {message}")]
    Timeout { message: String },

    /// Response body could not be decoded.
    #[error("malformed response: {message}")]
    Decode { message: String },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                message: err.to_string(),
            }
        } else if err.is_connect() {
            TransportError::Connection {
                message: err.to_string(),
            }
        } else if err.is_decode() {
            TransportError::Decode {
                message: err.to_string(),
            }
        } else {
            TransportError::Http {
                message: err.to_string(),
            }
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::from(err))
    }
}

/// Authentication-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Login was rejected.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// The token pair could not be renewed; stored credentials were cleared.
    #[error("session expired: {reason}")]
    SessionExpired { reason: String },

    /// The request was rejected again after its one replay with a fresh token.
    #[error("request unauthenticated after token refresh")]
    Unauthenticated,

    /// The task driving the shared refresh was dropped before it finished.
    #[error("token refresh was interrupted")]
    RefreshInterrupted,
}

/// A non-success HTTP response.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// `detail` message from the API error body, if present.
    pub detail: Option<String>,
}

impl ProtocolError {
    /// Create a new protocol error.
    pub fn new(status: u16, detail: Option<String>) -> Self {
        Self { status, detail }
    }

    /// Check if this is an authentication error.
    pub fn is_auth_error(&self) -> bool {
        self.status == 401
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref detail) = self.detail {
            write!(f, ": {}", detail)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

/// Input validation errors.
#[derive(Debug, Error)]
pub enum InvalidInputError {
    /// Invalid API base URL.
    #[error("invalid API URL '{value}': {reason}")]
    ApiUrl { value: String, reason: String },

    /// A value that cannot be sent as an HTTP header.
    #[error("invalid header value for '{name}'")]
    Header { name: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}

/// Token storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing store failed.
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// The backing store holds data that cannot be parsed.
    #[error("corrupt token store at {path}: {message}")]
    Corrupt { path: String, message: String },
}
