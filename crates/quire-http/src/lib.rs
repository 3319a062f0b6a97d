//! quire-http - Authenticated HTTP transport and SSE streaming for the quire API.
//!
//! [`AuthSession`] owns the credential pair and coordinates refreshes so that
//! any number of concurrent 401s cause exactly one call to the refresh
//! endpoint. [`AuthenticatedTransport`] dispatches requests through it and
//! replays each rejected request once. [`StreamingSession`] consumes a
//! generation stream into an observable, cancellable accumulator.

mod client;
pub mod endpoints;
mod refresh;
mod session;
pub mod streaming;
mod transport;

pub use client::{ClientConfig, DEFAULT_CONNECT_TIMEOUT, HttpClient};
pub use endpoints::{GenerateRequest, User};
pub use session::AuthSession;
pub use streaming::{
    SseEvent, SseFramer, StreamSnapshot, StreamStatus, StreamingSession, Utf8Decoder,
};
pub use reqwest::Method;
pub use transport::{ApiRequest, AuthenticatedTransport};
