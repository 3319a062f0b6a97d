//! A cancellable consumer for one server-sent-event response at a time.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use quire_core::Error;

use super::decoder::Utf8Decoder;
use super::event::{StreamAction, interpret, parse_frame};
use super::framer::SseFramer;
use crate::client::parse_error_response;
use crate::endpoints::{GENERATE_STREAM, GenerateRequest};
use crate::session::AuthSession;
use crate::transport::bearer_header;

/// Message used when a stream could not be started and the server gave no
/// `detail`.
pub const GENERIC_START_ERROR: &str = "generation failed";

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Completed,
    Errored,
    Cancelled,
}

impl StreamStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StreamStatus::Completed | StreamStatus::Errored | StreamStatus::Cancelled
        )
    }
}

impl std::fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StreamStatus::Idle => "idle",
            StreamStatus::Streaming => "streaming",
            StreamStatus::Completed => "completed",
            StreamStatus::Errored => "errored",
            StreamStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Everything a renderer needs to draw the current stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSnapshot {
    pub status: StreamStatus,
    pub content: String,
    pub error: Option<String>,
}

/// Streams generated text into an observable accumulator.
///
/// Each [`start`](Self::start) opens one request with the session's current
/// bearer token and reads it to the end, a `done` or `error` event, or
/// [`cancel`](Self::cancel). Starting again cancels the previous run first;
/// a superseded run never writes into the new one.
///
/// Streams are not retried and never refresh credentials: a rejected start
/// simply ends in [`StreamStatus::Errored`].
#[derive(Clone)]
pub struct StreamingSession {
    inner: Arc<StreamInner>,
}

struct StreamInner {
    auth: AuthSession,
    snapshot: watch::Sender<StreamSnapshot>,
    run: Mutex<RunState>,
}

#[derive(Debug, Default)]
struct RunState {
    /// Identifies the newest run; older read loops compare against it.
    run: u64,
    cancel: Option<CancellationToken>,
}

impl StreamingSession {
    pub fn new(auth: AuthSession) -> Self {
        Self {
            inner: Arc::new(StreamInner {
                auth,
                snapshot: watch::Sender::new(StreamSnapshot::default()),
                run: Mutex::new(RunState::default()),
            }),
        }
    }

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.inner.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> StreamSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    /// Follow the state as it changes.
    pub fn subscribe(&self) -> watch::Receiver<StreamSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn status(&self) -> StreamStatus {
        self.inner.snapshot.borrow().status
    }

    pub fn content(&self) -> String {
        self.inner.snapshot.borrow().content.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.snapshot.borrow().error.clone()
    }

    pub fn is_active(&self) -> bool {
        self.status() == StreamStatus::Streaming
    }

    /// Stream a generation request.
    pub async fn generate(&self, request: &GenerateRequest) -> StreamStatus {
        self.start(GENERATE_STREAM, request).await
    }

    /// POST `body` to `path` and consume the event stream.
    ///
    /// Resolves when this run ends, with the status it ended in. A run
    /// superseded by a later `start` resolves as `Cancelled`. Failures are
    /// reported through the status and [`error`](Self::error), not as a
    /// `Result`.
    #[instrument(skip(self, body))]
    pub async fn start<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> StreamStatus {
        let (run, cancel) = self.begin();

        let client = self.inner.auth.client();
        let url = client.url(path);
        let mut builder = client
            .inner()
            .post(&url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(body);

        if let Some(token) = self.inner.auth.access_token() {
            match bearer_header(&token) {
                Ok(value) => builder = builder.header(AUTHORIZATION, value),
                Err(e) => return self.finish(run, StreamStatus::Errored, Some(e.to_string())),
            }
        }

        debug!(%url, run, "Opening stream");
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return self.outcome(run),
            response = builder.send() => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(e) => {
                let err = Error::from(e);
                warn!(error = %err, "Stream request failed");
                return self.finish(run, StreamStatus::Errored, Some(err.to_string()));
            }
        };

        if !response.status().is_success() {
            let error = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.outcome(run),
                error = parse_error_response(response) => error,
            };
            warn!(status = error.status, "Stream rejected");
            let message = error
                .detail
                .unwrap_or_else(|| GENERIC_START_ERROR.to_string());
            return self.finish(run, StreamStatus::Errored, Some(message));
        }

        self.consume(run, &cancel, response.bytes_stream()).await
    }

    /// Stop the active stream. No effect unless a stream is running.
    pub fn cancel(&self) {
        let mut state = self.run_state();
        let Some(token) = state.cancel.take() else {
            return;
        };
        token.cancel();
        self.inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.status == StreamStatus::Streaming {
                snapshot.status = StreamStatus::Cancelled;
                true
            } else {
                false
            }
        });
        debug!(run = state.run, "Stream cancelled");
    }

    /// Clear content and error. An active stream keeps running; otherwise
    /// the status returns to `Idle`.
    pub fn reset(&self) {
        let _state = self.run_state();
        self.inner.snapshot.send_modify(|snapshot| {
            snapshot.content.clear();
            snapshot.error = None;
            if snapshot.status != StreamStatus::Streaming {
                snapshot.status = StreamStatus::Idle;
            }
        });
    }

    /// Supersede any previous run and mark a fresh one as streaming.
    pub(crate) fn begin(&self) -> (u64, CancellationToken) {
        let mut state = self.run_state();
        if let Some(previous) = state.cancel.take() {
            debug!(run = state.run, "Superseding active stream");
            previous.cancel();
        }

        state.run += 1;
        let token = CancellationToken::new();
        state.cancel = Some(token.clone());
        self.inner.snapshot.send_replace(StreamSnapshot {
            status: StreamStatus::Streaming,
            ..StreamSnapshot::default()
        });
        (state.run, token)
    }

    /// Read `stream` until it ends, a terminal event arrives, or `cancel`
    /// fires.
    pub(crate) async fn consume<S, E>(
        &self,
        run: u64,
        cancel: &CancellationToken,
        stream: S,
    ) -> StreamStatus
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Into<Error>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut decoder = Utf8Decoder::new();
        let mut framer = SseFramer::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return self.outcome(run),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let text = decoder.decode(&chunk);
                    for frame in framer.push(&text) {
                        if let Some(status) = self.apply_frame(run, &frame) {
                            return status;
                        }
                    }
                }
                Some(Err(e)) => {
                    let err: Error = e.into();
                    warn!(error = %err, "Stream read failed");
                    return self.finish(run, StreamStatus::Errored, Some(err.to_string()));
                }
                None => break,
            }
        }

        let mut frames = framer.push(&decoder.finish());
        frames.extend(framer.finish());
        for frame in frames {
            if let Some(status) = self.apply_frame(run, &frame) {
                return status;
            }
        }

        debug!(run, "Stream ended without a done event");
        self.finish(run, StreamStatus::Completed, None)
    }

    /// Apply one frame. Returns the final status if reading should stop.
    fn apply_frame(&self, run: u64, frame: &str) -> Option<StreamStatus> {
        let event = parse_frame(frame)?;
        match interpret(&event) {
            StreamAction::Append(text) => {
                if self.append(run, &text) {
                    None
                } else {
                    Some(self.outcome(run))
                }
            }
            StreamAction::Complete => Some(self.finish(run, StreamStatus::Completed, None)),
            StreamAction::Fail(message) => {
                warn!(%message, "Stream reported an error");
                Some(self.finish(run, StreamStatus::Errored, Some(message)))
            }
            StreamAction::Ignore => None,
        }
    }

    /// Append text if `run` is still the live run. Returns false otherwise.
    fn append(&self, run: u64, text: &str) -> bool {
        let state = self.run_state();
        if state.run != run {
            return false;
        }
        self.inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.status == StreamStatus::Streaming {
                snapshot.content.push_str(text);
                true
            } else {
                false
            }
        })
    }

    /// Move `run` into a terminal status, unless it was superseded or
    /// already ended.
    fn finish(&self, run: u64, status: StreamStatus, error: Option<String>) -> StreamStatus {
        let mut state = self.run_state();
        if state.run != run {
            return StreamStatus::Cancelled;
        }
        state.cancel = None;
        self.inner.snapshot.send_if_modified(|snapshot| {
            if snapshot.status != StreamStatus::Streaming {
                return false;
            }
            snapshot.status = status;
            snapshot.error = error;
            true
        });
        self.status()
    }

    /// Status to report for `run`. A superseded run ended as `Cancelled`,
    /// whatever the run that replaced it is doing.
    fn outcome(&self, run: u64) -> StreamStatus {
        if self.run_state().run != run {
            return StreamStatus::Cancelled;
        }
        self.status()
    }
}

impl std::fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingSession")
            .field("status", &self.status())
            .field("run", &self.run_state().run)
            .finish()
    }
}
