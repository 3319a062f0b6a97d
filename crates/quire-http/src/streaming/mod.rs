//! Server-sent-event streaming.
//!
//! Bytes from the network pass through three stages: [`Utf8Decoder`] turns
//! chunks into text, [`SseFramer`] cuts the text into frames on blank lines,
//! and [`parse_frame`] / [`interpret`] turn each frame into an action for the
//! [`StreamingSession`] accumulator. The first three are plain synchronous
//! types and can be driven without a network.

mod decoder;
mod event;
mod framer;
mod session;

pub use decoder::Utf8Decoder;
pub use event::{
    DEFAULT_EVENT_TYPE, EVENT_DONE, EVENT_ERROR, GENERIC_STREAM_ERROR, SseEvent, StreamAction,
    interpret, parse_frame,
};
pub use framer::SseFramer;
pub use session::{GENERIC_START_ERROR, StreamSnapshot, StreamStatus, StreamingSession};
