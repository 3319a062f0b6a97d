//! Incremental SSE framing: split decoded text on blank lines.

const FRAME_SEPARATOR: &str = "\n\n";

/// Accumulates decoded text and yields complete frames.
///
/// Frames are separated by a blank line. Text after the last separator is
/// kept until more arrives or [`SseFramer::finish`] is called. `\r\n` line
/// endings are normalized to `\n` first, so a separator split across pushes
/// is still found.
#[derive(Debug, Default)]
pub struct SseFramer {
    buffer: String,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `text` and return every frame it completed, in order.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].find(FRAME_SEPARATOR) {
            let end = start + offset;
            frames.push(self.buffer[start..end].to_string());
            start = end + FRAME_SEPARATOR.len();
        }
        if start > 0 {
            self.buffer.drain(..start);
        }
        frames
    }

    /// Take the trailing partial frame at end of stream, if it holds anything
    /// but whitespace.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        if rest.trim().is_empty() {
            None
        } else {
            Some(rest)
        }
    }

    /// Text received but not yet framed.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
