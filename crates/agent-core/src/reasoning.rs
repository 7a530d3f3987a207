//! Reasoning Channel Splitter
//!
//! Classifies streamed text into a reasoning channel and an answer channel
//! by tracking the `<think>`/`</think>` marker pair. Markers may arrive
//! split across fragment boundaries, so a short suffix that could be the
//! start of a marker is held back until the next delta decides it.
//!
//! Pure text transformation with one bit of state; the concatenation of
//! all emitted chunks always equals the input.

/// Destination channel for a classified text chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    /// Model deliberation, rendered dimmed and excluded from the answer
    Reasoning,
    /// Final answer text
    Answer,
}

/// Opening reasoning marker
pub const THINK_OPEN: &str = "<think>";
/// Closing reasoning marker
pub const THINK_CLOSE: &str = "</think>";

/// Splits a turn's text deltas into channel-tagged chunks.
///
/// The marker text itself is emitted on the reasoning channel so that the
/// chunk sequence stays lossless for display and storage.
#[derive(Default)]
pub struct ReasoningSplitter {
    inside_reasoning: bool,
    buffer: String,
}

impl ReasoningSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify one delta, returning (channel, text) chunks in order
    pub fn push(&mut self, delta: &str) -> Vec<(Channel, String)> {
        self.advance(delta, false)
    }

    /// Flush any held-back text at end of turn and reset the marker state
    pub fn finish(&mut self) -> Vec<(Channel, String)> {
        let chunks = self.advance("", true);
        self.inside_reasoning = false;
        chunks
    }

    fn advance(&mut self, delta: &str, finalize: bool) -> Vec<(Channel, String)> {
        self.buffer.push_str(delta);
        let mut chunks: Vec<(Channel, String)> = Vec::new();

        while !self.buffer.is_empty() {
            let (marker, channel) = if self.inside_reasoning {
                (THINK_CLOSE, Channel::Reasoning)
            } else {
                (THINK_OPEN, Channel::Answer)
            };

            if let Some(idx) = self.buffer.find(marker) {
                if idx > 0 {
                    let text: String = self.buffer.drain(..idx).collect();
                    chunks.push((channel, text));
                }
                let marker_text: String = self.buffer.drain(..marker.len()).collect();
                chunks.push((Channel::Reasoning, marker_text));
                self.inside_reasoning = !self.inside_reasoning;
            } else if finalize {
                chunks.push((channel, std::mem::take(&mut self.buffer)));
            } else {
                // hold back a suffix that might be the start of the marker
                let keep = partial_marker_suffix(&self.buffer, marker);
                let flush = self.buffer.len() - keep;
                if flush == 0 {
                    break;
                }
                let text: String = self.buffer.drain(..flush).collect();
                chunks.push((channel, text));
            }
        }

        chunks
    }
}

/// Length of the longest proper marker prefix that the text ends with
fn partial_marker_suffix(text: &str, marker: &str) -> usize {
    let max_check = text.len().min(marker.len() - 1);
    for size in (1..=max_check).rev() {
        if text.ends_with(&marker[..size]) {
            return size;
        }
    }
    0
}
