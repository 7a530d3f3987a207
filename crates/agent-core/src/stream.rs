//! Stream Normalization
//!
//! Converts the raw fragment sequence of one provider request into a
//! uniform event stream. Structured tool calls may arrive split across
//! fragments (partial JSON argument text keyed by call index); they are
//! buffered and emitted whole once the stream reports completion. The
//! normalizer never invents a tool call from free text; that fallback
//! lives in the orchestrator and only runs when this path produced none.

use std::collections::{BTreeMap, VecDeque};

use futures::StreamExt;

use crate::message::TokenUsage;
use crate::provider::{FragmentStream, RawFragment};
use crate::tool::ToolCall;

/// Normalized event produced while consuming one provider stream
#[derive(Clone, Debug)]
pub enum StreamEvent {
    /// Incremental response text, in arrival order
    TextDelta(String),

    /// Fully-buffered tool invocation request
    ToolCallRequest(ToolCall),

    /// Successful end of stream; emitted exactly once
    TurnComplete { usage: Option<TokenUsage> },

    /// Transport or framing failure; always the final event
    StreamError { detail: String },
}

#[derive(Default)]
struct PartialCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// Forward-only normalizer over one fragment stream.
///
/// Yields events until a `TurnComplete` or `StreamError`, then `None`.
pub struct StreamNormalizer {
    fragments: FragmentStream,
    partial_calls: BTreeMap<usize, PartialCall>,
    pending: VecDeque<StreamEvent>,
    finished: bool,
}

impl StreamNormalizer {
    pub fn new(fragments: FragmentStream) -> Self {
        Self {
            fragments,
            partial_calls: BTreeMap::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    /// Next normalized event, or `None` once the sequence has ended
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }
            if self.finished {
                return None;
            }

            match self.fragments.next().await {
                Some(Ok(RawFragment::Text(text))) => {
                    if text.is_empty() {
                        continue;
                    }
                    return Some(StreamEvent::TextDelta(text));
                }
                Some(Ok(RawFragment::ToolCallDelta {
                    index,
                    id,
                    name,
                    arguments,
                })) => {
                    let partial = self.partial_calls.entry(index).or_default();
                    if let Some(id) = id {
                        partial.id.get_or_insert(id);
                    }
                    if let Some(name) = name {
                        partial.name.get_or_insert(name);
                    }
                    partial.arguments.push_str(&arguments);
                }
                Some(Ok(RawFragment::Done { usage })) => {
                    self.finished = true;
                    self.flush_calls();
                    self.pending.push_back(StreamEvent::TurnComplete { usage });
                }
                Some(Err(err)) => {
                    self.finished = true;
                    self.partial_calls.clear();
                    return Some(StreamEvent::StreamError {
                        detail: err.to_string(),
                    });
                }
                None => {
                    // abrupt termination without an explicit done marker
                    self.finished = true;
                    self.partial_calls.clear();
                    return Some(StreamEvent::StreamError {
                        detail: "stream ended before completion".into(),
                    });
                }
            }
        }
    }

    fn flush_calls(&mut self) {
        for (index, partial) in std::mem::take(&mut self.partial_calls) {
            let Some(name) = partial.name else {
                tracing::warn!(index, "discarding streamed tool call without a name");
                continue;
            };
            let id = partial
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            self.pending.push_back(StreamEvent::ToolCallRequest(ToolCall {
                id,
                name,
                raw_arguments: partial.arguments,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AgentError;

    fn fragment_stream(
        items: Vec<crate::error::Result<RawFragment>>,
    ) -> FragmentStream {
        Box::pin(futures::stream::iter(items))
    }

    async fn collect(mut normalizer: StreamNormalizer) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = normalizer.next_event().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_text_concatenation_is_lossless() {
        let stream = fragment_stream(vec![
            Ok(RawFragment::Text("Hel".into())),
            Ok(RawFragment::Text("".into())),
            Ok(RawFragment::Text("lo, wor".into())),
            Ok(RawFragment::Text("ld".into())),
            Ok(RawFragment::Done { usage: None }),
        ]);

        let events = collect(StreamNormalizer::new(stream)).await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello, world");

        let completes = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::TurnComplete { .. }))
            .count();
        assert_eq!(completes, 1);
        assert!(matches!(events.last(), Some(StreamEvent::TurnComplete { .. })));
    }

    #[tokio::test]
    async fn test_tool_call_arguments_buffered_across_fragments() {
        let stream = fragment_stream(vec![
            Ok(RawFragment::ToolCallDelta {
                index: 0,
                id: Some("call-1".into()),
                name: Some("run_shell".into()),
                arguments: "{\"comm".into(),
            }),
            Ok(RawFragment::ToolCallDelta {
                index: 0,
                id: None,
                name: None,
                arguments: "and\": \"ls\"}".into(),
            }),
            Ok(RawFragment::Done { usage: None }),
        ]);

        let events = collect(StreamNormalizer::new(stream)).await;
        assert_eq!(events.len(), 2);

        match &events[0] {
            StreamEvent::ToolCallRequest(call) => {
                assert_eq!(call.id, "call-1");
                assert_eq!(call.name, "run_shell");
                assert_eq!(call.raw_arguments, "{\"command\": \"ls\"}");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_pass_through_raw() {
        let stream = fragment_stream(vec![
            Ok(RawFragment::ToolCallDelta {
                index: 0,
                id: Some("call-1".into()),
                name: Some("run_shell".into()),
                arguments: "{not valid json".into(),
            }),
            Ok(RawFragment::Done { usage: None }),
        ]);

        let events = collect(StreamNormalizer::new(stream)).await;
        match &events[0] {
            StreamEvent::ToolCallRequest(call) => {
                assert_eq!(call.raw_arguments, "{not valid json");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_multiple_calls_keep_index_order() {
        let stream = fragment_stream(vec![
            Ok(RawFragment::ToolCallDelta {
                index: 1,
                id: Some("b".into()),
                name: Some("second".into()),
                arguments: "{}".into(),
            }),
            Ok(RawFragment::ToolCallDelta {
                index: 0,
                id: Some("a".into()),
                name: Some("first".into()),
                arguments: "{}".into(),
            }),
            Ok(RawFragment::Done { usage: None }),
        ]);

        let events = collect(StreamNormalizer::new(stream)).await;
        let names: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::ToolCallRequest(c) => Some(c.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_transport_failure_ends_sequence() {
        let stream = fragment_stream(vec![
            Ok(RawFragment::Text("partial".into())),
            Err(AgentError::Transport("connection reset".into())),
            Ok(RawFragment::Text("never seen".into())),
        ]);

        let mut normalizer = StreamNormalizer::new(stream);
        let first = normalizer.next_event().await;
        assert!(matches!(first, Some(StreamEvent::TextDelta(_))));

        let second = normalizer.next_event().await;
        match second {
            Some(StreamEvent::StreamError { detail }) => {
                assert!(detail.contains("connection reset"));
            }
            other => panic!("expected stream error, got {other:?}"),
        }

        assert!(normalizer.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_abrupt_end_surfaces_stream_error() {
        let stream = fragment_stream(vec![Ok(RawFragment::Text("cut off".into()))]);

        let events = collect(StreamNormalizer::new(stream)).await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], StreamEvent::StreamError { .. }));
    }

    #[tokio::test]
    async fn test_usage_carried_on_completion() {
        let stream = fragment_stream(vec![Ok(RawFragment::Done {
            usage: Some(TokenUsage {
                prompt_tokens: 7,
                completion_tokens: 3,
                total_tokens: 10,
            }),
        })]);

        let events = collect(StreamNormalizer::new(stream)).await;
        match &events[0] {
            StreamEvent::TurnComplete { usage: Some(usage) } => {
                assert_eq!(usage.total_tokens, 10);
            }
            other => panic!("expected completion with usage, got {other:?}"),
        }
    }
}
