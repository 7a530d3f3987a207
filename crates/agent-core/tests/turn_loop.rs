//! End-to-end turn loop tests with scripted providers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use agent_core::agent::{Agent, AgentConfig, CancelToken, TurnSink};
use agent_core::approval::{
    ApprovalDecision, ApprovalPrompt, ApprovalStore, MemoryApprovalStore,
};
use agent_core::dispatch::ToolDispatcher;
use agent_core::error::{AgentError, Result};
use agent_core::message::{Conversation, Message, Role, TokenUsage};
use agent_core::provider::{ChatProvider, FragmentStream, GenerationOptions, ProviderInfo, RawFragment};
use agent_core::reasoning::Channel;
use agent_core::tool::{
    ParameterSchema, Tool, ToolArgs, ToolCall, ToolError, ToolRegistry, ToolResult, ToolSchema,
};

/// Provider that plays back pre-scripted fragment responses in order
struct ScriptedProvider {
    responses: Mutex<VecDeque<Vec<RawFragment>>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<Vec<RawFragment>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "scripted".into(),
            supports_tools: true,
        }
    }

    async fn stream_chat(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<FragmentStream> {
        let fragments = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| vec![RawFragment::Text("out of script".into()), RawFragment::Done { usage: None }]);
        Ok(Box::pin(futures::stream::iter(fragments.into_iter().map(Ok))))
    }
}

/// Provider that answers every request with the same tool call, forever
struct RelentlessToolProvider;

#[async_trait]
impl ChatProvider for RelentlessToolProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "relentless".into(),
            supports_tools: true,
        }
    }

    async fn stream_chat(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<FragmentStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(RawFragment::ToolCallDelta {
                index: 0,
                id: None,
                name: Some("probe".into()),
                arguments: "{}".into(),
            }),
            Ok(RawFragment::Done { usage: None }),
        ])))
    }
}

/// Provider whose stream dies mid-response
struct FlakyProvider;

#[async_trait]
impl ChatProvider for FlakyProvider {
    fn info(&self) -> ProviderInfo {
        ProviderInfo {
            name: "flaky".into(),
            supports_tools: false,
        }
    }

    async fn stream_chat(
        &self,
        _messages: &[Message],
        _options: &GenerationOptions,
    ) -> Result<FragmentStream> {
        Ok(Box::pin(futures::stream::iter(vec![
            Ok(RawFragment::Text("Hel".into())),
            Err(AgentError::Transport("connection reset by peer".into())),
        ])))
    }
}

struct ProbeTool {
    runs: Arc<AtomicUsize>,
    output: String,
}

#[async_trait]
impl Tool for ProbeTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "probe".into(),
            description: "Probes things".into(),
            parameters: vec![],
        }
    }

    async fn execute(&self, _args: &ToolArgs) -> std::result::Result<String, ToolError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

struct ShellStandIn {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl Tool for ShellStandIn {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "run_shell".into(),
            description: "Execute a shell command".into(),
            parameters: vec![ParameterSchema {
                name: "command".into(),
                param_type: "string".into(),
                description: "Shell command".into(),
                required: true,
            }],
        }
    }

    async fn execute(&self, args: &ToolArgs) -> std::result::Result<String, ToolError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let command = args.get("command").and_then(|v| v.as_str()).unwrap_or("");
        Ok(format!("exit code 0\n(ran: {command})\nfoo.txt"))
    }
}

/// Prompt that answers "once" and counts how often it was consulted
struct OncePrompt {
    asked: AtomicUsize,
}

#[async_trait]
impl ApprovalPrompt for OncePrompt {
    async fn prompt_decision(&self, _tool: &str, _args: &str) -> ApprovalDecision {
        self.asked.fetch_add(1, Ordering::SeqCst);
        ApprovalDecision::Once
    }
}

#[derive(Default)]
struct CapturingSink {
    chunks: Vec<(Channel, String)>,
    calls: Vec<String>,
    results: Vec<bool>,
}

impl TurnSink for CapturingSink {
    fn on_text(&mut self, channel: Channel, text: &str) {
        self.chunks.push((channel, text.to_string()));
    }

    fn on_tool_call(&mut self, call: &ToolCall) {
        self.calls.push(call.name.clone());
    }

    fn on_tool_result(&mut self, result: &ToolResult) {
        self.results.push(result.success);
    }
}

fn agent_with(
    provider: Arc<dyn ChatProvider>,
    registry: ToolRegistry,
    approvals: Arc<dyn ApprovalStore>,
    prompt: Arc<dyn ApprovalPrompt>,
    max_tool_rounds: usize,
) -> Agent {
    let dispatcher = ToolDispatcher::new(Arc::new(registry), approvals, prompt);
    let config = AgentConfig {
        max_tool_rounds,
        ..AgentConfig::default()
    };
    Agent::new(provider, dispatcher, config)
}

#[tokio::test]
async fn test_full_tool_round_trip() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![
            RawFragment::ToolCallDelta {
                index: 0,
                id: Some("call-1".into()),
                name: Some("run_shell".into()),
                arguments: "{\"command\": \"ls\"}".into(),
            },
            RawFragment::Done { usage: None },
        ],
        vec![
            RawFragment::Text("The directory contains foo.txt".into()),
            RawFragment::Done {
                usage: Some(TokenUsage {
                    prompt_tokens: 50,
                    completion_tokens: 8,
                    total_tokens: 58,
                }),
            },
        ],
    ]));

    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ShellStandIn { runs: runs.clone() });
    let prompt = Arc::new(OncePrompt {
        asked: AtomicUsize::new(0),
    });

    let agent = agent_with(
        provider,
        registry,
        Arc::new(MemoryApprovalStore::new()),
        prompt.clone(),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("list files"));

    let mut sink = CapturingSink::default();
    let report = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect("turn completes");

    assert_eq!(report.tool_rounds, 1);
    assert!(!report.cancelled);
    assert_eq!(report.answer, "The directory contains foo.txt");

    // tool was not pre-approved: exactly one decision, exactly one run
    assert_eq!(prompt.asked.load(Ordering::SeqCst), 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    // history: system, user, assistant call, tool result, final assistant
    let messages = conversation.messages();
    assert_eq!(messages.len(), 5);
    assert_eq!(messages[0].role, Role::System);
    assert_eq!(messages[1].role, Role::User);
    assert_eq!(messages[2].role, Role::Assistant);
    assert_eq!(messages[2].tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(messages[3].role, Role::Tool);
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call-1"));
    assert_eq!(messages[4].role, Role::Assistant);
    assert_eq!(messages[4].usage.map(|u| u.total_tokens), Some(58));

    assert_eq!(sink.calls, vec!["run_shell"]);
    assert_eq!(sink.results, vec![true]);
}

#[tokio::test]
async fn test_loop_limit_fails_after_exact_round_trips() {
    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ProbeTool {
        runs: runs.clone(),
        output: "probed".into(),
    });

    let max = 3;
    let agent = agent_with(
        Arc::new(RelentlessToolProvider),
        registry,
        Arc::new(MemoryApprovalStore::with_allowed(&["probe"])),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        max,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("go"));

    let mut sink = CapturingSink::default();
    let err = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect_err("loop limit must trip");

    match err {
        AgentError::LoopLimit(limit) => assert_eq!(limit, max),
        other => panic!("expected loop limit, got {other}"),
    }

    // exactly `max` round-trips ran, never fewer, never more
    assert_eq!(runs.load(Ordering::SeqCst), max);

    // every dispatched call id was answered; the over-limit response was
    // never recorded
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2 + 2 * max);
    for pair in messages[2..].chunks(2) {
        assert_eq!(pair[0].role, Role::Assistant);
        assert_eq!(pair[1].role, Role::Tool);
        assert_eq!(pair[0].tool_call_id, pair[1].tool_call_id);
    }
}

#[tokio::test]
async fn test_text_fallback_recovers_tool_call() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![
            RawFragment::Text("<tool name=\"run_shell\">\n{\"command\": \"pwd\"}\n</tool>".into()),
            RawFragment::Done { usage: None },
        ],
        vec![
            RawFragment::Text("You are in /tmp".into()),
            RawFragment::Done { usage: None },
        ],
    ]));

    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ShellStandIn { runs: runs.clone() });

    let agent = agent_with(
        provider,
        registry,
        Arc::new(MemoryApprovalStore::with_allowed(&["run_shell"])),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("where am I?"));

    let mut sink = CapturingSink::default();
    let report = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect("turn completes");

    assert_eq!(report.tool_rounds, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert_eq!(report.answer, "You are in /tmp");
}

#[tokio::test]
async fn test_simultaneous_calls_each_answered_before_resubmission() {
    let provider = Arc::new(ScriptedProvider::new(vec![
        vec![
            RawFragment::ToolCallDelta {
                index: 0,
                id: Some("call-a".into()),
                name: Some("probe".into()),
                arguments: "{}".into(),
            },
            RawFragment::ToolCallDelta {
                index: 1,
                id: Some("call-b".into()),
                name: Some("probe".into()),
                arguments: "{}".into(),
            },
            RawFragment::Done { usage: None },
        ],
        vec![
            RawFragment::Text("both done".into()),
            RawFragment::Done { usage: None },
        ],
    ]));

    let runs = Arc::new(AtomicUsize::new(0));
    let mut registry = ToolRegistry::new();
    registry.register(ProbeTool {
        runs: runs.clone(),
        output: "ok".into(),
    });

    let agent = agent_with(
        provider,
        registry,
        Arc::new(MemoryApprovalStore::with_allowed(&["probe"])),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("probe twice"));

    let mut sink = CapturingSink::default();
    let report = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect("turn completes");

    // one round-trip, two sequential dispatches
    assert_eq!(report.tool_rounds, 1);
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(sink.calls.len(), 2);

    let messages = conversation.messages();
    // system, user, two assistant calls, two tool results, final answer
    assert_eq!(messages.len(), 7);
    let tool_ids: Vec<_> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(tool_ids, vec!["call-a", "call-b"]);
}

#[tokio::test]
async fn test_transport_failure_preserves_history() {
    let agent = agent_with(
        Arc::new(FlakyProvider),
        ToolRegistry::new(),
        Arc::new(MemoryApprovalStore::new()),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("hello"));

    let mut sink = CapturingSink::default();
    let err = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect_err("stream failure is turn-fatal");
    assert!(matches!(err, AgentError::Transport(_)));

    // no partial assistant message was appended; safe to retry
    let messages = conversation.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::User);
}

#[tokio::test]
async fn test_reasoning_excluded_from_answer() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        RawFragment::Text("<think>the capital of France".into()),
        RawFragment::Text(" is well known</think>".into()),
        RawFragment::Text("Paris".into()),
        RawFragment::Done { usage: None },
    ]]));

    let agent = agent_with(
        provider,
        ToolRegistry::new(),
        Arc::new(MemoryApprovalStore::new()),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("capital of France?"));

    let mut sink = CapturingSink::default();
    let report = agent
        .run_turn(&mut conversation, &mut sink, &CancelToken::new())
        .await
        .expect("turn completes");

    assert_eq!(report.answer, "Paris");

    // the raw assistant message keeps the reasoning markers for the record
    let last = conversation.last().expect("assistant message");
    assert!(last.content.contains("<think>"));
    assert!(last.content.ends_with("Paris"));

    let reasoning: String = sink
        .chunks
        .iter()
        .filter(|(c, _)| *c == Channel::Reasoning)
        .map(|(_, t)| t.as_str())
        .collect();
    assert!(reasoning.contains("well known"));
}

#[tokio::test]
async fn test_cancelled_turn_appends_nothing() {
    let provider = Arc::new(ScriptedProvider::new(vec![vec![
        RawFragment::Text("will never finish".into()),
        RawFragment::Done { usage: None },
    ]]));

    let agent = agent_with(
        provider,
        ToolRegistry::new(),
        Arc::new(MemoryApprovalStore::new()),
        Arc::new(OncePrompt {
            asked: AtomicUsize::new(0),
        }),
        10,
    );

    let mut conversation = Conversation::new();
    conversation.push(Message::user("hello"));

    let cancel = CancelToken::new();
    cancel.cancel();

    let mut sink = CapturingSink::default();
    let report = agent
        .run_turn(&mut conversation, &mut sink, &cancel)
        .await
        .expect("cancellation is not an error");

    assert!(report.cancelled);
    assert_eq!(conversation.len(), 2);
}
