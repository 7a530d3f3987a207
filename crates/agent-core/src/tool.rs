//! Tool System
//!
//! Extensible tool framework for agent capabilities. Tools are registered
//! at runtime and invoked through the dispatcher, which owns validation,
//! the approval gate, timeouts, and output truncation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::message::Message;

/// Arguments passed to a tool, as a JSON object
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// Soft tool-level failures.
///
/// Every variant becomes a result message the model can react to; none of
/// them abort the turn.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("tool execution denied by user{}", .reason.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Denied { reason: Option<String> },

    #[error("tool timed out after {0}s")]
    Timeout(u64),

    #[error("{0}")]
    Execution(String),
}

/// Tool invocation request recovered from a model response.
///
/// `raw_arguments` is kept as the literal payload text, malformed or not;
/// parsing and validation happen at dispatch time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id; answered by exactly one result
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Argument payload as received (possibly invalid JSON)
    pub raw_arguments: String,
}

impl ToolCall {
    /// Create a call with a generated id
    pub fn new(name: impl Into<String>, raw_arguments: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            raw_arguments: raw_arguments.into(),
        }
    }

    /// Parse the raw payload into a JSON object
    pub fn parsed_arguments(&self) -> Result<ToolArgs, ToolError> {
        match serde_json::from_str::<serde_json::Value>(&self.raw_arguments) {
            Ok(serde_json::Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolError::InvalidArguments(format!(
                "expected a JSON object, got {other}"
            ))),
            Err(err) => Err(ToolError::InvalidArguments(err.to_string())),
        }
    }
}

/// Result from dispatching one tool call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    /// Call id this result answers
    pub id: String,

    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Output text (success) or error text (failure)
    pub output: String,

    /// Whether the output was truncated for context-size management
    pub truncated: bool,
}

impl ToolResult {
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: true,
            output: output.into(),
            truncated: false,
        }
    }

    pub fn failure(call: &ToolCall, error: &ToolError) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            success: false,
            output: format!("ERROR: {error}"),
            truncated: false,
        }
    }

    /// Convert into the tool-role message appended to the conversation
    pub fn to_message(&self) -> Message {
        Message::tool(self.output.clone(), self.name.clone(), self.id.clone())
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON type (string, number, boolean, object, array)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,
}

/// Tool definition schema (shown to the model)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,
}

impl ToolSchema {
    /// Example argument object rendered into the system prompt
    pub fn example_arguments(&self) -> String {
        let fields: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("\"{}\": \"<{}>\"", p.name, p.param_type))
            .collect();
        format!("{{{}}}", fields.join(", "))
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with validated arguments
    async fn execute(&self, args: &ToolArgs) -> Result<String, ToolError>;

    /// Validate arguments before execution (optional)
    fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for param in &self.schema().parameters {
            if param.required && !args.contains_key(&param.name) {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required parameter '{}'",
                    param.name
                )));
            }
        }
        Ok(())
    }
}

/// Registry for available tools; read-only during a turn
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Register a boxed tool
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let schema = tool.schema();
        self.tools.insert(schema.name, tool);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// All schemas, sorted by name for a stable prompt
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Tool names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Render the tool list for the system prompt
    pub fn describe_for_prompt(&self) -> String {
        let mut lines = Vec::new();
        for schema in self.schemas() {
            lines.push(format!(
                "- {}: {}\n  args schema: {}",
                schema.name,
                schema.description,
                schema.example_arguments()
            ));
        }
        lines.join("\n")
    }
}
