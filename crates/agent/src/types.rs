// Message, tool and stream types exchanged with the agent
//
// AgentChunk is what the agent client streams to us; StreamChunk is what
// ServerClient streams to its own callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool made available to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema for the tool's arguments
    pub parameters: Value,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

impl ToolCallRequest {
    pub fn new(call_id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            args,
        }
    }
}

/// Outcome of one tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub call_id: String,
    /// Human-readable output, if the tool produced any
    #[serde(default)]
    pub result_display: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ToolCallResponse {
    pub fn success(call_id: impl Into<String>, display: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            result_display: Some(display.into()),
            error: None,
        }
    }

    pub fn failure(call_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            result_display: None,
            error: Some(error.into()),
        }
    }

    /// Display text, falling back to the error message
    pub fn output(&self) -> Option<&str> {
        self.result_display.as_deref().or(self.error.as_deref())
    }
}

/// Token counts reported by the model when a turn finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_token_count: Option<u32>,
    pub candidates_token_count: Option<u32>,
}

/// Chunks streamed by an [`AgentClient`](crate::AgentClient)
#[derive(Debug, Clone, PartialEq)]
pub enum AgentChunk {
    /// Text delta
    Content(String),
    ToolCallRequest(ToolCallRequest),
    ToolCallResponse(ToolCallResponse),
    /// Turn complete
    Finished(Option<UsageMetadata>),
}

/// Input for one model turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// User prompt
    Text(String),
    /// Results of the tool calls the model requested in its previous turn
    ToolResults(Vec<ToolCallResponse>),
}

impl AgentMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }
}

/// Per-message options for [`AgentClient::send_message_stream`](crate::AgentClient::send_message_stream)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// The message continues a previous turn (e.g. carries tool results)
    pub is_continuation: bool,
}

impl SendOptions {
    pub fn continuation() -> Self {
        Self {
            is_continuation: true,
        }
    }
}

/// Token usage of one query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u32,
    pub output: u32,
    pub total: u32,
}

impl From<UsageMetadata> for TokenUsage {
    fn from(meta: UsageMetadata) -> Self {
        let input = meta.prompt_token_count.unwrap_or(0);
        let output = meta.candidates_token_count.unwrap_or(0);
        Self {
            input,
            output,
            total: input.saturating_add(output),
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        self.input = self.input.saturating_add(other.input);
        self.output = self.output.saturating_add(other.output);
        self.total = self.total.saturating_add(other.total);
    }
}

/// Result of [`ServerClient::query`](crate::ServerClient::query)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub text: String,
    pub usage: TokenUsage,
    /// Tool calls the model requested (None when it requested none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

/// Chunks streamed by [`ServerClient::query_stream`](crate::ServerClient::query_stream)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamChunk {
    Content { text: String },
    Tool { tool_name: String },
    ToolResult { tool_name: String, result: String },
    Error { error: String },
    Finished,
}

/// Sandbox container status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxStatus {
    Running,
    Stopped,
    NotFound,
}

impl std::fmt::Display for SandboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::NotFound => write!(f, "not_found"),
        }
    }
}
