// In-memory implementations for examples and testing
//
// These stand in for the agent SDK, the tool scheduler and the Docker
// sandbox so a ServerClient can run without any of them:
// - Doc examples and integration tests
// - Scripting failure sequences for the resilience layer

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::traits::{AgentClient, AgentStream, SandboxExecutor, ToolScheduler};
use crate::types::{
    AgentChunk, AgentMessage, SandboxStatus, SendOptions, ToolCallRequest, ToolCallResponse,
    ToolDeclaration, UsageMetadata,
};

// ============================================================================
// ScriptedAgentClient - Plays back predefined turns
// ============================================================================

/// One scripted model turn
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Stream these chunks
    Chunks(Vec<AgentChunk>),
    /// Fail to open the stream with an [`AgentError::Agent`]
    Fail(String),
    /// Stream these chunks, then yield an [`AgentError::Agent`]
    FailMidStream(Vec<AgentChunk>, String),
}

impl ScriptedTurn {
    /// A text-only turn
    pub fn text(text: impl Into<String>) -> Self {
        Self::Chunks(vec![
            AgentChunk::Content(text.into()),
            AgentChunk::Finished(None),
        ])
    }

    /// A turn that requests tool calls after its text
    pub fn with_tools(text: impl Into<String>, requests: Vec<ToolCallRequest>) -> Self {
        let mut chunks = vec![AgentChunk::Content(text.into())];
        chunks.extend(requests.into_iter().map(AgentChunk::ToolCallRequest));
        chunks.push(AgentChunk::Finished(None));
        Self::Chunks(chunks)
    }

    /// A text-only turn that reports token usage
    pub fn with_usage(text: impl Into<String>, prompt_tokens: u32, output_tokens: u32) -> Self {
        Self::Chunks(vec![
            AgentChunk::Content(text.into()),
            AgentChunk::Finished(Some(UsageMetadata {
                prompt_token_count: Some(prompt_tokens),
                candidates_token_count: Some(output_tokens),
            })),
        ])
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// Agent client that plays back scripted turns in order
///
/// Once the script runs out every turn answers with a fixed text.
/// A second `initialize` fails with [`AgentError::AlreadyInitialized`].
#[derive(Debug, Default)]
pub struct ScriptedAgentClient {
    turns: Arc<RwLock<VecDeque<ScriptedTurn>>>,
    sent: Arc<RwLock<Vec<(AgentMessage, SendOptions)>>>,
    tools: Arc<RwLock<Vec<ToolDeclaration>>>,
    initialized: Arc<RwLock<bool>>,
    resets: Arc<RwLock<u32>>,
}

impl ScriptedAgentClient {
    pub fn new(turns: Vec<ScriptedTurn>) -> Self {
        Self {
            turns: Arc::new(RwLock::new(turns.into())),
            ..Self::default()
        }
    }

    /// Append a turn to the script
    pub async fn push_turn(&self, turn: ScriptedTurn) {
        self.turns.write().await.push_back(turn);
    }

    /// Everything sent so far, one entry per turn
    pub async fn sent(&self) -> Vec<(AgentMessage, SendOptions)> {
        self.sent.read().await.clone()
    }

    /// Text prompts sent so far
    pub async fn messages(&self) -> Vec<String> {
        self.sent
            .read()
            .await
            .iter()
            .filter_map(|(message, _)| match message {
                AgentMessage::Text(text) => Some(text.clone()),
                AgentMessage::ToolResults(_) => None,
            })
            .collect()
    }

    /// Tool results sent back as continuation turns
    pub async fn continuations(&self) -> Vec<Vec<ToolCallResponse>> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|(_, options)| options.is_continuation)
            .filter_map(|(message, _)| match message {
                AgentMessage::ToolResults(results) => Some(results.clone()),
                AgentMessage::Text(_) => None,
            })
            .collect()
    }

    /// Turns started so far, prompts and continuations alike
    pub async fn call_count(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn tools(&self) -> Vec<ToolDeclaration> {
        self.tools.read().await.clone()
    }

    pub async fn is_initialized(&self) -> bool {
        *self.initialized.read().await
    }

    pub async fn reset_count(&self) -> u32 {
        *self.resets.read().await
    }
}

#[async_trait]
impl AgentClient for ScriptedAgentClient {
    async fn initialize(&self) -> Result<()> {
        let mut initialized = self.initialized.write().await;
        if *initialized {
            return Err(AgentError::AlreadyInitialized);
        }
        *initialized = true;
        Ok(())
    }

    async fn set_tools(&self, tools: Vec<ToolDeclaration>) -> Result<()> {
        *self.tools.write().await = tools;
        Ok(())
    }

    async fn send_message_stream(
        &self,
        message: AgentMessage,
        _cancel: CancellationToken,
        _request_id: &str,
        options: SendOptions,
    ) -> Result<AgentStream> {
        self.sent.write().await.push((message, options));

        let turn = self
            .turns
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| ScriptedTurn::text("Scripted response (no more turns configured)"));

        let items: Vec<Result<AgentChunk>> = match turn {
            ScriptedTurn::Chunks(chunks) => chunks.into_iter().map(Ok).collect(),
            ScriptedTurn::Fail(message) => return Err(AgentError::agent(message)),
            ScriptedTurn::FailMidStream(chunks, message) => chunks
                .into_iter()
                .map(Ok)
                .chain(std::iter::once(Err(AgentError::agent(message))))
                .collect(),
        };

        Ok(Box::pin(stream::iter(items)))
    }

    async fn reset_chat(&self) -> Result<()> {
        *self.resets.write().await += 1;
        Ok(())
    }
}

// ============================================================================
// RecordingToolScheduler - Records calls, returns predefined output
// ============================================================================

/// Tool scheduler for testing
///
/// Records every request and answers with the output set for the tool name,
/// or `"<name> ok"` when none was set.
#[derive(Debug, Default)]
pub struct RecordingToolScheduler {
    outputs: Arc<RwLock<HashMap<String, ToolCallResponseTemplate>>>,
    call_log: Arc<RwLock<Vec<ToolCallRequest>>>,
}

#[derive(Debug, Clone)]
enum ToolCallResponseTemplate {
    Display(String),
    Error(String),
}

impl RecordingToolScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the display output for a tool
    pub async fn set_output(&self, tool_name: impl Into<String>, output: impl Into<String>) {
        self.outputs
            .write()
            .await
            .insert(tool_name.into(), ToolCallResponseTemplate::Display(output.into()));
    }

    /// Make a tool report an error in its response
    pub async fn set_error(&self, tool_name: impl Into<String>, error: impl Into<String>) {
        self.outputs
            .write()
            .await
            .insert(tool_name.into(), ToolCallResponseTemplate::Error(error.into()));
    }

    pub async fn calls(&self) -> Vec<ToolCallRequest> {
        self.call_log.read().await.clone()
    }
}

#[async_trait]
impl ToolScheduler for RecordingToolScheduler {
    async fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>> {
        let outputs = self.outputs.read().await;
        let responses = requests
            .iter()
            .map(|request| match outputs.get(&request.name) {
                Some(ToolCallResponseTemplate::Display(output)) => {
                    ToolCallResponse::success(&request.call_id, output)
                }
                Some(ToolCallResponseTemplate::Error(error)) => {
                    ToolCallResponse::failure(&request.call_id, error)
                }
                None => ToolCallResponse::success(&request.call_id, format!("{} ok", request.name)),
            })
            .collect();
        drop(outputs);

        self.call_log.write().await.extend(requests);
        Ok(responses)
    }
}

// ============================================================================
// InMemorySandbox - Pretends to run shell tools in a container
// ============================================================================

/// Sandbox executor for testing
///
/// Starts out running; `cleanup` stops it, after which tool calls fail.
#[derive(Debug)]
pub struct InMemorySandbox {
    status: Arc<RwLock<SandboxStatus>>,
    call_log: Arc<RwLock<Vec<ToolCallRequest>>>,
}

impl Default for InMemorySandbox {
    fn default() -> Self {
        Self {
            status: Arc::new(RwLock::new(SandboxStatus::Running)),
            call_log: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl InMemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn calls(&self) -> Vec<ToolCallRequest> {
        self.call_log.read().await.clone()
    }
}

#[async_trait]
impl SandboxExecutor for InMemorySandbox {
    async fn execute_tools(
        &self,
        requests: Vec<ToolCallRequest>,
        _cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>> {
        let status = *self.status.read().await;
        if status != SandboxStatus::Running {
            return Err(AgentError::sandbox(format!("sandbox is {status}")));
        }

        let responses = requests
            .iter()
            .map(|request| {
                let command = request
                    .args
                    .get("command")
                    .and_then(|c| c.as_str())
                    .unwrap_or(request.name.as_str());
                ToolCallResponse::success(&request.call_id, format!("sandbox: {command}"))
            })
            .collect();

        self.call_log.write().await.extend(requests);
        Ok(responses)
    }

    async fn status(&self) -> SandboxStatus {
        *self.status.read().await
    }

    async fn cleanup(&self) -> Result<()> {
        *self.status.write().await = SandboxStatus::Stopped;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_agent_plays_turns_in_order() {
        let agent = ScriptedAgentClient::new(vec![
            ScriptedTurn::text("first"),
            ScriptedTurn::fail("503 Service Unavailable"),
        ]);

        let mut stream = agent
            .send_message_stream(
                AgentMessage::text("hi"),
                CancellationToken::new(),
                "r1",
                SendOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            AgentChunk::Content("first".to_string())
        );

        let err = agent
            .send_message_stream(
                AgentMessage::ToolResults(vec![ToolCallResponse::success("c1", "done")]),
                CancellationToken::new(),
                "r2",
                SendOptions::continuation(),
            )
            .await
            .err()
            .unwrap();
        assert!(err.is_retryable());
        assert_eq!(agent.call_count().await, 2);
        assert_eq!(agent.messages().await, vec!["hi"]);
        assert_eq!(
            agent.continuations().await,
            vec![vec![ToolCallResponse::success("c1", "done")]]
        );
    }

    #[tokio::test]
    async fn test_scripted_agent_rejects_second_initialize() {
        let agent = ScriptedAgentClient::default();
        agent.initialize().await.unwrap();
        assert!(matches!(
            agent.initialize().await,
            Err(AgentError::AlreadyInitialized)
        ));
    }

    #[tokio::test]
    async fn test_recording_scheduler() {
        let scheduler = RecordingToolScheduler::new();
        scheduler.set_output("read_file", "contents").await;
        scheduler.set_error("write_file", "read-only").await;

        let responses = scheduler
            .schedule(
                vec![
                    ToolCallRequest::new("1", "read_file", json!({})),
                    ToolCallRequest::new("2", "write_file", json!({})),
                    ToolCallRequest::new("3", "glob", json!({})),
                ],
                CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(responses[0].output(), Some("contents"));
        assert_eq!(responses[1].error.as_deref(), Some("read-only"));
        assert_eq!(responses[2].output(), Some("glob ok"));
        assert_eq!(scheduler.calls().await.len(), 3);
    }

    #[tokio::test]
    async fn test_sandbox_stops_after_cleanup() {
        let sandbox = InMemorySandbox::new();
        let request = ToolCallRequest::new("1", "shell", json!({"command": "ls"}));

        let responses = sandbox
            .execute_tools(vec![request.clone()], CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(responses[0].output(), Some("sandbox: ls"));

        sandbox.cleanup().await.unwrap();
        assert_eq!(sandbox.status().await, SandboxStatus::Stopped);
        assert!(matches!(
            sandbox
                .execute_tools(vec![request], CancellationToken::new())
                .await,
            Err(AgentError::Sandbox(_))
        ));
    }
}
