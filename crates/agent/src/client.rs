// Server-side agent client
//
// Wraps an AgentClient with the resilience layer and runs the tools the
// model asks for:
// - One model turn (send + collect the stream) is the guarded unit of work
// - Shell tools go to the sandbox, everything else to the tool scheduler
// - Tool calls run once; they are never retried
// - Tool results go back to the model as a continuation turn

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use teamflow_resilience::{with_timeout, CircuitState, ResilientCall};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{AgentError, Result};
use crate::traits::{AgentClient, SandboxExecutor, ToolScheduler};
use crate::types::{
    AgentChunk, AgentMessage, QueryResult, SandboxStatus, SendOptions, StreamChunk, TokenUsage,
    ToolCallRequest, ToolCallResponse, ToolDeclaration,
};

/// Tool names executed inside the sandbox when one is attached
pub const SHELL_TOOLS: &[&str] = &["run_shell_command", "execute_bash", "shell"];

/// Name of the breaker guarding model turns
const AGENT_BREAKER: &str = "core-agent";

/// Buffered chunks between the streaming task and its consumer
const STREAM_BUFFER: usize = 64;

pub fn is_shell_tool(name: &str) -> bool {
    SHELL_TOOLS.contains(&name)
}

/// Everything one model turn produced
#[derive(Debug, Default)]
struct Turn {
    text: String,
    tool_requests: Vec<ToolCallRequest>,
    usage: TokenUsage,
}

/// Routes tool calls to the sandbox or the scheduler
#[derive(Clone)]
struct ToolRouter {
    scheduler: Arc<dyn ToolScheduler>,
    sandbox: Option<Arc<dyn SandboxExecutor>>,
}

impl ToolRouter {
    async fn execute(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>> {
        let mut results = Vec::with_capacity(requests.len());

        let other = match &self.sandbox {
            Some(sandbox) => {
                let (shell, other): (Vec<_>, Vec<_>) =
                    requests.into_iter().partition(|r| is_shell_tool(&r.name));
                if !shell.is_empty() {
                    debug!(count = shell.len(), "executing shell tools in sandbox");
                    results.extend(sandbox.execute_tools(shell, cancel.clone()).await?);
                }
                other
            }
            None => requests,
        };

        if !other.is_empty() {
            debug!(count = other.len(), "scheduling tool calls");
            results.extend(self.scheduler.schedule(other, cancel).await?);
        }

        Ok(results)
    }
}

/// Send one message and collect the model's turn
async fn collect_turn(
    agent: &dyn AgentClient,
    message: AgentMessage,
    options: SendOptions,
    cancel: &CancellationToken,
    request_id: &str,
) -> Result<Turn> {
    let mut stream = agent
        .send_message_stream(message, cancel.clone(), request_id, options)
        .await?;
    let mut turn = Turn::default();

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
            chunk = stream.next() => chunk,
        };

        match chunk.transpose()? {
            Some(AgentChunk::Content(text)) => turn.text.push_str(&text),
            Some(AgentChunk::ToolCallRequest(request)) => turn.tool_requests.push(request),
            // Tools the agent ran on its own are already reflected in its text
            Some(AgentChunk::ToolCallResponse(_)) => {}
            Some(AgentChunk::Finished(usage)) => {
                if let Some(usage) = usage {
                    turn.usage = usage.into();
                }
                break;
            }
            None => break,
        }
    }

    Ok(turn)
}

/// Await `future`, bounded by `limit` when one is set
async fn bounded<T, F>(limit: Option<Duration>, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => with_timeout(limit, future).await,
        None => future.await,
    }
}

/// Resilient server-side client for the conversational agent
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use teamflow_agent::memory::{RecordingToolScheduler, ScriptedAgentClient, ScriptedTurn};
/// use teamflow_agent::{ServerClient, ServerConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> teamflow_agent::Result<()> {
/// let agent = Arc::new(ScriptedAgentClient::new(vec![ScriptedTurn::text("Hello!")]));
/// let client = ServerClient::new(
///     ServerConfig::new("sk-test"),
///     agent,
///     Arc::new(RecordingToolScheduler::new()),
/// )?;
///
/// client.initialize().await?;
/// let result = client.query("Say hello").await?;
/// assert_eq!(result.text, "Hello!");
/// # Ok(())
/// # }
/// ```
pub struct ServerClient {
    config: ServerConfig,
    agent: Arc<dyn AgentClient>,
    tools: ToolRouter,
    resilience: Arc<ResilientCall>,
}

impl ServerClient {
    /// Create a client without a sandbox; all tools go to `scheduler`
    pub fn new(
        config: ServerConfig,
        agent: Arc<dyn AgentClient>,
        scheduler: Arc<dyn ToolScheduler>,
    ) -> Result<Self> {
        config.validate()?;
        let resilience = Arc::new(ResilientCall::from_config(
            AGENT_BREAKER,
            &config.resilience,
        ));

        Ok(Self {
            config,
            agent,
            tools: ToolRouter {
                scheduler,
                sandbox: None,
            },
            resilience,
        })
    }

    /// Attach a sandbox for shell tools (ignored when `enable_sandbox` is false)
    pub fn with_sandbox(mut self, sandbox: Arc<dyn SandboxExecutor>) -> Self {
        if self.config.enable_sandbox {
            self.tools.sandbox = Some(sandbox);
        } else {
            debug!(session_id = %self.config.session_id, "sandbox disabled, not attaching");
        }
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn resilience(&self) -> &ResilientCall {
        &self.resilience
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.resilience.state()
    }

    pub fn has_sandbox(&self) -> bool {
        self.tools.sandbox.is_some()
    }

    /// Initialize the agent client; a client that is already initialized is fine
    pub async fn initialize(&self) -> Result<()> {
        match self.agent.initialize().await {
            Ok(()) => {}
            Err(AgentError::AlreadyInitialized) => {
                info!(session_id = %self.config.session_id, "agent client already initialized, skipping");
            }
            Err(e) => return Err(e),
        }

        info!(
            session_id = %self.config.session_id,
            model = %self.config.model,
            sandbox = self.has_sandbox(),
            "server client initialized"
        );
        Ok(())
    }

    pub async fn set_tools(&self, tools: Vec<ToolDeclaration>) -> Result<()> {
        self.agent.set_tools(tools).await
    }

    /// Run one model turn through the breaker and retry policy
    async fn guarded_turn(
        &self,
        message: AgentMessage,
        options: SendOptions,
        cancel: &CancellationToken,
        request_id: &str,
    ) -> Result<Turn> {
        let agent = self.agent.as_ref();
        let message = &message;

        self.resilience
            .execute(
                || collect_turn(agent, message.clone(), options, cancel, request_id),
                AgentError::is_retryable,
            )
            .await
            .inspect_err(|e| warn!(%request_id, error = %e, "model turn failed"))
    }

    /// Run one prompt to completion
    ///
    /// The model turn runs through the breaker and retry policy. Requested tools
    /// then run once and their output is appended to the text. The tool results
    /// are sent back to the model as a continuation turn (also guarded) whose
    /// text is appended last.
    pub async fn query(&self, prompt: &str) -> Result<QueryResult> {
        let cancel = CancellationToken::new();
        let request_id = format!("query-{}", Uuid::now_v7());
        info!(session_id = %self.config.session_id, %request_id, "starting query");

        let turn = self
            .guarded_turn(
                AgentMessage::text(prompt),
                SendOptions::default(),
                &cancel,
                &request_id,
            )
            .await?;

        let mut text = turn.text;
        let mut usage = turn.usage;
        if turn.tool_requests.is_empty() {
            return Ok(QueryResult {
                text,
                usage,
                tool_calls: None,
            });
        }

        let results = self
            .tools
            .execute(turn.tool_requests.clone(), cancel.clone())
            .await
            .inspect_err(|e| warn!(%request_id, error = %e, "tool execution failed"))?;

        let tool_output = results
            .iter()
            .filter_map(ToolCallResponse::output)
            .filter(|output| !output.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        if !tool_output.is_empty() {
            text.push_str("\n\n");
            text.push_str(&tool_output);
        }

        if !results.is_empty() {
            let continuation_id = format!("{request_id}-continuation");
            let follow_up = self
                .guarded_turn(
                    AgentMessage::ToolResults(results),
                    SendOptions::continuation(),
                    &cancel,
                    &continuation_id,
                )
                .await?;

            let follow_up_text = follow_up.text.trim();
            if !follow_up_text.is_empty() {
                text.push_str("\n\n");
                text.push_str(follow_up_text);
            }
            usage += follow_up.usage;
        }

        Ok(QueryResult {
            text,
            usage,
            tool_calls: Some(turn.tool_requests),
        })
    }

    /// Stream one prompt as [`StreamChunk`]s
    ///
    /// Each model turn (the prompt, then the tool-result continuation) takes
    /// one breaker permit and is not retried, because chunks reach the caller
    /// as they arrive. With an attempt timeout configured, opening a turn and
    /// every wait for its next chunk are bounded by it. Failures become a
    /// final [`StreamChunk::Error`]. Dropping the stream cancels the work in
    /// flight, including running tools.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn query_stream(&self, prompt: &str) -> ReceiverStream<StreamChunk> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let task = StreamTask {
            agent: Arc::clone(&self.agent),
            tools: self.tools.clone(),
            resilience: Arc::clone(&self.resilience),
            cancel: CancellationToken::new(),
            request_id: format!("stream-{}", Uuid::now_v7()),
        };
        let prompt = prompt.to_string();
        info!(session_id = %self.config.session_id, request_id = %task.request_id, "starting streaming query");

        tokio::spawn(async move {
            let cancel = task.cancel.clone();
            let run = task.run(prompt, &tx);
            tokio::pin!(run);

            let outcome = tokio::select! {
                result = &mut run => Some(result),
                _ = tx.closed() => None,
            };

            match outcome {
                Some(Ok(())) => {}
                Some(Err(Disconnected)) => {
                    debug!("stream consumer went away, cancelling turn");
                    cancel.cancel();
                }
                None => {
                    debug!("stream consumer went away, cancelling turn");
                    cancel.cancel();
                    // Let the agent and tools observe the cancellation and wind down
                    let _ = run.await;
                }
            }
        });

        ReceiverStream::new(rx)
    }

    /// Run tool calls: shell tools in the sandbox (when attached), the rest
    /// through the scheduler. Sandbox results come first.
    pub async fn execute_tools(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>> {
        self.tools.execute(requests, cancel).await
    }

    pub async fn reset_chat(&self) -> Result<()> {
        self.agent.reset_chat().await
    }

    /// Release the sandbox, if any
    pub async fn cleanup(&self) -> Result<()> {
        if let Some(sandbox) = &self.tools.sandbox {
            sandbox.cleanup().await?;
            info!(session_id = %self.config.session_id, "sandbox cleaned up");
        }
        Ok(())
    }

    pub async fn sandbox_status(&self) -> SandboxStatus {
        match &self.tools.sandbox {
            Some(sandbox) => sandbox.status().await,
            None => SandboxStatus::NotFound,
        }
    }
}

/// The consumer dropped its end of the stream
#[derive(Debug)]
struct Disconnected;

async fn send(
    tx: &mpsc::Sender<StreamChunk>,
    chunk: StreamChunk,
) -> std::result::Result<(), Disconnected> {
    tx.send(chunk).await.map_err(|_| Disconnected)
}

fn error_chunk(e: AgentError) -> StreamChunk {
    StreamChunk::Error {
        error: e.to_string(),
    }
}

struct StreamTask {
    agent: Arc<dyn AgentClient>,
    tools: ToolRouter,
    resilience: Arc<ResilientCall>,
    cancel: CancellationToken,
    request_id: String,
}

impl StreamTask {
    async fn run(
        &self,
        prompt: String,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> std::result::Result<(), Disconnected> {
        let Some(requests) = self
            .stream_turn(
                AgentMessage::Text(prompt),
                SendOptions::default(),
                &self.request_id,
                tx,
            )
            .await?
        else {
            return Ok(());
        };

        if !requests.is_empty() {
            let results = match self.tools.execute(requests.clone(), self.cancel.clone()).await {
                Ok(results) => results,
                Err(e) => {
                    warn!(request_id = %self.request_id, error = %e, "tool execution failed");
                    return send(tx, error_chunk(e)).await;
                }
            };

            for result in &results {
                let tool_name = requests
                    .iter()
                    .find(|r| r.call_id == result.call_id)
                    .map(|r| r.name.clone())
                    .unwrap_or_else(|| "unknown".to_string());
                let result = result.output().unwrap_or("Tool completed").to_string();
                send(tx, StreamChunk::ToolResult { tool_name, result }).await?;
            }

            if !results.is_empty() {
                let continuation_id = format!("{}-continuation", self.request_id);
                let continued = self
                    .stream_turn(
                        AgentMessage::ToolResults(results),
                        SendOptions::continuation(),
                        &continuation_id,
                        tx,
                    )
                    .await?;
                if continued.is_none() {
                    return Ok(());
                }
            }
        }

        send(tx, StreamChunk::Finished).await
    }

    /// Forward one model turn to the consumer
    ///
    /// Returns the tool calls the turn requested, or `None` when the turn
    /// failed and an error chunk was sent instead. Tool calls requested in a
    /// continuation are not announced or run.
    async fn stream_turn(
        &self,
        message: AgentMessage,
        options: SendOptions,
        request_id: &str,
        tx: &mpsc::Sender<StreamChunk>,
    ) -> std::result::Result<Option<Vec<ToolCallRequest>>, Disconnected> {
        let permit = match self.resilience.breaker().allow() {
            Ok(permit) => permit,
            Err(e) => {
                send(tx, error_chunk(e.into())).await?;
                return Ok(None);
            }
        };
        let limit = self.resilience.attempt_timeout();

        let opened = bounded(
            limit,
            self.agent
                .send_message_stream(message, self.cancel.clone(), request_id, options),
        )
        .await;
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                permit.failure();
                warn!(%request_id, error = %e, "failed to open agent stream");
                send(tx, error_chunk(e)).await?;
                return Ok(None);
            }
        };

        let mut requests = Vec::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(Disconnected),
                next = bounded(limit, async { Ok(stream.next().await) }) => next,
            };

            match next.and_then(Option::transpose) {
                Ok(Some(AgentChunk::Content(text))) => {
                    send(tx, StreamChunk::Content { text }).await?
                }
                Ok(Some(AgentChunk::ToolCallRequest(request))) => {
                    if options.is_continuation {
                        debug!(%request_id, tool = %request.name, "ignoring tool call requested in continuation");
                        continue;
                    }
                    send(
                        tx,
                        StreamChunk::Tool {
                            tool_name: request.name.clone(),
                        },
                    )
                    .await?;
                    requests.push(request);
                }
                Ok(Some(AgentChunk::ToolCallResponse(_))) => {}
                Ok(Some(AgentChunk::Finished(_))) | Ok(None) => break,
                Err(e) => {
                    permit.failure();
                    warn!(%request_id, error = %e, "agent stream failed");
                    send(tx, error_chunk(e)).await?;
                    return Ok(None);
                }
            }
        }
        permit.success();

        Ok(Some(requests))
    }
}
