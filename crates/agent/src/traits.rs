// Call contracts for the agent's external collaborators
//
// These traits allow ServerClient to be used with different backends:
// - The production agent SDK bridge, tool scheduler and Docker sandbox
// - In-memory implementations for tests (see `memory`)

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{
    AgentChunk, AgentMessage, SandboxStatus, SendOptions, ToolCallRequest, ToolCallResponse,
    ToolDeclaration,
};

/// Type alias for the agent response stream
pub type AgentStream = Pin<Box<dyn Stream<Item = Result<AgentChunk>> + Send>>;

// ============================================================================
// AgentClient - Conversational model with tool calling
// ============================================================================

#[async_trait]
pub trait AgentClient: Send + Sync {
    /// Prepare the client (auth, tool registry). May fail with
    /// [`AgentError::AlreadyInitialized`](crate::AgentError::AlreadyInitialized).
    async fn initialize(&self) -> Result<()>;

    /// Replace the tools the model may call
    async fn set_tools(&self, tools: Vec<ToolDeclaration>) -> Result<()>;

    /// Send one message (a prompt, or tool results with
    /// [`SendOptions::is_continuation`] set) and stream the model's turn
    async fn send_message_stream(
        &self,
        message: AgentMessage,
        cancel: CancellationToken,
        request_id: &str,
        options: SendOptions,
    ) -> Result<AgentStream>;

    /// Drop the conversation history
    async fn reset_chat(&self) -> Result<()>;
}

// ============================================================================
// ToolScheduler - Runs non-sandboxed tool calls
// ============================================================================

#[async_trait]
pub trait ToolScheduler: Send + Sync {
    /// Schedule the calls and resolve once all of them have completed
    async fn schedule(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>>;
}

// ============================================================================
// SandboxExecutor - Runs shell tool calls in an isolated container
// ============================================================================

#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    async fn execute_tools(
        &self,
        requests: Vec<ToolCallRequest>,
        cancel: CancellationToken,
    ) -> Result<Vec<ToolCallResponse>>;

    async fn status(&self) -> SandboxStatus;

    /// Stop and remove the container
    async fn cleanup(&self) -> Result<()>;
}
