// Server-side agent client
//
// This crate wraps Teamflow's conversational agent for use on the server.
//
// Key design decisions:
// - The agent, tool scheduler and sandbox are traits (AgentClient, ToolScheduler,
//   SandboxExecutor) so the client runs against any backend
// - Each model turn runs through teamflow-resilience (breaker + retry + timeout)
// - Shell tools run in the sandbox when one is attached, others in the scheduler
// - Tool results are sent back to the model as a continuation turn
// - Streaming failures are reported in-band as StreamChunk::Error
// - In-memory implementations live in `memory` for examples and tests

pub mod client;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

// In-memory implementations for examples and testing
pub mod memory;

// Re-exports for convenience
pub use client::{is_shell_tool, ServerClient, SHELL_TOOLS};
pub use config::{ApprovalMode, CollaborationMode, SandboxConfig, ServerConfig};
pub use error::{AgentError, Result};
pub use traits::{AgentClient, AgentStream, SandboxExecutor, ToolScheduler};
pub use types::{
    AgentChunk, AgentMessage, QueryResult, SandboxStatus, SendOptions, StreamChunk, TokenUsage,
    ToolCallRequest, ToolCallResponse, ToolDeclaration, UsageMetadata,
};
