// Error types for the server client

use teamflow_resilience::{is_transient_message, CircuitOpenError, OperationTimedOut, Transient};
use thiserror::Error;

/// Result type alias for server client operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors that can occur while talking to the agent and its tools
#[derive(Debug, Error)]
pub enum AgentError {
    /// Agent/LLM client error
    #[error("Agent error: {0}")]
    Agent(String),

    /// Agent client was already initialized (tolerated by `initialize`)
    #[error("Agent client already initialized")]
    AlreadyInitialized,

    /// Tool scheduler error
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Sandbox executor error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The agent's circuit breaker is open
    #[error(transparent)]
    CircuitOpen(#[from] CircuitOpenError),

    /// A model turn exceeded its time limit
    #[error(transparent)]
    Timeout(#[from] OperationTimedOut),

    /// The request was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AgentError {
    /// Create an agent error
    pub fn agent(msg: impl Into<String>) -> Self {
        AgentError::Agent(msg.into())
    }

    /// Create a tool execution error
    pub fn tool(msg: impl Into<String>) -> Self {
        AgentError::ToolExecution(msg.into())
    }

    /// Create a sandbox error
    pub fn sandbox(msg: impl Into<String>) -> Self {
        AgentError::Sandbox(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        AgentError::Configuration(msg.into())
    }

    /// Whether repeating the failed model turn may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Agent(msg) => is_transient_message(msg),
            AgentError::Timeout(_) => true,
            _ => false,
        }
    }
}

impl Transient for AgentError {
    fn is_transient(&self) -> bool {
        self.is_retryable()
    }
}

impl From<teamflow_resilience::ConfigError> for AgentError {
    fn from(err: teamflow_resilience::ConfigError) -> Self {
        AgentError::Configuration(err.to_string())
    }
}
