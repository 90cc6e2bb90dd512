// Server client configuration
//
// ServerConfig is a plain typed struct that can be:
// - Deserialized from a (partial) JSON document sent by the team service
// - Built directly with the `with_*` setters

use serde::{Deserialize, Serialize};
use teamflow_resilience::ResilienceConfig;
use uuid::Uuid;

use crate::error::{AgentError, Result};

/// How tool calls are approved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// Run every tool call without asking
    #[default]
    Yolo,
    /// Defer to the agent library's default approval flow
    Default,
}

/// Who the agent session is working for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollaborationMode {
    #[default]
    Individual,
    Shared,
    Review,
}

/// Configuration for a [`ServerClient`](crate::ServerClient)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// API key for the model endpoint
    pub api_key: String,

    /// Override for the model endpoint base URL
    #[serde(default)]
    pub base_url: Option<String>,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Session identifier (defaults to `server-<uuid v7>`)
    #[serde(default = "default_session_id")]
    pub session_id: String,

    /// Directory tools operate in
    #[serde(default = "default_working_directory")]
    pub working_directory: String,

    #[serde(default)]
    pub approval_mode: ApprovalMode,

    /// Retry, breaker and timeout settings for model turns
    #[serde(default)]
    pub resilience: ResilienceConfig,

    /// Route shell tools to a sandbox executor when one is attached
    #[serde(default = "default_enable_sandbox")]
    pub enable_sandbox: bool,

    #[serde(default)]
    pub team_id: Option<String>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub collaboration_mode: CollaborationMode,
}

fn default_model() -> String {
    "qwen3-coder".to_string()
}

fn default_session_id() -> String {
    format!("server-{}", Uuid::now_v7())
}

fn default_working_directory() -> String {
    "/workspace".to_string()
}

fn default_enable_sandbox() -> bool {
    true
}

impl ServerConfig {
    /// Create a configuration with defaults for everything but the API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            model: default_model(),
            session_id: default_session_id(),
            working_directory: default_working_directory(),
            approval_mode: ApprovalMode::default(),
            resilience: ResilienceConfig::default(),
            enable_sandbox: default_enable_sandbox(),
            team_id: None,
            project_id: None,
            collaboration_mode: CollaborationMode::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_working_directory(mut self, dir: impl Into<String>) -> Self {
        self.working_directory = dir.into();
        self
    }

    pub fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = mode;
        self
    }

    pub fn with_resilience(mut self, resilience: ResilienceConfig) -> Self {
        self.resilience = resilience;
        self
    }

    pub fn with_sandbox(mut self, enabled: bool) -> Self {
        self.enable_sandbox = enabled;
        self
    }

    pub fn with_team(mut self, team_id: impl Into<String>) -> Self {
        self.team_id = Some(team_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_collaboration_mode(mut self, mode: CollaborationMode) -> Self {
        self.collaboration_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(AgentError::config("api_key must not be empty"));
        }
        if self.model.trim().is_empty() {
            return Err(AgentError::config("model must not be empty"));
        }
        self.resilience.validate()?;
        Ok(())
    }
}

/// Docker sandbox settings handed to a [`SandboxExecutor`](crate::SandboxExecutor)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SandboxConfig {
    pub image: String,
    pub workspace_dir: String,
    pub user_id: String,
    pub network: String,
    pub memory: String,
    pub cpus: u32,
}

impl SandboxConfig {
    pub const DEFAULT_IMAGE: &'static str = "node:20-bookworm";
    pub const DEFAULT_NETWORK: &'static str = "bridge";
    pub const DEFAULT_MEMORY: &'static str = "1g";
    pub const DEFAULT_CPUS: u32 = 2;

    /// Build from the server config and `SANDBOX_*` environment variables
    pub fn from_env(config: &ServerConfig) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Build from the server config and an arbitrary variable lookup
    pub fn from_lookup<F>(config: &ServerConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cpus = lookup("SANDBOX_CPUS")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(Self::DEFAULT_CPUS);

        Self {
            image: lookup("SANDBOX_IMAGE").unwrap_or_else(|| Self::DEFAULT_IMAGE.to_string()),
            workspace_dir: config.working_directory.clone(),
            user_id: config.session_id.clone(),
            network: lookup("SANDBOX_NETWORK").unwrap_or_else(|| Self::DEFAULT_NETWORK.to_string()),
            memory: lookup("SANDBOX_MEMORY").unwrap_or_else(|| Self::DEFAULT_MEMORY.to_string()),
            cpus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new("sk-test");
        assert_eq!(config.model, "qwen3-coder");
        assert_eq!(config.working_directory, "/workspace");
        assert!(config.session_id.starts_with("server-"));
        assert_eq!(config.approval_mode, ApprovalMode::Yolo);
        assert_eq!(config.collaboration_mode, CollaborationMode::Individual);
        assert!(config.enable_sandbox);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_generated_session_ids_differ() {
        assert_ne!(
            ServerConfig::new("k").session_id,
            ServerConfig::new("k").session_id
        );
    }

    #[test]
    fn test_partial_document() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "api_key": "sk-test",
                "session_id": "user-42",
                "collaboration_mode": "review",
                "resilience": {"retry": {"max_attempts": 5}}
            }"#,
        )
        .unwrap();

        assert_eq!(config.session_id, "user-42");
        assert_eq!(config.collaboration_mode, CollaborationMode::Review);
        assert_eq!(config.resilience.retry.max_attempts, 5);
        assert_eq!(config.model, "qwen3-coder");
        assert!(config.enable_sandbox);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            ServerConfig::new("  ").validate(),
            Err(AgentError::Configuration(_))
        ));
        assert!(matches!(
            ServerConfig::new("k").with_model("").validate(),
            Err(AgentError::Configuration(_))
        ));

        let mut config = ServerConfig::new("k");
        config.resilience.retry.max_attempts = 0;
        assert!(matches!(
            config.validate(),
            Err(AgentError::Configuration(_))
        ));
    }

    #[test]
    fn test_sandbox_defaults() {
        let config = ServerConfig::new("k")
            .with_session_id("session-1")
            .with_working_directory("/data/individual/session-1");

        let sandbox = SandboxConfig::from_lookup(&config, |_| None);
        assert_eq!(sandbox.image, "node:20-bookworm");
        assert_eq!(sandbox.network, "bridge");
        assert_eq!(sandbox.memory, "1g");
        assert_eq!(sandbox.cpus, 2);
        assert_eq!(sandbox.workspace_dir, "/data/individual/session-1");
        assert_eq!(sandbox.user_id, "session-1");
    }

    #[test]
    fn test_sandbox_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SANDBOX_IMAGE", "python:3.12"),
            ("SANDBOX_NETWORK", "none"),
            ("SANDBOX_MEMORY", "4g"),
            ("SANDBOX_CPUS", "8"),
        ]);
        let config = ServerConfig::new("k");

        let sandbox = SandboxConfig::from_lookup(&config, |key| env.get(key).map(|v| v.to_string()));
        assert_eq!(sandbox.image, "python:3.12");
        assert_eq!(sandbox.network, "none");
        assert_eq!(sandbox.memory, "4g");
        assert_eq!(sandbox.cpus, 8);
    }

    #[test]
    fn test_sandbox_bad_cpus_falls_back() {
        let config = ServerConfig::new("k");
        let sandbox = SandboxConfig::from_lookup(&config, |key| {
            (key == "SANDBOX_CPUS").then(|| "lots".to_string())
        });
        assert_eq!(sandbox.cpus, 2);
    }
}
