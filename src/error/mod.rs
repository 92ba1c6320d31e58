//! Error types for the agent session core.

use thiserror::Error;

/// Primary error type for all session, run, and protocol operations.
#[derive(Error, Debug)]
pub enum AiboxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Tool server '{server}' unavailable: {message}")]
    ToolServerConnection { server: String, message: String },

    #[error("Failed to initialize session '{session_id}': {message}")]
    SessionInit { session_id: String, message: String },

    #[error("Session '{0}' already has a run in flight")]
    SessionBusy(String),

    #[error("Model provider error: {provider}: {message}")]
    ModelProvider { provider: String, message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Broad error category used to route the propagation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Recovered at the tool-call boundary; reported as a result payload.
    ToolExecution,
    /// Recovered at resolution time; the server is dropped from the tool set.
    ToolServerConnection,
    /// Fatal to `acquire`; surfaced before any run starts.
    SessionInit,
    /// Fatal to the run; emits `RunError`.
    ModelProvider,
    /// Voluntary stop; never reported as a failure.
    Cancellation,
    Configuration,
    Protocol,
    Network,
    Busy,
    Internal,
}

impl AiboxError {
    /// Create a model provider error.
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ModelProvider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// Create a tool server connection error.
    pub fn tool_server(server: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolServerConnection {
            server: server.into(),
            message: message.into(),
        }
    }

    /// Wrap any error raised while building a session agent.
    pub fn session_init(session_id: impl Into<String>, source: &AiboxError) -> Self {
        Self::SessionInit {
            session_id: session_id.into(),
            message: source.to_string(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::ToolServerConnection { .. } => ErrorCategory::ToolServerConnection,
            Self::SessionInit { .. } | Self::ModelNotFound(_) => ErrorCategory::SessionInit,
            Self::ModelProvider { .. } => ErrorCategory::ModelProvider,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::Configuration(_) | Self::Toml(_) => ErrorCategory::Configuration,
            Self::Protocol(_) | Self::Serialization(_) => ErrorCategory::Protocol,
            Self::Network(_) => ErrorCategory::Network,
            Self::SessionBusy(_) => ErrorCategory::Busy,
            _ => ErrorCategory::Internal,
        }
    }

    /// Whether this error terminates a run with a `RunError` event.
    ///
    /// Tool-level and tool-server-level failures are recovered inside the run,
    /// and cancellation is not a failure at all.
    pub fn is_run_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::ToolExecution
                | ErrorCategory::ToolServerConnection
                | ErrorCategory::Cancellation
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, AiboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failures_never_abort_runs() {
        assert!(!AiboxError::tool("get_weather", "timeout").is_run_fatal());
        assert!(!AiboxError::tool_server("exa", "spawn failed").is_run_fatal());
        assert!(!AiboxError::Cancelled.is_run_fatal());
    }

    #[test]
    fn provider_failures_abort_runs() {
        let err = AiboxError::provider("bedrock", "throttled");
        assert_eq!(err.category(), ErrorCategory::ModelProvider);
        assert!(err.is_run_fatal());
    }

    #[test]
    fn session_init_wraps_source_message() {
        let source = AiboxError::ModelNotFound("gpt-9".into());
        let err = AiboxError::session_init("s1", &source);
        assert_eq!(err.category(), ErrorCategory::SessionInit);
        assert!(err.to_string().contains("gpt-9"));
        assert!(err.to_string().contains("s1"));
    }
}
