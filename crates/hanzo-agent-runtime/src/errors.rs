//! Error types for the agent runtime

use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Max turns ({0}) exceeded")]
    MaxTurnsExceeded(usize),

    #[error("Input guardrail tripwire triggered: {}", .0.guardrail_name())]
    InputGuardrailTripwireTriggered(Box<InputGuardrailResult>),

    #[error("Output guardrail tripwire triggered: {}", .0.guardrail_name())]
    OutputGuardrailTripwireTriggered(Box<OutputGuardrailResult>),

    #[error("Unknown next step type: {0}")]
    UnknownNextStepType(String),

    #[error("Run cancelled")]
    Cancelled,

    /// A streamed run was awaited again after it failed; holds the first failure
    #[error("Streamed run already failed: {0}")]
    RunFailed(String),

    #[error("Model error: {0}")]
    ModelError(String),

    #[error("Tool error: {tool_name}: {message}")]
    ToolError { tool_name: String, message: String },

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Model behavior error: {0}")]
    ModelBehavior(String),

    #[error("Agent configuration error: {0}")]
    Configuration(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Generic error: {0}")]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    /// Whether this error is one of the run-terminating control conditions
    /// (turn limit, tripwire or cancellation) rather than a collaborator failure.
    pub fn is_run_control(&self) -> bool {
        matches!(
            self,
            AgentError::MaxTurnsExceeded(_)
                | AgentError::InputGuardrailTripwireTriggered(_)
                | AgentError::OutputGuardrailTripwireTriggered(_)
                | AgentError::Cancelled
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
