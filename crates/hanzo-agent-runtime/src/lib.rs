//! Hanzo Agent Runtime - multi-agent run orchestration
//!
//! A [`Runner`] drives an [`Agent`] through turns: each turn calls the model,
//! executes any requested tools, follows handoffs to other agents, and stops
//! when the model produces a final output. Input and output guardrails can
//! abort a run, and every run is recorded as a [`Trace`](trace::Trace) of
//! agent spans delivered to pluggable processors.
//!
//! # Example
//!
//! ```no_run
//! use hanzo_agent_runtime::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runner = Runner::from_config(AgentsConfig::from_env()?);
//!
//!     let agent = Agent::builder("assistant")
//!         .instructions("You are a helpful assistant.")
//!         .model("gpt-4o")
//!         .build();
//!
//!     let result = agent.run(&runner, "Hello!").await?;
//!     println!("Response: {}", result.text_output());
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod config;
pub mod context;
pub mod errors;
pub mod guardrail;
pub mod handoff;
pub mod items;
pub mod model;
pub mod providers;
pub mod result;
pub mod runner;
pub mod tool;
pub mod trace;
pub mod types;

pub use agent::{Agent, AgentBuilder, Instructions};
pub use config::{AgentsConfig, TracingConfig};
pub use context::RunContext;
pub use errors::{AgentError, Result};
pub use guardrail::{
    GuardrailOutput, InputGuardrail, InputGuardrailFn, InputGuardrailResult, OutputGuardrail,
    OutputGuardrailFn, OutputGuardrailResult,
};
pub use handoff::{Handoff, HandoffInputFilter, RemoveToolResults};
pub use items::{InputItem, Role, RunInput, RunItem};
pub use model::{Model, ModelProvider, ModelRef, ModelRequest, ModelStream, StreamEvent};
pub use providers::{OpenAIChatCompletionsModel, OpenAIProvider};
pub use result::{RunResult, RunResultStreaming, StreamCallbacks};
pub use runner::{RunConfig, Runner};
pub use tool::{AgentTool, FunctionTool, Tool};
pub use trace::{LogProcessor, Trace, TraceProcessor, TraceSpan, Tracer};
pub use types::{ModelOutput, ModelResponse, ModelSettings, OutputType, ToolCall, Usage};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::types::{ModelSettings, OutputType, Usage};
    pub use crate::{
        Agent, AgentBuilder, AgentError, AgentsConfig, FunctionTool, GuardrailOutput, Handoff,
        InputGuardrailFn, OutputGuardrailFn, RunConfig, RunContext, RunInput, RunResult, Runner,
        StreamCallbacks, Tool,
    };
}
