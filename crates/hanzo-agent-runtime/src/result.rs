//! Result types for agent runs

use crate::agent::Agent;
use crate::errors::{AgentError, Result};
use crate::guardrail::{InputGuardrailResult, OutputGuardrailResult};
use crate::items::{text_message_outputs, InputItem, RunInput, RunItem};
use crate::runner::{RunConfig, RunState, Runner};
use crate::types::{ModelResponse, ToolCall, Usage};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// Result of an agent run
#[derive(Debug, Clone)]
pub struct RunResult {
    /// The original input
    pub input: RunInput,

    /// New items generated during the run
    pub new_items: Vec<RunItem>,

    /// Raw model responses
    pub raw_responses: Vec<ModelResponse>,

    /// The final output: a string for untyped agents, structured JSON otherwise
    pub final_output: Value,

    /// The agent that produced the final output
    pub last_agent: Arc<Agent>,

    pub input_guardrail_results: Vec<InputGuardrailResult>,
    pub output_guardrail_results: Vec<OutputGuardrailResult>,

    /// Total usage statistics
    pub usage: Usage,
}

impl RunResult {
    /// The final output as text
    ///
    /// Structured outputs fall back to the joined text of every model message.
    pub fn text_output(&self) -> String {
        match &self.final_output {
            Value::String(text) => text.clone(),
            _ => text_message_outputs(&self.new_items),
        }
    }

    /// Deserialize the final output into `T`
    pub fn final_output_as<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.final_output.clone()).map_err(|e| {
            AgentError::InvalidJson(format!("final output is not a {}: {}", std::any::type_name::<T>(), e))
        })
    }

    /// Convert the result back to a list of input items
    ///
    /// This merges the original input with all new items,
    /// useful for continuing a conversation.
    pub fn to_input_list(&self) -> Vec<InputItem> {
        let mut items = self.input.to_input_list();
        items.extend(self.new_items.iter().map(RunItem::to_input_item));
        items
    }

    /// Get the last message content from the result
    pub fn last_message(&self) -> Option<&str> {
        self.new_items.iter().rev().find_map(|item| match item {
            RunItem::AiMessage(output) => output.content.as_deref(),
            _ => None,
        })
    }

    pub fn last_agent(&self) -> &Agent {
        &self.last_agent
    }
}

type TokenCallback = Box<dyn FnMut(&str) + Send>;
type ToolCallCallback = Box<dyn FnMut(&ToolCall) + Send>;
type ToolResultCallback = Box<dyn FnMut(&ToolCall, &Value) + Send>;
type AgentChangedCallback = Box<dyn FnMut(&Agent) + Send>;
type CompleteCallback = Box<dyn FnMut(&RunResult) + Send>;

/// Observers of a streamed run
///
/// Callbacks run on the task that drives the run; a slow callback stalls it.
#[derive(Default)]
pub struct StreamCallbacks {
    token: Option<TokenCallback>,
    tool_call: Option<ToolCallCallback>,
    tool_call_result: Option<ToolResultCallback>,
    agent_changed: Option<AgentChangedCallback>,
    complete: Option<CompleteCallback>,
}

impl StreamCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each content delta of a model response
    pub fn on_token(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.token = Some(Box::new(f));
        self
    }

    /// A tool call about to execute
    pub fn on_tool_call(mut self, f: impl FnMut(&ToolCall) + Send + 'static) -> Self {
        self.tool_call = Some(Box::new(f));
        self
    }

    /// A tool call that finished, with its result
    pub fn on_tool_call_result(mut self, f: impl FnMut(&ToolCall, &Value) + Send + 'static) -> Self {
        self.tool_call_result = Some(Box::new(f));
        self
    }

    /// The agent taking over after a handoff
    pub fn on_agent_changed(mut self, f: impl FnMut(&Agent) + Send + 'static) -> Self {
        self.agent_changed = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl FnMut(&RunResult) + Send + 'static) -> Self {
        self.complete = Some(Box::new(f));
        self
    }

    pub(crate) fn emit_token(&mut self, token: &str) {
        if let Some(f) = self.token.as_mut() {
            f(token);
        }
    }

    pub(crate) fn emit_tool_call(&mut self, call: &ToolCall) {
        if let Some(f) = self.tool_call.as_mut() {
            f(call);
        }
    }

    pub(crate) fn emit_tool_call_result(&mut self, call: &ToolCall, result: &Value) {
        if let Some(f) = self.tool_call_result.as_mut() {
            f(call, result);
        }
    }

    pub(crate) fn emit_agent_changed(&mut self, agent: &Agent) {
        if let Some(f) = self.agent_changed.as_mut() {
            f(agent);
        }
    }

    pub(crate) fn emit_complete(&mut self, result: &RunResult) {
        if let Some(f) = self.complete.as_mut() {
            f(result);
        }
    }
}

impl std::fmt::Debug for StreamCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCallbacks")
            .field("token", &self.token.is_some())
            .field("tool_call", &self.tool_call.is_some())
            .field("tool_call_result", &self.tool_call_result.is_some())
            .field("agent_changed", &self.agent_changed.is_some())
            .field("complete", &self.complete.is_some())
            .finish()
    }
}

/// A streamed run in progress
///
/// Created by [`Runner::run_streamed`]. Register callbacks with
/// [`subscribe`](Self::subscribe), then drive the run with
/// [`wait`](Self::wait).
pub struct RunResultStreaming {
    runner: Runner,
    config: RunConfig,
    state: RunState,
    callbacks: StreamCallbacks,
    result: Option<RunResult>,
    failure: Option<String>,
}

impl RunResultStreaming {
    pub(crate) fn new(runner: Runner, config: RunConfig, state: RunState) -> Self {
        Self {
            runner,
            config,
            state,
            callbacks: StreamCallbacks::default(),
            result: None,
            failure: None,
        }
    }

    /// Replace the registered callbacks
    pub fn subscribe(&mut self, callbacks: StreamCallbacks) -> &mut Self {
        self.callbacks = callbacks;
        self
    }

    /// Drive the run to completion
    ///
    /// Returns the cached result when the run already completed. A run that
    /// failed cannot be resumed; later calls return [`AgentError::RunFailed`]
    /// carrying the first error's message.
    ///
    /// Dropping the returned future mid-run leaves the run unfinished; its
    /// trace is closed when this value is dropped.
    pub async fn wait(&mut self) -> Result<RunResult> {
        if let Some(result) = &self.result {
            return Ok(result.clone());
        }
        if let Some(message) = &self.failure {
            return Err(AgentError::RunFailed(message.clone()));
        }

        match self
            .runner
            .execute_streamed(&mut self.state, &self.config, &mut self.callbacks)
            .await
        {
            Ok(result) => {
                self.result = Some(result.clone());
                Ok(result)
            }
            Err(err) => {
                self.failure = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn current_agent(&self) -> &Agent {
        &self.state.current_agent
    }

    pub fn current_turn(&self) -> usize {
        self.state.current_turn
    }

    pub fn max_turns(&self) -> usize {
        self.state.max_turns
    }

    pub fn input(&self) -> &RunInput {
        &self.state.original_input
    }

    pub fn new_items(&self) -> &[RunItem] {
        &self.state.generated_items
    }

    pub fn raw_responses(&self) -> &[ModelResponse] {
        &self.state.model_responses
    }

    pub fn final_output(&self) -> Option<&Value> {
        self.state.final_output.as_ref()
    }

    pub fn input_guardrail_results(&self) -> &[InputGuardrailResult] {
        &self.state.input_guardrail_results
    }

    pub fn output_guardrail_results(&self) -> &[OutputGuardrailResult] {
        &self.state.output_guardrail_results
    }

    pub fn usage(&self) -> &Usage {
        self.state.context.usage()
    }

    /// The completed result, once [`wait`](Self::wait) succeeded
    pub fn result(&self) -> Option<&RunResult> {
        self.result.as_ref()
    }
}

impl Drop for RunResultStreaming {
    fn drop(&mut self) {
        if self.result.is_none() {
            self.state.abandon();
        }
    }
}

impl std::fmt::Debug for RunResultStreaming {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunResultStreaming")
            .field("current_agent", &self.state.current_agent.name)
            .field("current_turn", &self.state.current_turn)
            .field("max_turns", &self.state.max_turns)
            .field("is_complete", &self.is_complete())
            .finish()
    }
}
