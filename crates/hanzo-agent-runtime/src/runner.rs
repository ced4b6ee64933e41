//! Agent execution runner

use crate::agent::Agent;
use crate::config::AgentsConfig;
use crate::context::RunContext;
use crate::errors::{AgentError, Result};
use crate::guardrail::{
    run_input_guardrails, run_output_guardrails, InputGuardrail, InputGuardrailResult,
    OutputGuardrail, OutputGuardrailResult,
};
use crate::handoff::{Handoff, HandoffInputFilter};
use crate::items::{InputItem, RunInput, RunItem};
use crate::model::{Model, ModelProvider, ModelRef, ModelRequest, StreamAccumulator, StreamEvent};
use crate::result::{RunResult, RunResultStreaming, StreamCallbacks};
use crate::trace::{Trace, Tracer};
use crate::types::{ModelResponse, ModelSettings, ToolCall};
use futures::StreamExt;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub use crate::config::DEFAULT_MAX_TURNS;

/// Workflow name used when a run config does not set one
pub const DEFAULT_WORKFLOW_NAME: &str = "Agent workflow";

/// Configuration for agent run
///
/// Everything here overrides what the agent itself declares, for one run.
#[derive(Clone)]
pub struct RunConfig {
    /// Model for every agent in the run
    pub model: Option<ModelRef>,

    /// Provider used to resolve model names instead of the runner's
    pub model_provider: Option<Arc<dyn ModelProvider>>,

    /// Global model settings override
    pub model_settings: Option<ModelSettings>,

    /// Filter for handoffs that declare none of their own
    pub handoff_input_filter: Option<Arc<dyn HandoffInputFilter>>,

    /// Checked after the starting agent's input guardrails
    pub input_guardrails: Vec<Arc<dyn InputGuardrail>>,

    /// Checked after the final agent's output guardrails
    pub output_guardrails: Vec<Arc<dyn OutputGuardrail>>,

    pub tracing_disabled: bool,
    pub trace_include_sensitive_data: bool,
    pub workflow_name: String,
    pub trace_id: Option<String>,
    pub group_id: Option<String>,
    pub trace_metadata: Map<String, Value>,

    /// Maximum number of turns (LLM invocations)
    pub max_turns: Option<usize>,

    /// Fail the run when the model calls a tool the agent does not have
    pub strict_tool_lookup: bool,
}

impl RunConfig {
    /// Create a new run config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Run config seeded with the tracing switches of `config`
    pub fn from_agents_config(config: &AgentsConfig) -> Self {
        Self {
            model: None,
            model_provider: None,
            model_settings: None,
            handoff_input_filter: None,
            input_guardrails: Vec::new(),
            output_guardrails: Vec::new(),
            tracing_disabled: !config.tracing.enabled,
            trace_include_sensitive_data: config.tracing.include_sensitive_data,
            workflow_name: DEFAULT_WORKFLOW_NAME.to_string(),
            trace_id: None,
            group_id: None,
            trace_metadata: Map::new(),
            max_turns: None,
            strict_tool_lookup: false,
        }
    }

    pub fn with_model(mut self, model: impl Into<ModelRef>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_model_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.model_provider = Some(provider);
        self
    }

    pub fn with_model_settings(mut self, settings: ModelSettings) -> Self {
        self.model_settings = Some(settings);
        self
    }

    pub fn with_handoff_input_filter(mut self, filter: Arc<dyn HandoffInputFilter>) -> Self {
        self.handoff_input_filter = Some(filter);
        self
    }

    pub fn with_input_guardrail(mut self, guardrail: impl InputGuardrail + 'static) -> Self {
        self.input_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn with_output_guardrail(mut self, guardrail: impl OutputGuardrail + 'static) -> Self {
        self.output_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn with_tracing_disabled(mut self, disabled: bool) -> Self {
        self.tracing_disabled = disabled;
        self
    }

    pub fn with_trace_include_sensitive_data(mut self, include: bool) -> Self {
        self.trace_include_sensitive_data = include;
        self
    }

    pub fn with_workflow_name(mut self, name: impl Into<String>) -> Self {
        self.workflow_name = name.into();
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    pub fn with_trace_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.trace_metadata = metadata;
        self
    }

    /// Set maximum turns
    pub fn with_max_turns(mut self, turns: usize) -> Self {
        self.max_turns = Some(turns);
        self
    }

    pub fn with_strict_tool_lookup(mut self, strict: bool) -> Self {
        self.strict_tool_lookup = strict;
        self
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_agents_config(&AgentsConfig::default())
    }
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunConfig")
            .field("model", &self.model)
            .field("model_settings", &self.model_settings)
            .field("input_guardrails", &self.input_guardrails.len())
            .field("output_guardrails", &self.output_guardrails.len())
            .field("tracing_disabled", &self.tracing_disabled)
            .field("workflow_name", &self.workflow_name)
            .field("max_turns", &self.max_turns)
            .field("strict_tool_lookup", &self.strict_tool_lookup)
            .finish()
    }
}

/// Mutable state of one run
pub(crate) struct RunState {
    pub(crate) original_input: RunInput,
    pub(crate) current_agent: Arc<Agent>,
    pub(crate) current_turn: usize,
    pub(crate) max_turns: usize,
    pub(crate) generated_items: Vec<RunItem>,
    pub(crate) model_responses: Vec<ModelResponse>,
    pub(crate) input_guardrail_results: Vec<InputGuardrailResult>,
    pub(crate) output_guardrail_results: Vec<OutputGuardrailResult>,
    pub(crate) final_output: Option<Value>,
    pub(crate) context: RunContext,
    current_span: Option<String>,
    trace: Trace,
}

impl RunState {
    /// Original input followed by every generated item, as model input
    fn input_list(&self) -> Vec<InputItem> {
        let mut items = self.original_input.to_input_list();
        items.extend(self.generated_items.iter().map(RunItem::to_input_item));
        items
    }

    pub(crate) fn to_result(&self) -> RunResult {
        RunResult {
            input: self.original_input.clone(),
            new_items: self.generated_items.clone(),
            raw_responses: self.model_responses.clone(),
            final_output: self.final_output.clone().unwrap_or(Value::Null),
            last_agent: Arc::clone(&self.current_agent),
            input_guardrail_results: self.input_guardrail_results.clone(),
            output_guardrail_results: self.output_guardrail_results.clone(),
            usage: self.context.usage().clone(),
        }
    }

    fn record_error(&mut self, err: &AgentError) {
        if let Some(span) = &self.current_span {
            self.trace.add_error_to_span(span, &err.to_string(), error_data(err));
        }
    }

    fn close_span(&mut self) {
        if let Some(span) = self.current_span.take() {
            self.trace.finish_span(&span);
        }
    }

    /// Close the trace of a run that will not be driven any further
    pub(crate) fn abandon(&mut self) {
        if self.trace.is_finished() {
            return;
        }
        debug!(agent = %self.current_agent.name, turn = self.current_turn, "Abandoning unfinished run");
        self.close_span();
        self.trace.finish();
    }
}

fn error_data(err: &AgentError) -> Value {
    match err {
        AgentError::MaxTurnsExceeded(max_turns) => json!({ "max_turns": max_turns }),
        AgentError::InputGuardrailTripwireTriggered(result) => json!({
            "guardrail": result.guardrail_name(),
            "message": result.output.message,
        }),
        AgentError::OutputGuardrailTripwireTriggered(result) => json!({
            "guardrail": result.guardrail_name(),
            "message": result.output.message,
            "output": result.agent_output,
        }),
        AgentError::ToolError { tool_name, message } => json!({
            "tool": tool_name,
            "message": message,
        }),
        other => json!({ "error": other.to_string() }),
    }
}

/// Next step in the agent loop
#[derive(Debug)]
enum NextStep {
    /// Agent produced final output
    FinalOutput(Value),

    /// Run the agent again (after tool execution)
    RunAgain,

    /// Handoff to another agent
    Handoff(Handoff),
}

/// Runner executes the agent loop
///
/// A runner owns the model provider used to resolve model names, the tracer
/// that creates one trace per run, and the runtime defaults. It is cheap to
/// clone and can drive any number of runs concurrently.
#[derive(Clone)]
pub struct Runner {
    provider: Arc<dyn ModelProvider>,
    tracer: Tracer,
    config: Arc<AgentsConfig>,
}

impl Runner {
    pub fn new(provider: impl ModelProvider + 'static) -> Self {
        Self::with_shared_provider(Arc::new(provider))
    }

    pub fn with_shared_provider(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            tracer: Tracer::default(),
            config: Arc::new(AgentsConfig::default()),
        }
    }

    /// Runner backed by the OpenAI provider built from `config`
    pub fn from_config(config: AgentsConfig) -> Self {
        let provider = crate::providers::openai::OpenAIProvider::from_config(&config);
        Self::new(provider).with_config(config)
    }

    pub fn with_tracer(mut self, tracer: Tracer) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn with_config(mut self, config: AgentsConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn config(&self) -> &AgentsConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Run the agent with the given input
    ///
    /// This executes the agent loop:
    /// 1. Run input guardrails (first turn only)
    /// 2. Send input to the model
    /// 3. If a handoff is selected, switch to the target agent
    /// 4. If tool calls are returned, execute them
    /// 5. If a final output is returned, run output guardrails and complete
    /// 6. Repeat until max_turns or final output
    pub async fn run(
        &self,
        agent: &Agent,
        input: impl Into<RunInput>,
        context: RunContext,
        max_turns: Option<usize>,
        config: &RunConfig,
    ) -> Result<RunResult> {
        let mut state = self.prepare(agent, input.into(), context, max_turns, config);
        info!(agent = %agent.name, trace_id = state.trace.trace_id(), "Starting agent run");

        let outcome = self.drive(&mut state, config, None).await;
        self.finish(&mut state);
        outcome?;

        info!(agent = %state.current_agent.name, turns = state.current_turn, "Agent run completed");
        Ok(state.to_result())
    }

    /// Start a streamed run; nothing executes until the result is awaited
    pub fn run_streamed(
        &self,
        agent: &Agent,
        input: impl Into<RunInput>,
        context: RunContext,
        max_turns: Option<usize>,
        config: RunConfig,
    ) -> RunResultStreaming {
        let state = self.prepare(agent, input.into(), context, max_turns, &config);
        info!(agent = %agent.name, trace_id = state.trace.trace_id(), "Starting streamed agent run");
        RunResultStreaming::new(self.clone(), config, state)
    }

    /// Drive a streamed run to completion, firing callbacks as it goes
    pub(crate) async fn execute_streamed(
        &self,
        state: &mut RunState,
        config: &RunConfig,
        callbacks: &mut StreamCallbacks,
    ) -> Result<RunResult> {
        let outcome = self.drive(state, config, Some(callbacks)).await;
        self.finish(state);
        outcome?;

        let result = state.to_result();
        callbacks.emit_complete(&result);
        Ok(result)
    }

    fn prepare(
        &self,
        agent: &Agent,
        input: RunInput,
        context: RunContext,
        max_turns: Option<usize>,
        config: &RunConfig,
    ) -> RunState {
        let max_turns = max_turns
            .or(config.max_turns)
            .unwrap_or(self.config.default_max_turns);

        let disabled = config.tracing_disabled || !self.config.tracing.enabled;
        let mut trace = self
            .tracer
            .trace(disabled)
            .with_sensitive_data(config.trace_include_sensitive_data);
        trace.start(
            &config.workflow_name,
            config.trace_id.clone(),
            config.group_id.clone(),
            config.trace_metadata.clone(),
        );

        RunState {
            original_input: input,
            current_agent: Arc::new(agent.clone()),
            current_turn: 0,
            max_turns,
            generated_items: Vec::new(),
            model_responses: Vec::new(),
            input_guardrail_results: Vec::new(),
            output_guardrail_results: Vec::new(),
            final_output: None,
            context,
            current_span: None,
            trace,
        }
    }

    /// Close any open span and finish the trace
    fn finish(&self, state: &mut RunState) {
        state.close_span();
        state.trace.finish();
    }

    async fn drive(
        &self,
        state: &mut RunState,
        config: &RunConfig,
        callbacks: Option<&mut StreamCallbacks>,
    ) -> Result<()> {
        let outcome = self.turn_loop(state, config, callbacks).await;
        if let Err(err) = &outcome {
            warn!(agent = %state.current_agent.name, turn = state.current_turn, error = %err, "Agent run failed");
            state.record_error(err);
        }
        outcome
    }

    async fn turn_loop(
        &self,
        state: &mut RunState,
        config: &RunConfig,
        mut callbacks: Option<&mut StreamCallbacks>,
    ) -> Result<()> {
        loop {
            ensure_not_cancelled(&state.context)?;

            if state.current_span.is_none() {
                let agent = &state.current_agent;
                let span = state.trace.start_agent_span(
                    &agent.name,
                    agent.handoff_names(),
                    agent.tool_names(),
                    agent.output_type.tag(),
                );
                state.current_span = Some(span);
            }

            state.current_turn += 1;
            if state.current_turn > state.max_turns {
                return Err(AgentError::MaxTurnsExceeded(state.max_turns));
            }

            debug!(agent = %state.current_agent.name, turn = state.current_turn, "Running turn");

            if state.current_turn == 1 {
                let agent = Arc::clone(&state.current_agent);
                let guardrails: Vec<Arc<dyn InputGuardrail>> = agent
                    .input_guardrails
                    .iter()
                    .chain(&config.input_guardrails)
                    .cloned()
                    .collect();
                state.input_guardrail_results = run_input_guardrails(
                    &guardrails,
                    &state.original_input,
                    &state.context,
                    &agent,
                )
                .await?;
            }

            let next_step = self
                .run_single_turn(state, config, callbacks.as_deref_mut())
                .await?;

            match next_step {
                NextStep::FinalOutput(output) => {
                    let agent = Arc::clone(&state.current_agent);
                    let guardrails: Vec<Arc<dyn OutputGuardrail>> = agent
                        .output_guardrails
                        .iter()
                        .chain(&config.output_guardrails)
                        .cloned()
                        .collect();
                    state.output_guardrail_results = run_output_guardrails(
                        &guardrails,
                        &output,
                        &state.context,
                        &agent,
                    )
                    .await?;

                    debug!(agent = %agent.name, "Agent completed with output");
                    state.final_output = Some(output);
                    state.close_span();
                    return Ok(());
                }
                NextStep::Handoff(handoff) => {
                    info!(
                        from = %state.current_agent.name,
                        to = handoff.agent_name(),
                        "Handing off"
                    );
                    let items = std::mem::take(&mut state.generated_items);
                    state.generated_items = handoff.apply_input_filter(
                        items,
                        &state.context,
                        config.handoff_input_filter.as_ref(),
                    );
                    state.close_span();
                    state.current_agent = Arc::clone(handoff.agent());

                    if let Some(cb) = callbacks.as_deref_mut() {
                        cb.emit_agent_changed(&state.current_agent);
                    }
                }
                NextStep::RunAgain => {
                    debug!("Continuing agent loop (tools executed)");
                }
            }
        }
    }

    /// One model call and its immediate consequences
    async fn run_single_turn(
        &self,
        state: &mut RunState,
        config: &RunConfig,
        mut callbacks: Option<&mut StreamCallbacks>,
    ) -> Result<NextStep> {
        let agent = Arc::clone(&state.current_agent);
        let instructions = agent.system_prompt(&state.context);
        let input = state.input_list();
        let model = self.resolve_model(&agent, config)?;
        let settings = self.resolve_settings(&agent, config);

        let request = ModelRequest {
            instructions: instructions.as_deref(),
            input: &input,
            settings: &settings,
            tools: &agent.tools,
            output_type: &agent.output_type,
            handoffs: &agent.handoffs,
        };

        ensure_not_cancelled(&state.context)?;
        debug!(agent = %agent.name, model = model.name(), items = input.len(), "Calling model");

        let token = state.context.cancellation_token().clone();
        let response = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(AgentError::Cancelled),
            response = call_model(model.as_ref(), request, callbacks.as_deref_mut()) => response?,
        };

        state.context.add_usage(&response.usage);
        state.model_responses.push(response.clone());

        let output = response.output;
        state.generated_items.push(RunItem::AiMessage(output.clone()));

        if let Some(handoff) = output.handoff.as_deref().and_then(|name| agent.find_handoff(name)) {
            return Ok(NextStep::Handoff(handoff.clone()));
        }

        if !output.tool_calls.is_empty() {
            debug!("Executing {} tool calls", output.tool_calls.len());
            for call in &output.tool_calls {
                ensure_not_cancelled(&state.context)?;

                let Some(tool) = agent.find_tool(&call.name) else {
                    if config.strict_tool_lookup {
                        return Err(AgentError::UnknownTool(call.name.clone()));
                    }
                    warn!(agent = %agent.name, tool = %call.name, "Skipping call to unknown tool");
                    continue;
                };

                if let Some(cb) = callbacks.as_deref_mut() {
                    cb.emit_tool_call(call);
                }

                debug!(tool = %call.name, "Invoking tool");
                let result = invoke_tool(tool.as_ref(), call, &state.context).await?;

                if let Some(cb) = callbacks.as_deref_mut() {
                    cb.emit_tool_call_result(call, &result);
                }

                state.generated_items.push(RunItem::ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    result,
                });
            }
            return Ok(NextStep::RunAgain);
        }

        let final_output = if agent.output_type.is_typed() {
            output
                .content
                .as_deref()
                .and_then(|content| serde_json::from_str(content).ok())
                .unwrap_or_else(|| output.to_value())
        } else {
            Value::String(output.content.unwrap_or_default())
        };
        Ok(NextStep::FinalOutput(final_output))
    }

    /// Run config model, then the agent's, then the default model name
    fn resolve_model(&self, agent: &Agent, config: &RunConfig) -> Result<Arc<dyn Model>> {
        let provider = config.model_provider.as_ref().unwrap_or(&self.provider);
        match config.model.as_ref().or(agent.model.as_ref()) {
            Some(ModelRef::Instance(model)) => Ok(Arc::clone(model)),
            Some(ModelRef::Named(name)) => provider.get_model(Some(name)),
            None => provider.get_model(Some(&self.config.default_model)),
        }
    }

    /// Runtime defaults < agent settings < run config settings
    fn resolve_settings(&self, agent: &Agent, config: &RunConfig) -> ModelSettings {
        self.config
            .model_settings
            .resolve(Some(&agent.model_settings))
            .resolve(config.model_settings.as_ref())
    }
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("tracer", &self.tracer)
            .field("config", &self.config)
            .finish()
    }
}

fn ensure_not_cancelled(ctx: &RunContext) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(AgentError::Cancelled);
    }
    Ok(())
}

async fn call_model(
    model: &dyn Model,
    request: ModelRequest<'_>,
    callbacks: Option<&mut StreamCallbacks>,
) -> Result<ModelResponse> {
    let Some(callbacks) = callbacks else {
        return model.get_response(request).await;
    };

    let mut stream = model.stream_response(request).await?;
    let mut accumulator = StreamAccumulator::new();
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::Chunk {
                content,
                tool_calls,
            } => {
                if !content.is_empty() {
                    callbacks.emit_token(&content);
                }
                accumulator.push_content(&content);
                for delta in &tool_calls {
                    accumulator.push_tool_call(delta);
                }
            }
            StreamEvent::Completed(response) => return Ok(response),
        }
    }

    debug!("Model stream ended without a completed record");
    Ok(accumulator.into_response(&prompt_text(&request)))
}

fn prompt_text(request: &ModelRequest<'_>) -> String {
    let mut text = request.instructions.unwrap_or_default().to_string();
    for item in request.input {
        match item {
            InputItem::Message { content, .. } => text.push_str(content.as_deref().unwrap_or_default()),
            InputItem::ToolResult { content, .. } => text.push_str(&content.to_string()),
            InputItem::Other { content, .. } => text.push_str(&content.to_string()),
        }
    }
    text
}

async fn invoke_tool(
    tool: &dyn crate::tool::Tool,
    call: &ToolCall,
    ctx: &RunContext,
) -> Result<Value> {
    let args = call.parsed_arguments()?;
    tool.invoke(ctx, args).await.map_err(|e| match e {
        AgentError::ToolError { .. } | AgentError::Cancelled => e,
        other => AgentError::ToolError {
            tool_name: call.name.clone(),
            message: other.to_string(),
        },
    })
}
