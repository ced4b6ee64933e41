//! Agent implementation

use crate::context::RunContext;
use crate::errors::Result;
use crate::guardrail::{InputGuardrail, OutputGuardrail};
use crate::handoff::Handoff;
use crate::items::RunInput;
use crate::model::{Model, ModelRef};
use crate::result::RunResult;
use crate::runner::{RunConfig, Runner};
use crate::tool::{AgentTool, Tool};
use crate::types::{ModelSettings, OutputType};
use std::sync::Arc;

pub type InstructionsFn = Arc<dyn Fn(&RunContext, &Agent) -> String + Send + Sync>;

/// Instructions for the agent (system prompt)
#[derive(Clone)]
pub enum Instructions {
    /// Static instructions
    Static(String),

    /// Instructions computed from the run context when each turn starts
    Computed(InstructionsFn),
}

impl Instructions {
    pub fn computed(f: impl Fn(&RunContext, &Agent) -> String + Send + Sync + 'static) -> Self {
        Instructions::Computed(Arc::new(f))
    }

    /// Resolve the instructions for a turn
    pub fn resolve(&self, ctx: &RunContext, agent: &Agent) -> String {
        match self {
            Instructions::Static(s) => s.clone(),
            Instructions::Computed(f) => f(ctx, agent),
        }
    }
}

impl From<String> for Instructions {
    fn from(s: String) -> Self {
        Instructions::Static(s)
    }
}

impl From<&str> for Instructions {
    fn from(s: &str) -> Self {
        Instructions::Static(s.to_string())
    }
}

impl std::fmt::Debug for Instructions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instructions::Static(s) => f.debug_tuple("Static").field(s).finish(),
            Instructions::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// An AI agent configured with instructions, tools, and settings
///
/// Agents are the core abstraction for building AI applications.
/// They encapsulate a model, system prompt (instructions), tools, handoffs,
/// guardrails and other configuration. A run never mutates an agent; use
/// [`Agent::clone_with`] to derive a variant.
#[derive(Clone)]
pub struct Agent {
    /// The name of the agent
    pub name: String,

    /// Instructions (system prompt) for the agent
    pub instructions: Option<Instructions>,

    /// Description for when this agent is used as a handoff
    pub handoff_description: Option<String>,

    /// Agents this agent can hand the conversation to
    pub handoffs: Vec<Handoff>,

    /// The model to use; `None` falls back to the runner's default model
    pub model: Option<ModelRef>,

    /// Model settings (temperature, max_tokens, etc.)
    pub model_settings: ModelSettings,

    /// Tools available to the agent
    pub tools: Vec<Arc<dyn Tool>>,

    pub input_guardrails: Vec<Arc<dyn InputGuardrail>>,
    pub output_guardrails: Vec<Arc<dyn OutputGuardrail>>,

    pub output_type: OutputType,
}

impl Agent {
    /// Create a new agent with the given name
    pub fn new(name: impl Into<String>) -> Self {
        AgentBuilder::new(name).build()
    }

    /// Create a builder for the agent
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    /// Clone the agent with modifications
    pub fn clone_with(&self) -> AgentBuilder {
        AgentBuilder {
            agent: self.clone(),
        }
    }

    /// Get the system prompt for the agent
    pub fn system_prompt(&self, ctx: &RunContext) -> Option<String> {
        self.instructions.as_ref().map(|i| i.resolve(ctx, self))
    }

    /// Run the agent with the given input
    ///
    /// This is a convenience method using a fresh context and default
    /// RunConfig. For more control, use `Runner::run` directly.
    pub async fn run(&self, runner: &Runner, input: impl Into<RunInput>) -> Result<RunResult> {
        runner
            .run(self, input, RunContext::new(), None, &RunConfig::default())
            .await
    }

    /// Expose this agent as a tool that runs it to completion
    ///
    /// The tool name defaults to the agent name in lower case with
    /// whitespace replaced by `_`.
    pub fn as_tool(
        &self,
        runner: Runner,
        name: Option<&str>,
        description: Option<&str>,
    ) -> AgentTool {
        let description = description
            .map(str::to_string)
            .or_else(|| self.handoff_description.clone());
        AgentTool::new(self.clone(), runner, name.map(str::to_string), description)
    }

    /// Add a tool to the agent
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add a handoff
    pub fn with_handoff(mut self, handoff: impl Into<Handoff>) -> Self {
        self.handoffs.push(handoff.into());
        self
    }

    /// First tool with the given name
    pub fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// First handoff targeting the agent with the given name
    pub fn find_handoff(&self, agent_name: &str) -> Option<&Handoff> {
        self.handoffs.iter().find(|h| h.agent_name() == agent_name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn handoff_names(&self) -> Vec<String> {
        self.handoffs
            .iter()
            .map(|h| h.agent_name().to_string())
            .collect()
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("tools", &self.tool_names())
            .field("handoffs", &self.handoff_names())
            .field("output_type", &self.output_type.tag())
            .finish()
    }
}

/// Builder for creating agents
pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            agent: Agent {
                name: name.into(),
                instructions: None,
                handoff_description: None,
                handoffs: Vec::new(),
                model: None,
                model_settings: ModelSettings::default(),
                tools: Vec::new(),
                input_guardrails: Vec::new(),
                output_guardrails: Vec::new(),
                output_type: OutputType::Untyped,
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.agent.name = name.into();
        self
    }

    /// Set the agent instructions
    pub fn instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.agent.instructions = Some(instructions.into());
        self
    }

    /// Compute the instructions from the run context each turn
    pub fn dynamic_instructions(
        mut self,
        f: impl Fn(&RunContext, &Agent) -> String + Send + Sync + 'static,
    ) -> Self {
        self.agent.instructions = Some(Instructions::computed(f));
        self
    }

    /// Set the model by name, or pass a [`ModelRef`]
    pub fn model(mut self, model: impl Into<ModelRef>) -> Self {
        self.agent.model = Some(model.into());
        self
    }

    /// Use a concrete model instance
    pub fn model_instance(mut self, model: impl Model + 'static) -> Self {
        self.agent.model = Some(ModelRef::instance(model));
        self
    }

    /// Add a tool
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.agent.tools.push(Arc::new(tool));
        self
    }

    /// Add multiple tools
    pub fn tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.agent.tools.extend(tools);
        self
    }

    /// Add a handoff; plain agents are wrapped in a default [`Handoff`]
    pub fn handoff(mut self, handoff: impl Into<Handoff>) -> Self {
        self.agent.handoffs.push(handoff.into());
        self
    }

    pub fn handoffs(mut self, handoffs: impl IntoIterator<Item = Handoff>) -> Self {
        self.agent.handoffs.extend(handoffs);
        self
    }

    pub fn input_guardrail(mut self, guardrail: impl InputGuardrail + 'static) -> Self {
        self.agent.input_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn output_guardrail(mut self, guardrail: impl OutputGuardrail + 'static) -> Self {
        self.agent.output_guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn output_type(mut self, output_type: OutputType) -> Self {
        self.agent.output_type = output_type;
        self
    }

    /// Set model settings
    pub fn model_settings(mut self, settings: ModelSettings) -> Self {
        self.agent.model_settings = settings;
        self
    }

    /// Set handoff description
    pub fn handoff_description(mut self, desc: impl Into<String>) -> Self {
        self.agent.handoff_description = Some(desc.into());
        self
    }

    /// Build the agent
    pub fn build(self) -> Agent {
        self.agent
    }
}
