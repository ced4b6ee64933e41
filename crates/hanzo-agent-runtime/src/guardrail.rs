//! Input and output guardrails
//!
//! A guardrail inspects the run input (before the first model call) or the
//! final output (before the run returns) and reports a verdict. A triggered
//! tripwire aborts the run with the guardrail's result attached to the error.

use crate::agent::Agent;
use crate::context::RunContext;
use crate::errors::{AgentError, Result};
use crate::items::RunInput;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Verdict of a single guardrail check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailOutput {
    pub tripwire_triggered: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GuardrailOutput {
    /// The check passed
    pub fn passed() -> Self {
        Self::default()
    }

    /// The check failed and the run must stop
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            tripwire_triggered: true,
            message: Some(message.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Last path segment of a type name, without generic arguments
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Guardrail run against the input of a run
#[async_trait]
pub trait InputGuardrail: Send + Sync {
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    async fn check(&self, input: &RunInput, ctx: &RunContext, agent: &Agent)
        -> Result<GuardrailOutput>;
}

/// Guardrail run against the final output of a run
#[async_trait]
pub trait OutputGuardrail: Send + Sync {
    fn name(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }

    async fn check(&self, output: &Value, ctx: &RunContext, agent: &Agent)
        -> Result<GuardrailOutput>;
}

type InputCheckFn = dyn Fn(&RunInput, &RunContext, &Agent) -> Result<GuardrailOutput> + Send + Sync;
type OutputCheckFn = dyn Fn(&Value, &RunContext, &Agent) -> Result<GuardrailOutput> + Send + Sync;

/// Input guardrail backed by a closure
#[derive(Clone)]
pub struct InputGuardrailFn {
    name: String,
    check: Arc<InputCheckFn>,
}

impl InputGuardrailFn {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&RunInput, &RunContext, &Agent) -> Result<GuardrailOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl InputGuardrail for InputGuardrailFn {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(
        &self,
        input: &RunInput,
        ctx: &RunContext,
        agent: &Agent,
    ) -> Result<GuardrailOutput> {
        (self.check)(input, ctx, agent)
    }
}

/// Output guardrail backed by a closure
#[derive(Clone)]
pub struct OutputGuardrailFn {
    name: String,
    check: Arc<OutputCheckFn>,
}

impl OutputGuardrailFn {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Value, &RunContext, &Agent) -> Result<GuardrailOutput> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }
}

#[async_trait]
impl OutputGuardrail for OutputGuardrailFn {
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self, output: &Value, ctx: &RunContext, agent: &Agent) -> Result<GuardrailOutput> {
        (self.check)(output, ctx, agent)
    }
}

/// An input guardrail paired with the verdict it produced
#[derive(Clone)]
pub struct InputGuardrailResult {
    pub guardrail: Arc<dyn InputGuardrail>,
    pub output: GuardrailOutput,
}

impl InputGuardrailResult {
    pub fn guardrail_name(&self) -> &str {
        self.guardrail.name()
    }

    pub fn tripwire_triggered(&self) -> bool {
        self.output.tripwire_triggered
    }
}

impl std::fmt::Debug for InputGuardrailResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputGuardrailResult")
            .field("guardrail", &self.guardrail_name())
            .field("output", &self.output)
            .finish()
    }
}

/// An output guardrail paired with the verdict it produced
#[derive(Clone)]
pub struct OutputGuardrailResult {
    pub guardrail: Arc<dyn OutputGuardrail>,
    pub output: GuardrailOutput,

    /// The final output that was checked
    pub agent_output: Value,
}

impl OutputGuardrailResult {
    pub fn guardrail_name(&self) -> &str {
        self.guardrail.name()
    }

    pub fn tripwire_triggered(&self) -> bool {
        self.output.tripwire_triggered
    }
}

impl std::fmt::Debug for OutputGuardrailResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputGuardrailResult")
            .field("guardrail", &self.guardrail_name())
            .field("output", &self.output)
            .field("agent_output", &self.agent_output)
            .finish()
    }
}

/// Run input guardrails in order, stopping at the first tripwire
pub(crate) async fn run_input_guardrails(
    guardrails: &[Arc<dyn InputGuardrail>],
    input: &RunInput,
    ctx: &RunContext,
    agent: &Agent,
) -> Result<Vec<InputGuardrailResult>> {
    let mut results = Vec::new();
    for guardrail in guardrails {
        let output = guardrail.check(input, ctx, agent).await?;
        let result = InputGuardrailResult {
            guardrail: Arc::clone(guardrail),
            output,
        };

        if result.tripwire_triggered() {
            warn!(guardrail = result.guardrail_name(), agent = %agent.name, "Input guardrail tripwire triggered");
            return Err(AgentError::InputGuardrailTripwireTriggered(Box::new(result)));
        }
        debug!(guardrail = result.guardrail_name(), "Input guardrail passed");
        results.push(result);
    }
    Ok(results)
}

/// Run output guardrails in order, stopping at the first tripwire
pub(crate) async fn run_output_guardrails(
    guardrails: &[Arc<dyn OutputGuardrail>],
    output: &Value,
    ctx: &RunContext,
    agent: &Agent,
) -> Result<Vec<OutputGuardrailResult>> {
    let mut results = Vec::new();
    for guardrail in guardrails {
        let verdict = guardrail.check(output, ctx, agent).await?;
        let result = OutputGuardrailResult {
            guardrail: Arc::clone(guardrail),
            output: verdict,
            agent_output: output.clone(),
        };

        if result.tripwire_triggered() {
            warn!(guardrail = result.guardrail_name(), agent = %agent.name, "Output guardrail tripwire triggered");
            return Err(AgentError::OutputGuardrailTripwireTriggered(Box::new(result)));
        }
        debug!(guardrail = result.guardrail_name(), "Output guardrail passed");
        results.push(result);
    }
    Ok(results)
}
