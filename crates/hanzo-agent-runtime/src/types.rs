//! Core value types: usage accounting, model output and model settings

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::iter::Sum;
use std::ops::AddAssign;

/// Usage statistics
///
/// Forms a monoid under [`Usage::add`]; the runner sums one value per model
/// call into the run's [`RunContext`](crate::RunContext).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub requests: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl Usage {
    /// Create usage where the total is `input_tokens + output_tokens`
    pub fn new(requests: usize, input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            requests,
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }

    /// Override the derived total with a provider-reported one
    ///
    /// A zero total keeps the derived value.
    pub fn with_total_tokens(mut self, total_tokens: usize) -> Self {
        if total_tokens > 0 {
            self.total_tokens = total_tokens;
        }
        self
    }

    /// Add usage from another instance
    pub fn add(&mut self, other: &Usage) {
        self.requests += other.requests;
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

impl AddAssign<&Usage> for Usage {
    fn add_assign(&mut self, rhs: &Usage) {
        Usage::add(self, rhs);
    }
}

impl<'a> Sum<&'a Usage> for Usage {
    fn sum<I: Iterator<Item = &'a Usage>>(iter: I) -> Self {
        iter.fold(Usage::default(), |mut acc, u| {
            acc += u;
            acc
        })
    }
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub name: String,

    /// Arguments as a JSON object, or a JSON-encoded string of one
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Arguments decoded into a JSON value
    ///
    /// Providers that pass arguments through as a raw string are decoded
    /// here; an absent or empty payload becomes an empty object.
    pub fn parsed_arguments(&self) -> crate::errors::Result<Value> {
        match &self.arguments {
            Value::Null => Ok(json!({})),
            Value::String(raw) if raw.trim().is_empty() => Ok(json!({})),
            Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                crate::errors::AgentError::InvalidJson(format!(
                    "arguments for tool '{}': {}",
                    self.name, e
                ))
            }),
            other => Ok(other.clone()),
        }
    }
}

/// Structured content of one model reply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Name of the handoff target the model selected, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff: Option<String>,
}

impl ModelOutput {
    /// A plain text reply
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// A reply consisting of tool calls only
    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    /// A reply selecting a handoff target
    pub fn handoff(agent_name: impl Into<String>) -> Self {
        Self {
            handoff: Some(agent_name.into()),
            ..Default::default()
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Model response from LLM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelResponse {
    pub output: ModelOutput,

    pub usage: Usage,

    /// Provider response id for reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referenceable_id: Option<String>,
}

impl ModelResponse {
    pub fn new(output: ModelOutput, usage: Usage) -> Self {
        Self {
            output,
            usage,
            referenceable_id: None,
        }
    }

    pub fn with_referenceable_id(mut self, id: impl Into<String>) -> Self {
        self.referenceable_id = Some(id.into());
        self
    }
}

/// The kind of final output an agent produces
#[derive(Debug, Clone, Default, PartialEq)]
pub enum OutputType {
    /// Plain text; the final output is the reply's content
    #[default]
    Untyped,

    /// Structured output described by a JSON schema
    Typed { name: String, schema: Value },
}

impl OutputType {
    /// Structured output type derived from a Rust type
    pub fn of<T: JsonSchema>() -> Self {
        let schema = serde_json::to_value(schemars::schema_for!(T)).unwrap_or(Value::Null);
        OutputType::Typed {
            name: T::schema_name().to_string(),
            schema,
        }
    }

    pub fn typed(name: impl Into<String>, schema: Value) -> Self {
        OutputType::Typed {
            name: name.into(),
            schema,
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, OutputType::Typed { .. })
    }

    /// Tag recorded on agent spans
    pub fn tag(&self) -> &str {
        match self {
            OutputType::Untyped => "string",
            OutputType::Typed { name, .. } => name,
        }
    }

    pub fn schema(&self) -> Option<&Value> {
        match self {
            OutputType::Untyped => None,
            OutputType::Typed { schema, .. } => Some(schema),
        }
    }
}

/// Model settings for tuning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,

    /// Request timeout in seconds; honored by the client, never sent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl ModelSettings {
    pub fn with_temperature(&self, temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
            ..self.clone()
        }
    }

    pub fn with_top_p(&self, top_p: f32) -> Self {
        Self {
            top_p: Some(top_p),
            ..self.clone()
        }
    }

    pub fn with_frequency_penalty(&self, penalty: f32) -> Self {
        Self {
            frequency_penalty: Some(penalty),
            ..self.clone()
        }
    }

    pub fn with_presence_penalty(&self, penalty: f32) -> Self {
        Self {
            presence_penalty: Some(penalty),
            ..self.clone()
        }
    }

    pub fn with_max_tokens(&self, max_tokens: usize) -> Self {
        Self {
            max_tokens: Some(max_tokens),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, seconds: u64) -> Self {
        Self {
            timeout: Some(seconds),
            ..self.clone()
        }
    }

    pub fn with_stop(&self, stop: Vec<String>) -> Self {
        Self {
            stop: Some(stop),
            ..self.clone()
        }
    }

    /// Build a new value taking each field from `other` when set
    pub fn merge(&self, other: Option<&ModelSettings>) -> ModelSettings {
        let Some(other) = other else {
            return self.clone();
        };

        ModelSettings {
            temperature: other.temperature.or(self.temperature),
            top_p: other.top_p.or(self.top_p),
            frequency_penalty: other.frequency_penalty.or(self.frequency_penalty),
            presence_penalty: other.presence_penalty.or(self.presence_penalty),
            max_tokens: other.max_tokens.or(self.max_tokens),
            timeout: other.timeout.or(self.timeout),
            stop: other.stop.clone().or_else(|| self.stop.clone()),
        }
    }

    /// Copy `self` and overwrite only the fields `other` sets
    pub fn resolve(&self, other: Option<&ModelSettings>) -> ModelSettings {
        let mut result = self.clone();
        let Some(other) = other else {
            return result;
        };

        if other.temperature.is_some() {
            result.temperature = other.temperature;
        }
        if other.top_p.is_some() {
            result.top_p = other.top_p;
        }
        if other.frequency_penalty.is_some() {
            result.frequency_penalty = other.frequency_penalty;
        }
        if other.presence_penalty.is_some() {
            result.presence_penalty = other.presence_penalty;
        }
        if other.max_tokens.is_some() {
            result.max_tokens = other.max_tokens;
        }
        if other.timeout.is_some() {
            result.timeout = other.timeout;
        }
        if other.stop.is_some() {
            result.stop = other.stop.clone();
        }
        result
    }

    /// Request parameters for a chat-completions style body
    pub fn to_request_params(&self) -> Map<String, Value> {
        let mut params = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        params.remove("timeout");
        params
    }
}
