//! Tool system for agents

use crate::agent::Agent;
use crate::context::RunContext;
use crate::errors::{AgentError, Result};
use crate::result::RunResult;
use crate::runner::{RunConfig, Runner};
use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;

/// Tool trait for agent tools
///
/// Tools are functions that agents can call to perform actions.
/// They have a name, description, JSON schema, and an invoke method.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name of the tool
    fn name(&self) -> &str;

    /// A description of what the tool does
    fn description(&self) -> &str;

    /// JSON schema for the tool's parameters
    fn json_schema(&self) -> Value;

    /// Invoke the tool with the run context and decoded arguments
    async fn invoke(&self, ctx: &RunContext, args: Value) -> Result<Value>;
}

/// Schema used when a tool takes no parameters
pub fn empty_parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {},
    })
}

type SyncHandler = Arc<dyn Fn(&RunContext, Value) -> Result<Value> + Send + Sync>;
type AsyncHandler = Arc<dyn Fn(RunContext, Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

#[derive(Clone)]
enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// A function-based tool implementation
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    json_schema: Value,
    handler: Handler,
}

impl FunctionTool {
    /// Create a new function tool
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        json_schema: Value,
        handler: impl Fn(&RunContext, Value) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema,
            handler: Handler::Sync(Arc::new(handler)),
        }
    }

    /// Builder for creating function tools
    pub fn builder(name: impl Into<String>) -> FunctionToolBuilder {
        FunctionToolBuilder {
            name: name.into(),
            description: String::new(),
            json_schema: None,
            handler: None,
        }
    }

    /// Create a tool whose parameter schema is inferred from `Args`
    pub fn typed<Args, Out, F>(
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Result<Self>
    where
        Args: DeserializeOwned + JsonSchema + 'static,
        Out: Serialize + 'static,
        F: Fn(&RunContext, Args) -> Result<Out> + Send + Sync + 'static,
    {
        let name = name.into();
        let tool_name = name.clone();
        let handler = move |ctx: &RunContext, args: Value| -> Result<Value> {
            let parsed: Args = decode_args(&tool_name, args)?;
            let output = f(ctx, parsed)?;
            Ok(serde_json::to_value(output)?)
        };

        Ok(Self {
            name,
            description: description.into(),
            json_schema: schema_for::<Args>()?,
            handler: Handler::Sync(Arc::new(handler)),
        })
    }

    /// Async variant of [`FunctionTool::typed`] for tools that perform I/O
    pub fn typed_async<Args, Out, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        f: F,
    ) -> Result<Self>
    where
        Args: DeserializeOwned + JsonSchema + Send + 'static,
        Out: Serialize + Send + 'static,
        F: Fn(RunContext, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Out>> + Send + 'static,
    {
        let name = name.into();
        let tool_name = name.clone();
        let f = Arc::new(f);
        let handler = move |ctx: RunContext, args: Value| -> BoxFuture<'static, Result<Value>> {
            let parsed = decode_args::<Args>(&tool_name, args);
            let f = Arc::clone(&f);
            Box::pin(async move {
                let output = f(ctx, parsed?).await?;
                Ok(serde_json::to_value(output)?)
            })
        };

        Ok(Self {
            name,
            description: description.into(),
            json_schema: schema_for::<Args>()?,
            handler: Handler::Async(Arc::new(handler)),
        })
    }
}

fn decode_args<Args: DeserializeOwned>(tool_name: &str, args: Value) -> Result<Args> {
    serde_json::from_value(args).map_err(|e| AgentError::ToolError {
        tool_name: tool_name.to_string(),
        message: format!("invalid arguments: {}", e),
    })
}

fn schema_for<Args: JsonSchema>() -> Result<Value> {
    let mut schema = serde_json::to_value(schemars::schema_for!(Args))?;
    if let Value::Object(map) = &mut schema {
        map.remove("$schema");
        map.remove("title");
        map.entry("properties").or_insert_with(|| json!({}));
    }
    Ok(schema)
}

#[async_trait]
impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn json_schema(&self) -> Value {
        self.json_schema.clone()
    }

    async fn invoke(&self, ctx: &RunContext, args: Value) -> Result<Value> {
        match &self.handler {
            Handler::Sync(handler) => handler(ctx, args),
            Handler::Async(handler) => handler(ctx.clone(), args).await,
        }
    }
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Builder for FunctionTool
pub struct FunctionToolBuilder {
    name: String,
    description: String,
    json_schema: Option<Value>,
    handler: Option<Handler>,
}

impl FunctionToolBuilder {
    /// Set the tool description
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Set the JSON schema
    pub fn schema(mut self, schema: Value) -> Self {
        self.json_schema = Some(schema);
        self
    }

    /// Set the handler function
    pub fn handler<F>(mut self, f: F) -> Self
    where
        F: Fn(&RunContext, Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.handler = Some(Handler::Sync(Arc::new(f)));
        self
    }

    /// Set an async handler function
    pub fn async_handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(RunContext, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let handler: AsyncHandler = Arc::new(move |ctx, args| Box::pin(f(ctx, args)));
        self.handler = Some(Handler::Async(handler));
        self
    }

    /// Build the function tool
    ///
    /// Without an explicit schema the tool advertises an empty parameter object.
    pub fn build(self) -> Result<FunctionTool> {
        let handler = self
            .handler
            .ok_or_else(|| AgentError::Configuration("Tool handler not set".to_string()))?;

        Ok(FunctionTool {
            name: self.name,
            description: self.description,
            json_schema: self.json_schema.unwrap_or_else(empty_parameters_schema),
            handler,
        })
    }
}

/// Extracts a tool result from a nested run
pub type OutputExtractor = Arc<dyn Fn(&RunResult) -> String + Send + Sync>;

/// An agent exposed as a tool; invoking it runs the agent to completion
#[derive(Clone)]
pub struct AgentTool {
    agent: Agent,
    runner: Runner,
    name: String,
    description: String,
    output_extractor: Option<OutputExtractor>,
}

impl AgentTool {
    pub fn new(
        agent: Agent,
        runner: Runner,
        name: Option<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            name: name.unwrap_or_else(|| function_style_name(&agent.name)),
            description: description.unwrap_or_default(),
            agent,
            runner,
            output_extractor: None,
        }
    }

    /// Use a custom extractor instead of the nested run's text output
    pub fn with_output_extractor(
        mut self,
        extractor: impl Fn(&RunResult) -> String + Send + Sync + 'static,
    ) -> Self {
        self.output_extractor = Some(Arc::new(extractor));
        self
    }
}

#[async_trait]
impl Tool for AgentTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn json_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "input": {
                    "type": "string",
                    "description": "The input to send to the agent",
                }
            },
            "required": ["input"],
        })
    }

    async fn invoke(&self, ctx: &RunContext, args: Value) -> Result<Value> {
        let input = match &args {
            Value::String(s) => s.clone(),
            Value::Object(map) => match map.get("input") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => args.to_string(),
            },
            other => other.to_string(),
        };

        let result = self
            .runner
            .run(&self.agent, input, ctx.fork(), None, &RunConfig::default())
            .await?;

        let output = match &self.output_extractor {
            Some(extract) => extract(&result),
            None => result.text_output(),
        };
        Ok(Value::String(output))
    }
}

/// Lower-case a display name and join whitespace runs with `_`
pub fn function_style_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}
