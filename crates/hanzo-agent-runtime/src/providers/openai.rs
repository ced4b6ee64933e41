//! OpenAI-compatible chat completions provider
//!
//! Handoffs are offered to the model as a single `handoff` function whose
//! `agent_name` argument enumerates the targets; a call to it is reported
//! through [`ModelOutput::handoff`] instead of as a tool call.

use crate::config::{AgentsConfig, DEFAULT_API_BASE, DEFAULT_MODEL};
use crate::errors::{AgentError, Result};
use crate::handoff::Handoff;
use crate::items::InputItem;
use crate::model::{
    estimate_token_count, Model, ModelProvider, ModelRequest, ModelStream, StreamAccumulator,
    StreamEvent, ToolCallDelta,
};
use crate::types::{ModelOutput, ModelResponse, OutputType, ToolCall, Usage};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// Name of the function the model calls to hand off
pub const HANDOFF_TOOL_NAME: &str = "handoff";

/// Resolves model names to chat-completions models sharing one HTTP client
#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
}

impl OpenAIProvider {
    /// Provider configured from `OPENAI_API_BASE` / `OPENAI_API_KEY`
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: std::env::var("OPENAI_API_BASE")
                .unwrap_or_else(|_| DEFAULT_API_BASE.to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    pub fn from_config(config: &AgentsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            default_model: config.default_model.clone(),
        }
    }

    /// Set the API base URL
    pub fn with_api_base(mut self, url: impl Into<String>) -> Self {
        self.api_base = url.into();
        self
    }

    /// Set the API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn model(&self, name: impl Into<String>) -> OpenAIChatCompletionsModel {
        OpenAIChatCompletionsModel {
            client: self.client.clone(),
            api_base: self.api_base.clone(),
            api_key: self.api_key.clone(),
            model: name.into(),
        }
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelProvider for OpenAIProvider {
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>> {
        let name = name.unwrap_or(&self.default_model);
        Ok(Arc::new(self.model(name)))
    }
}

/// A chat-completions model
#[derive(Debug, Clone)]
pub struct OpenAIChatCompletionsModel {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAIChatCompletionsModel {
    async fn send(&self, body: &Value, timeout: Option<u64>) -> Result<reqwest::Response> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| AgentError::Configuration("API key not set".to_string()))?;

        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.api_base.trim_end_matches('/')))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(seconds) = timeout {
            request = request.timeout(Duration::from_secs(seconds));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(model = %self.model, %status, "OpenAI API error");
            return Err(AgentError::ModelError(format!(
                "LLM API error {}: {}",
                status, error_text
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl Model for OpenAIChatCompletionsModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn get_response(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        let body = build_request_body(&self.model, &request, false);
        debug!(model = %self.model, "Calling LLM");

        let response = self.send(&body, request.settings.timeout).await?;
        let response_json: Value = response.json().await?;
        debug!("LLM response: {:?}", response_json);

        parse_response(&response_json)
    }

    async fn stream_response(&self, request: ModelRequest<'_>) -> Result<ModelStream> {
        let body = build_request_body(&self.model, &request, true);
        let prompt = body["messages"].to_string();
        debug!(model = %self.model, "Streaming LLM");

        let response = self.send(&body, request.settings.timeout).await?;
        Ok(fold_chat_stream(response.bytes_stream().eventsource(), prompt))
    }
}

/// Turn chat-completions SSE events into stream events ending in one `Completed`
///
/// Usage is estimated from `prompt` and the output when the server sends none.
pub(crate) fn fold_chat_stream<S, E>(events: S, prompt: String) -> ModelStream
where
    S: Stream<Item = std::result::Result<eventsource_stream::Event, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let mut events = Box::pin(events);
    let stream = try_stream! {
        let mut accumulator = StreamAccumulator::new();
        let mut usage: Option<Usage> = None;
        let mut response_id: Option<String> = None;

        while let Some(event) = events.next().await {
            let event = event
                .map_err(|e| AgentError::ModelError(format!("OpenAI stream error: {}", e)))?;
            if event.data.trim() == "[DONE]" {
                break;
            }

            let chunk: Value = serde_json::from_str(&event.data).map_err(AgentError::from)?;
            if response_id.is_none() {
                response_id = chunk["id"].as_str().map(str::to_string);
            }
            if chunk["usage"].is_object() {
                usage = Some(parse_usage(&chunk["usage"]));
            }

            let Some(delta) = chunk["choices"].get(0).map(|choice| &choice["delta"]) else {
                continue;
            };
            let content = delta["content"].as_str().unwrap_or_default().to_string();
            let tool_calls = parse_tool_call_deltas(delta);
            if content.is_empty() && tool_calls.is_empty() {
                continue;
            }

            let event = StreamEvent::Chunk { content, tool_calls };
            accumulator.push(&event);
            yield event;
        }

        let output = extract_handoff(accumulator.into_output());
        let usage = usage.unwrap_or_else(|| {
            Usage::new(
                1,
                estimate_token_count(&prompt),
                estimate_token_count(&output.to_value().to_string()),
            )
        });
        let mut response = ModelResponse::new(output, usage);
        if let Some(id) = response_id {
            response = response.with_referenceable_id(id);
        }
        yield StreamEvent::Completed(response);
    };

    Box::pin(stream)
}

/// Build a chat completions request body
pub fn build_request_body(model: &str, request: &ModelRequest<'_>, stream: bool) -> Value {
    let mut messages = Vec::new();
    if let Some(instructions) = request.instructions.filter(|i| !i.is_empty()) {
        messages.push(json!({
            "role": "system",
            "content": instructions,
        }));
    }
    messages.extend(items_to_openai_messages(request.input));

    let mut body = json!({
        "model": model,
        "messages": messages,
    });
    for (key, value) in request.settings.to_request_params() {
        body[key] = value;
    }

    let mut tools: Vec<Value> = request
        .tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name(),
                    "description": t.description(),
                    "parameters": t.json_schema(),
                }
            })
        })
        .collect();
    if !request.handoffs.is_empty() {
        tools.push(handoff_tool(request.handoffs));
    }
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }

    if let OutputType::Typed { name, schema } = request.output_type {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema_name(name),
                "schema": schema,
            }
        });
    }

    if stream {
        body["stream"] = json!(true);
        body["stream_options"] = json!({ "include_usage": true });
    }
    body
}

fn handoff_tool(handoffs: &[Handoff]) -> Value {
    let names: Vec<&str> = handoffs.iter().map(|h| h.agent_name()).collect();
    let targets = handoffs
        .iter()
        .map(|h| format!("{}: {}", h.agent_name(), h.description()))
        .collect::<Vec<_>>()
        .join("; ");

    json!({
        "type": "function",
        "function": {
            "name": HANDOFF_TOOL_NAME,
            "description": format!("Handoff to another agent. Available agents: {}", targets),
            "parameters": {
                "type": "object",
                "properties": {
                    "agent_name": {
                        "type": "string",
                        "enum": names,
                        "description": "The agent to hand the conversation to",
                    }
                },
                "required": ["agent_name"],
            }
        }
    })
}

/// response_format names allow `[a-zA-Z0-9_-]` only
fn schema_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "output".to_string()
    } else {
        cleaned
    }
}

/// Convert InputItems to OpenAI message format
pub fn items_to_openai_messages(items: &[InputItem]) -> Vec<Value> {
    items
        .iter()
        .filter_map(|item| match item {
            InputItem::Message {
                role,
                content,
                tool_calls,
                ..
            } => {
                let mut message = json!({
                    "role": role.as_str(),
                    "content": content,
                });
                if !tool_calls.is_empty() {
                    message["tool_calls"] = tool_calls.iter().map(tool_call_to_openai).collect();
                } else if content.is_none() {
                    message["content"] = json!("");
                }
                Some(message)
            }
            InputItem::ToolResult {
                tool_call_id,
                name,
                content,
            } => Some(json!({
                "role": "tool",
                "tool_call_id": tool_call_id,
                "name": name,
                "content": value_to_text(content),
            })),
            InputItem::Other { item_type, .. } => {
                debug!(item_type = %item_type, "Skipping item the chat API cannot represent");
                None
            }
        })
        .collect()
}

fn tool_call_to_openai(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": value_to_text(&call.arguments),
        }
    })
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn parse_usage(usage: &Value) -> Usage {
    let tokens = |key: &str| usage[key].as_u64().unwrap_or(0) as usize;
    Usage::new(1, tokens("prompt_tokens"), tokens("completion_tokens"))
        .with_total_tokens(tokens("total_tokens"))
}

/// Move a call to the handoff function into the output's handoff field
fn extract_handoff(mut output: ModelOutput) -> ModelOutput {
    let calls = std::mem::take(&mut output.tool_calls);
    for call in calls {
        if call.name == HANDOFF_TOOL_NAME && output.handoff.is_none() {
            let args = call.parsed_arguments().unwrap_or_default();
            if let Some(agent_name) = args["agent_name"].as_str() {
                output.handoff = Some(agent_name.to_string());
                continue;
            }
        }
        output.tool_calls.push(call);
    }
    output
}

/// Parse the LLM response into a ModelResponse
pub fn parse_response(response: &Value) -> Result<ModelResponse> {
    let choice = response["choices"]
        .get(0)
        .ok_or_else(|| AgentError::ModelBehavior("No choices in response".to_string()))?;
    let message = &choice["message"];

    let content = message["content"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    let mut tool_calls = Vec::new();
    if let Some(calls) = message["tool_calls"].as_array() {
        for call in calls {
            let function = &call["function"];
            let name = function["name"]
                .as_str()
                .ok_or_else(|| AgentError::ModelBehavior("Missing tool name".to_string()))?;
            let arguments = parse_arguments(function["arguments"].as_str().unwrap_or_default());

            let mut tool_call = ToolCall::new(name, arguments);
            if let Some(id) = call["id"].as_str() {
                tool_call = tool_call.with_id(id);
            }
            tool_calls.push(tool_call);
        }
    }

    let output = extract_handoff(ModelOutput {
        content,
        tool_calls,
        handoff: None,
    });

    let usage = if response["usage"].is_object() {
        parse_usage(&response["usage"])
    } else {
        Usage::new(1, 0, 0)
    };

    let mut model_response = ModelResponse::new(output, usage);
    if let Some(id) = response["id"].as_str() {
        model_response = model_response.with_referenceable_id(id);
    }
    Ok(model_response)
}

fn parse_tool_call_deltas(delta: &Value) -> Vec<ToolCallDelta> {
    let Some(calls) = delta["tool_calls"].as_array() else {
        return Vec::new();
    };
    calls
        .iter()
        .enumerate()
        .map(|(position, call)| ToolCallDelta {
            index: call["index"].as_u64().map(|i| i as usize).unwrap_or(position),
            id: call["id"].as_str().map(str::to_string),
            name: call["function"]["name"].as_str().map(str::to_string),
            arguments: call["function"]["arguments"]
                .as_str()
                .unwrap_or_default()
                .to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::tool::{FunctionTool, Tool};
    use crate::types::ModelSettings;

    fn weather_tool() -> Arc<dyn Tool> {
        Arc::new(
            FunctionTool::builder("get_weather")
                .description("Weather lookup")
                .schema(json!({"type": "object", "properties": {"city": {"type": "string"}}}))
                .handler(|_ctx, _args| Ok(json!("sunny")))
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_request_body() {
        let input = vec![
            InputItem::user_message("What's the weather?"),
            InputItem::Message {
                role: crate::items::Role::Assistant,
                content: None,
                tool_calls: vec![ToolCall::new("get_weather", json!({"city": "Tokyo"})).with_id("call_1")],
                handoff: None,
            },
            InputItem::ToolResult {
                tool_call_id: Some("call_1".into()),
                name: "get_weather".into(),
                content: json!("sunny"),
            },
        ];
        let settings = ModelSettings::default().with_temperature(0.3).with_timeout(5);
        let tools = vec![weather_tool()];
        let handoffs = vec![
            Handoff::new(Agent::new("Spanish agent")),
            Handoff::new(Agent::new("English agent")),
        ];
        let output_type = OutputType::typed("Weather Report", json!({"type": "object"}));
        let request = ModelRequest {
            instructions: Some("Be brief"),
            input: &input,
            settings: &settings,
            tools: &tools,
            output_type: &output_type,
            handoffs: &handoffs,
        };

        let body = build_request_body("gpt-4o", &request, false);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["temperature"], json!(0.3f32));
        assert!(body.get("timeout").is_none());
        assert!(body.get("stream").is_none());

        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0], json!({"role": "system", "content": "Be brief"}));
        assert_eq!(messages[2]["tool_calls"][0]["function"]["arguments"], "{\"city\":\"Tokyo\"}");
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["content"], "sunny");

        let tools = body["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[1]["function"]["name"], HANDOFF_TOOL_NAME);
        assert_eq!(
            tools[1]["function"]["parameters"]["properties"]["agent_name"]["enum"],
            json!(["Spanish agent", "English agent"])
        );
        assert_eq!(body["response_format"]["json_schema"]["name"], "Weather_Report");

        let streamed = build_request_body("gpt-4o", &request, true);
        assert_eq!(streamed["stream"], true);
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let response = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Tokyo\"}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 8, "total_tokens": 20}
        });

        let parsed = parse_response(&response).unwrap();
        assert_eq!(parsed.referenceable_id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(parsed.output.content, None);
        assert_eq!(parsed.output.tool_calls.len(), 1);
        assert_eq!(parsed.output.tool_calls[0].arguments, json!({"city": "Tokyo"}));
        assert_eq!(parsed.usage, Usage::new(1, 12, 8));
    }

    #[test]
    fn test_parse_response_handoff() {
        let response = json!({
            "choices": [{
                "message": {
                    "content": "",
                    "tool_calls": [{
                        "id": "call_9",
                        "function": {"name": "handoff", "arguments": "{\"agent_name\":\"Spanish agent\"}"}
                    }]
                }
            }]
        });

        let parsed = parse_response(&response).unwrap();
        assert_eq!(parsed.output.handoff.as_deref(), Some("Spanish agent"));
        assert!(parsed.output.tool_calls.is_empty());
        assert_eq!(parsed.usage.requests, 1);
    }

    #[test]
    fn test_parse_response_without_choices() {
        let err = parse_response(&json!({"choices": []})).unwrap_err();
        assert!(matches!(err, AgentError::ModelBehavior(_)));
    }

    #[test]
    fn test_tool_call_deltas() {
        let delta = json!({
            "tool_calls": [{"index": 1, "id": "call_2", "function": {"name": "get_time", "arguments": "{"}}]
        });
        let parsed = parse_tool_call_deltas(&delta);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].index, 1);
        assert_eq!(parsed[0].name.as_deref(), Some("get_time"));
        assert_eq!(parsed[0].arguments, "{");
    }

    fn sse(chunks: &[&'static str]) -> ModelStream {
        let bytes = futures::stream::iter(
            chunks
                .iter()
                .map(|chunk| Ok::<_, std::io::Error>(*chunk))
                .collect::<Vec<_>>(),
        );
        fold_chat_stream(bytes.eventsource(), "[]".to_string())
    }

    async fn collect(stream: ModelStream) -> Vec<StreamEvent> {
        stream.map(|event| event.unwrap()).collect().await
    }

    #[tokio::test]
    async fn test_stream_folds_handoff_call() {
        let events = collect(sse(&[
            "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"handoff\",\"arguments\":\"{\\\"agent_\"}}]}}]}\n\n",
            "data: {\"id\":\"chatcmpl-1\",\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"name\\\":\\\"Spanish agent\\\"}\"}}]}}]}\n\n",
            "data: {\"id\":\"chatcmpl-1\",\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":3,\"total_tokens\":10}}\n\n",
            "data: [DONE]\n\n",
        ]))
        .await;

        assert_eq!(events.len(), 3);
        let Some(StreamEvent::Completed(response)) = events.last() else {
            panic!("expected a completed record last");
        };
        assert_eq!(response.output.handoff.as_deref(), Some("Spanish agent"));
        assert!(response.output.tool_calls.is_empty());
        assert_eq!(response.usage.input_tokens, 7);
        assert_eq!(response.usage.total_tokens, 10);
        assert_eq!(response.referenceable_id.as_deref(), Some("chatcmpl-1"));
    }

    #[tokio::test]
    async fn test_stream_estimates_missing_usage() {
        let events = collect(sse(&[
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hola\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" amigo\"}}]}\n\n",
            "data: [DONE]\n\n",
        ]))
        .await;

        assert_eq!(events[0], StreamEvent::token("Hola"));
        assert_eq!(events[1], StreamEvent::token(" amigo"));
        let StreamEvent::Completed(response) = &events[2] else {
            panic!("expected a completed record last");
        };
        assert_eq!(response.output.content.as_deref(), Some("Hola amigo"));
        assert_eq!(response.usage.requests, 1);
        assert_eq!(response.usage.input_tokens, estimate_token_count("[]"));
        assert_eq!(
            response.usage.output_tokens,
            estimate_token_count(&response.output.to_value().to_string())
        );
        assert!(response.referenceable_id.is_none());
    }

    #[tokio::test]
    async fn test_stream_rejects_malformed_chunk() {
        let mut stream = sse(&["data: {not json\n\n"]);
        assert!(matches!(
            stream.next().await,
            Some(Err(AgentError::JsonParse(_)))
        ));
    }

    #[test]
    fn test_provider_default_model() {
        let provider = OpenAIProvider::from_config(&AgentsConfig::default());
        assert_eq!(provider.get_model(None).unwrap().name(), "gpt-4o");
        assert_eq!(provider.get_model(Some("gpt-4o-mini")).unwrap().name(), "gpt-4o-mini");
    }
}
