//! Model capability: the seam between the runner and a language-model backend

use crate::errors::Result;
use crate::handoff::Handoff;
use crate::items::InputItem;
use crate::tool::Tool;
use crate::types::{ModelOutput, ModelResponse, ModelSettings, OutputType, ToolCall, Usage};
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;

/// Everything a model needs for one call
#[derive(Clone, Copy)]
pub struct ModelRequest<'a> {
    pub instructions: Option<&'a str>,
    pub input: &'a [InputItem],
    pub settings: &'a ModelSettings,
    pub tools: &'a [Arc<dyn Tool>],
    pub output_type: &'a OutputType,
    pub handoffs: &'a [Handoff],
}

impl std::fmt::Debug for ModelRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRequest")
            .field("instructions", &self.instructions)
            .field("input", &self.input.len())
            .field("settings", self.settings)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("output_type", &self.output_type.tag())
            .field("handoffs", &self.handoffs.iter().map(|h| h.agent_name()).collect::<Vec<_>>())
            .finish()
    }
}

/// Partial tool call received while streaming
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCallDelta {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

/// Incremental event of a streamed model response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A content delta and any tool-call fragments that arrived with it
    Chunk {
        content: String,
        tool_calls: Vec<ToolCallDelta>,
    },

    /// The final record of the response
    Completed(ModelResponse),
}

impl StreamEvent {
    pub fn token(content: impl Into<String>) -> Self {
        StreamEvent::Chunk {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

pub type ModelStream = Pin<Box<dyn Stream<Item = Result<StreamEvent>> + Send>>;

/// A language model the runner can call
#[async_trait]
pub trait Model: Send + Sync {
    fn name(&self) -> &str;

    async fn get_response(&self, request: ModelRequest<'_>) -> Result<ModelResponse>;

    /// Stream a response as incremental events
    ///
    /// The default replays [`Model::get_response`] as one content chunk
    /// followed by the completed record.
    async fn stream_response(&self, request: ModelRequest<'_>) -> Result<ModelStream> {
        let response = self.get_response(request).await?;
        let mut events = Vec::with_capacity(2);
        if let Some(content) = response.output.content.as_ref().filter(|c| !c.is_empty()) {
            events.push(Ok(StreamEvent::token(content.clone())));
        }
        events.push(Ok(StreamEvent::Completed(response)));
        Ok(Box::pin(futures::stream::iter(events)))
    }
}

/// Resolves model names to models
pub trait ModelProvider: Send + Sync {
    /// Look up a model; `None` selects the provider's default
    fn get_model(&self, name: Option<&str>) -> Result<Arc<dyn Model>>;
}

/// A model named for lookup, or a concrete instance
#[derive(Clone)]
pub enum ModelRef {
    Named(String),
    Instance(Arc<dyn Model>),
}

impl ModelRef {
    pub fn instance(model: impl Model + 'static) -> Self {
        ModelRef::Instance(Arc::new(model))
    }

    pub fn name(&self) -> &str {
        match self {
            ModelRef::Named(name) => name,
            ModelRef::Instance(model) => model.name(),
        }
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        ModelRef::Named(name.to_string())
    }
}

impl From<String> for ModelRef {
    fn from(name: String) -> Self {
        ModelRef::Named(name)
    }
}

impl From<Arc<dyn Model>> for ModelRef {
    fn from(model: Arc<dyn Model>) -> Self {
        ModelRef::Instance(model)
    }
}

impl std::fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelRef::Named(name) => f.debug_tuple("Named").field(name).finish(),
            ModelRef::Instance(model) => f.debug_tuple("Instance").field(&model.name()).finish(),
        }
    }
}

/// Rough token estimate used when a stream reports no usage
pub fn estimate_token_count(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds streamed chunks into a final model output
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_content(&mut self, delta: &str) {
        self.content.push_str(delta);
    }

    pub fn push_tool_call(&mut self, delta: &ToolCallDelta) {
        let call = self.tool_calls.entry(delta.index).or_default();
        if let Some(id) = &delta.id {
            call.id = Some(id.clone());
        }
        if let Some(name) = &delta.name {
            call.name.push_str(name);
        }
        call.arguments.push_str(&delta.arguments);
    }

    /// Fold one event; completed records are ignored
    pub fn push(&mut self, event: &StreamEvent) {
        if let StreamEvent::Chunk {
            content,
            tool_calls,
        } = event
        {
            self.push_content(content);
            for delta in tool_calls {
                self.push_tool_call(delta);
            }
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Final output; tool-call arguments that are not valid JSON are kept as raw strings
    pub fn into_output(self) -> ModelOutput {
        let tool_calls = self
            .tool_calls
            .into_values()
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&call.arguments)
                        .unwrap_or(Value::String(call.arguments))
                };
                ToolCall {
                    id: call.id,
                    name: call.name,
                    arguments,
                }
            })
            .collect();

        ModelOutput {
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls,
            handoff: None,
        }
    }

    /// Final response with usage estimated from the prompt and output text
    pub fn into_response(self, prompt_chars: &str) -> ModelResponse {
        let output_tokens = estimate_token_count(&self.content);
        let usage = Usage::new(1, estimate_token_count(prompt_chars), output_tokens);
        ModelResponse::new(self.into_output(), usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Model for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn get_response(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
            let last = match request.input.last() {
                Some(InputItem::Message { content, .. }) => content.clone().unwrap_or_default(),
                _ => String::new(),
            };
            Ok(ModelResponse::new(ModelOutput::text(last), Usage::new(1, 1, 1)))
        }
    }

    #[tokio::test]
    async fn test_default_stream_replays_response() {
        let input = vec![InputItem::user_message("hi")];
        let settings = ModelSettings::default();
        let request = ModelRequest {
            instructions: None,
            input: &input,
            settings: &settings,
            tools: &[],
            output_type: &OutputType::Untyped,
            handoffs: &[],
        };

        let events: Vec<_> = Echo.stream_response(request).await.unwrap().collect().await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].as_ref().unwrap(), &StreamEvent::token("hi"));
        assert!(matches!(events[1], Ok(StreamEvent::Completed(_))));
    }

    #[test]
    fn test_model_ref_instance() {
        let model_ref = ModelRef::instance(Echo);
        assert_eq!(model_ref.name(), "echo");
        assert_eq!(ModelRef::from("gpt-4o").name(), "gpt-4o");

        let ModelRef::Instance(model) = model_ref else {
            panic!("expected an instance");
        };
        let input = vec![InputItem::user_message("ping")];
        let settings = ModelSettings::default();
        let request = ModelRequest {
            instructions: None,
            input: &input,
            settings: &settings,
            tools: &[],
            output_type: &OutputType::Untyped,
            handoffs: &[],
        };
        let response = tokio_test::block_on(model.get_response(request)).unwrap();
        assert_eq!(response.output.content.as_deref(), Some("ping"));
    }

    #[test]
    fn test_accumulator_joins_fragments() {
        let mut acc = StreamAccumulator::new();
        acc.push(&StreamEvent::token("It is "));
        acc.push(&StreamEvent::Chunk {
            content: "sunny".into(),
            tool_calls: vec![ToolCallDelta {
                index: 0,
                id: Some("call_1".into()),
                name: Some("get_weather".into()),
                arguments: "{\"city\":".into(),
            }],
        });
        acc.push_tool_call(&ToolCallDelta {
            index: 0,
            arguments: "\"Tokyo\"}".into(),
            ..Default::default()
        });

        let output = acc.into_output();
        assert_eq!(output.content.as_deref(), Some("It is sunny"));
        assert_eq!(output.tool_calls.len(), 1);
        assert_eq!(output.tool_calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(output.tool_calls[0].arguments, json!({"city": "Tokyo"}));
    }

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_token_count(""), 0);
        assert_eq!(estimate_token_count("abcd"), 1);
        assert_eq!(estimate_token_count("abcde"), 2);
    }
}
