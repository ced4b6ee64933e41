//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use hanzo_agent_runtime::errors::{AgentError, Result};
use hanzo_agent_runtime::model::{Model, ModelProvider, ModelRequest};
use hanzo_agent_runtime::trace::{SpanError, TraceProcessor, TraceSpan, Tracer};
use hanzo_agent_runtime::types::{ModelOutput, ModelResponse, ModelSettings, ToolCall, Usage};
use hanzo_agent_runtime::{InputItem, Runner};
use serde_json::{Map, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What the model was asked on one call
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub instructions: Option<String>,
    pub input: Vec<InputItem>,
    pub tools: Vec<String>,
    pub handoffs: Vec<String>,
    pub settings: ModelSettings,
}

/// Replays canned responses in order and records every request
#[derive(Default)]
pub struct ScriptedModel {
    responses: Mutex<VecDeque<ModelResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedModel {
    pub fn new(responses: impl IntoIterator<Item = ModelResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Model for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn get_response(&self, request: ModelRequest<'_>) -> Result<ModelResponse> {
        self.requests.lock().unwrap().push(RecordedRequest {
            instructions: request.instructions.map(str::to_string),
            input: request.input.to_vec(),
            tools: request.tools.iter().map(|t| t.name().to_string()).collect(),
            handoffs: request
                .handoffs
                .iter()
                .map(|h| h.agent_name().to_string())
                .collect(),
            settings: request.settings.clone(),
        });

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AgentError::ModelError("script exhausted".to_string()))
    }
}

/// Hands out the same scripted model for every name
pub struct ScriptedProvider(pub Arc<ScriptedModel>);

impl ModelProvider for ScriptedProvider {
    fn get_model(&self, _name: Option<&str>) -> Result<Arc<dyn Model>> {
        Ok(self.0.clone())
    }
}

/// A model that never answers
pub struct HangingModel;

#[async_trait]
impl Model for HangingModel {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn get_response(&self, _request: ModelRequest<'_>) -> Result<ModelResponse> {
        futures::future::pending::<()>().await;
        Err(AgentError::ModelError("unreachable".to_string()))
    }
}

/// Collects trace lifecycle events as readable strings
#[derive(Default)]
pub struct RecordingProcessor {
    events: Mutex<Vec<String>>,
    errors: Mutex<Vec<SpanError>>,
}

impl RecordingProcessor {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<SpanError> {
        self.errors.lock().unwrap().clone()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl TraceProcessor for RecordingProcessor {
    fn on_trace_start(
        &self,
        _trace_id: &str,
        workflow_name: &str,
        _group_id: Option<&str>,
        _metadata: &Map<String, Value>,
    ) {
        self.push(format!("trace_start:{}", workflow_name));
    }

    fn on_span_start(&self, _trace_id: &str, span: &TraceSpan) {
        self.push(format!("span_start:{}", span.name));
    }

    fn on_span_error(&self, _trace_id: &str, span: &TraceSpan, error: &SpanError) {
        self.errors.lock().unwrap().push(error.clone());
        self.push(format!("span_error:{}", span.name));
    }

    fn on_span_end(&self, _trace_id: &str, span: &TraceSpan) {
        self.push(format!("span_end:{}", span.name));
    }

    fn on_trace_end(&self, _trace_id: &str, spans: &HashMap<String, TraceSpan>, _duration: Duration) {
        self.push(format!("trace_end:{}", spans.len()));
    }
}

/// Runner over `model` whose traces go to `recorder`
pub fn runner_with(model: &Arc<ScriptedModel>, recorder: &Arc<RecordingProcessor>) -> Runner {
    Runner::new(ScriptedProvider(model.clone()))
        .with_tracer(Tracer::new().with_shared_processor(recorder.clone()))
}

pub fn text(content: &str) -> ModelResponse {
    ModelResponse::new(ModelOutput::text(content), Usage::new(1, 10, 5))
}

pub fn tool_call(name: &str, id: &str, arguments: Value) -> ModelResponse {
    ModelResponse::new(
        ModelOutput::tool_calls(vec![ToolCall::new(name, arguments).with_id(id)]),
        Usage::new(1, 10, 5),
    )
}

pub fn handoff(agent_name: &str) -> ModelResponse {
    ModelResponse::new(ModelOutput::handoff(agent_name), Usage::new(1, 10, 5))
}
