//! Streamed runs and their callbacks

mod support;

use hanzo_agent_runtime::prelude::*;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{handoff, runner_with, text, tool_call, HangingModel, RecordingProcessor, ScriptedModel};

fn recording_callbacks(log: &Arc<Mutex<Vec<String>>>) -> StreamCallbacks {
    let (tokens, calls, results, agents, complete) =
        (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
    StreamCallbacks::new()
        .on_token(move |t| tokens.lock().unwrap().push(format!("token:{}", t)))
        .on_tool_call(move |call| calls.lock().unwrap().push(format!("tool_call:{}", call.name)))
        .on_tool_call_result(move |call, result| {
            results
                .lock()
                .unwrap()
                .push(format!("tool_result:{}:{}", call.name, result))
        })
        .on_agent_changed(move |agent| agents.lock().unwrap().push(format!("agent:{}", agent.name)))
        .on_complete(move |result| {
            complete
                .lock()
                .unwrap()
                .push(format!("complete:{}", result.text_output()))
        })
}

#[tokio::test]
async fn test_streamed_single_turn() {
    let model = ScriptedModel::new([text("hello")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);
    let log = Arc::new(Mutex::new(Vec::new()));

    let agent = Agent::new("Assistant");
    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());
    assert!(!streamed.is_complete());
    assert_eq!(streamed.current_turn(), 0);
    assert_eq!(streamed.max_turns(), 10);

    streamed.subscribe(recording_callbacks(&log));
    let result = streamed.wait().await.unwrap();

    assert_eq!(result.text_output(), "hello");
    assert!(streamed.is_complete());
    assert_eq!(streamed.current_turn(), 1);
    assert_eq!(streamed.current_agent().name, "Assistant");
    assert_eq!(streamed.final_output(), Some(&json!("hello")));
    assert_eq!(streamed.usage().requests, 1);
    assert_eq!(*log.lock().unwrap(), vec!["token:hello", "complete:hello"]);
}

#[tokio::test]
async fn test_streamed_callback_order() {
    let model = ScriptedModel::new([
        tool_call("get_weather", "call_1", json!({"city": "Tokyo"})),
        handoff("Spanish agent"),
        text("Hace sol"),
    ]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);
    let log = Arc::new(Mutex::new(Vec::new()));

    let get_weather = FunctionTool::builder("get_weather")
        .handler(|_ctx, _args| Ok(json!("sunny")))
        .build()
        .unwrap();
    let triage = Agent::builder("Triage agent")
        .tool(get_weather)
        .handoff(Agent::new("Spanish agent"))
        .build();

    let mut streamed = runner.run_streamed(&triage, "¿Tiempo?", RunContext::new(), None, RunConfig::default());
    streamed.subscribe(recording_callbacks(&log));
    let result = streamed.wait().await.unwrap();

    assert_eq!(result.last_agent().name, "Spanish agent");
    assert_eq!(streamed.current_turn(), 3);
    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "tool_call:get_weather",
            "tool_result:get_weather:\"sunny\"",
            "agent:Spanish agent",
            "token:Hace sol",
            "complete:Hace sol",
        ]
    );
}

#[tokio::test]
async fn test_wait_returns_cached_result() {
    let model = ScriptedModel::new([text("once")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::new("Assistant");
    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());

    let first = streamed.wait().await.unwrap();
    let second = streamed.wait().await.unwrap();
    assert_eq!(first.text_output(), second.text_output());
    assert_eq!(model.calls(), 1);
    assert_eq!(recorder.events().last().map(String::as_str), Some("trace_end:1"));
}

#[tokio::test]
async fn test_streamed_failure_is_final() {
    let model = ScriptedModel::new([]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::new("Assistant");
    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), Some(3), RunConfig::default());

    assert!(matches!(streamed.wait().await, Err(AgentError::ModelError(_))));
    assert!(!streamed.is_complete());
    assert!(streamed.result().is_none());
    match streamed.wait().await {
        Err(AgentError::RunFailed(message)) => {
            assert_eq!(message, "Model error: script exhausted");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(model.calls(), 1);

    drop(streamed);
    let ends = recorder.events().iter().filter(|e| e.starts_with("trace_end")).count();
    assert_eq!(ends, 1);
}

#[tokio::test]
async fn test_streamed_input_guardrail() {
    let model = ScriptedModel::new([text("never")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::builder("Guarded")
        .input_guardrail(InputGuardrailFn::new("block_all", |_, _, _| {
            Ok(GuardrailOutput::failed("blocked"))
        }))
        .build();

    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());
    assert!(matches!(
        streamed.wait().await,
        Err(AgentError::InputGuardrailTripwireTriggered(_))
    ));
    assert_eq!(model.calls(), 0);
}

#[tokio::test]
async fn test_streamed_output_guardrail() {
    let model = ScriptedModel::new([text("my password is hunter2")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);
    let log = Arc::new(Mutex::new(Vec::new()));

    let agent = Agent::builder("Leaky")
        .output_guardrail(OutputGuardrailFn::new("no_secrets", |output, _, _| {
            if output.as_str().is_some_and(|s| s.contains("password")) {
                Ok(GuardrailOutput::failed("secret in output"))
            } else {
                Ok(GuardrailOutput::passed())
            }
        }))
        .build();

    let mut streamed = runner.run_streamed(&agent, "tell me", RunContext::new(), None, RunConfig::default());
    streamed.subscribe(recording_callbacks(&log));
    assert!(matches!(
        streamed.wait().await,
        Err(AgentError::OutputGuardrailTripwireTriggered(_))
    ));

    assert!(!streamed.is_complete());
    assert_eq!(*log.lock().unwrap(), vec!["token:my password is hunter2"]);
    assert_eq!(
        recorder.events(),
        vec![
            "trace_start:Agent workflow",
            "span_start:Leaky",
            "span_error:Leaky",
            "span_end:Leaky",
            "trace_end:1",
        ]
    );
}

#[tokio::test]
async fn test_dropped_before_wait_finishes_trace() {
    let model = ScriptedModel::new([text("never")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::new("Assistant");
    let streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());
    drop(streamed);

    assert_eq!(model.calls(), 0);
    assert_eq!(recorder.events(), vec!["trace_start:Agent workflow", "trace_end:0"]);
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_wait_closes_span() {
    let model = ScriptedModel::new([]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::builder("Slow").model_instance(HangingModel).build();
    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());
    let outcome = tokio::time::timeout(Duration::from_secs(1), streamed.wait()).await;
    assert!(outcome.is_err());
    assert_eq!(streamed.current_turn(), 1);

    drop(streamed);
    assert_eq!(
        recorder.events(),
        vec![
            "trace_start:Agent workflow",
            "span_start:Slow",
            "span_end:Slow",
            "trace_end:1",
        ]
    );
}

#[tokio::test]
async fn test_completed_run_reports_trace_once() {
    let model = ScriptedModel::new([text("done")]);
    let recorder = Arc::new(RecordingProcessor::default());
    let runner = runner_with(&model, &recorder);

    let agent = Agent::new("Assistant");
    let mut streamed = runner.run_streamed(&agent, "hi", RunContext::new(), None, RunConfig::default());
    streamed.wait().await.unwrap();
    drop(streamed);

    let ends = recorder.events().iter().filter(|e| e.starts_with("trace_end")).count();
    assert_eq!(ends, 1);
}
