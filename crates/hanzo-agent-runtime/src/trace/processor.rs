//! Trace processors receive lifecycle notifications from a [`Trace`](super::Trace)

use super::span::{SpanError, TraceSpan};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};

/// Observer of trace lifecycle events
///
/// Processors are shared between concurrent runs and must be thread safe.
pub trait TraceProcessor: Send + Sync {
    fn on_trace_start(
        &self,
        trace_id: &str,
        workflow_name: &str,
        group_id: Option<&str>,
        metadata: &Map<String, Value>,
    );

    fn on_span_start(&self, trace_id: &str, span: &TraceSpan);

    fn on_span_error(&self, trace_id: &str, span: &TraceSpan, error: &SpanError);

    fn on_span_end(&self, trace_id: &str, span: &TraceSpan);

    fn on_trace_end(&self, trace_id: &str, spans: &HashMap<String, TraceSpan>, duration: Duration);
}

/// Default processor; writes every event to the `tracing` subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProcessor;

impl TraceProcessor for LogProcessor {
    fn on_trace_start(
        &self,
        trace_id: &str,
        workflow_name: &str,
        group_id: Option<&str>,
        metadata: &Map<String, Value>,
    ) {
        debug!(trace_id, group_id, ?metadata, "Trace started: {}", workflow_name);
    }

    fn on_span_start(&self, trace_id: &str, span: &TraceSpan) {
        debug!(
            trace_id,
            span_id = %span.id,
            span_type = %span.span_type,
            attributes = ?span.attributes,
            "Span started: {}",
            span.name
        );
    }

    fn on_span_error(&self, trace_id: &str, span: &TraceSpan, err: &SpanError) {
        error!(
            trace_id,
            span_id = %span.id,
            span_name = %span.name,
            data = %err.data,
            "Span error: {}",
            err.message
        );
    }

    fn on_span_end(&self, trace_id: &str, span: &TraceSpan) {
        debug!(
            trace_id,
            span_id = %span.id,
            duration_us = span.duration_micros(),
            errors = span.errors.len(),
            "Span ended: {}",
            span.name
        );
    }

    fn on_trace_end(&self, trace_id: &str, spans: &HashMap<String, TraceSpan>, duration: Duration) {
        debug!(
            trace_id,
            duration_ms = duration.as_millis() as u64,
            span_count = spans.len(),
            "Trace ended"
        );
    }
}
