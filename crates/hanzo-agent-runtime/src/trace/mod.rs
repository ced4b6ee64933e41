//! Per-run tracing
//!
//! A [`Trace`] brackets one run. Each agent activation opens an agent span;
//! errors attach to spans and every lifecycle event is forwarded to the
//! configured [`TraceProcessor`]s. A disabled trace turns every operation
//! into a no-op and hands out empty span ids.
//!
//! Spans are stored in a flat map keyed by id. Nesting is implied by the
//! order in which spans open and close.

mod processor;
mod span;

pub use processor::{LogProcessor, TraceProcessor};
pub use span::{SpanError, TraceSpan};

use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Factory of per-run traces sharing one set of processors
#[derive(Clone)]
pub struct Tracer {
    processors: Vec<Arc<dyn TraceProcessor>>,
    enabled: bool,
}

impl Tracer {
    /// A tracer without processors
    pub fn new() -> Self {
        Self {
            processors: Vec::new(),
            enabled: true,
        }
    }

    /// A tracer whose traces are always disabled
    pub fn disabled() -> Self {
        Self {
            processors: Vec::new(),
            enabled: false,
        }
    }

    pub fn with_processor(mut self, processor: impl TraceProcessor + 'static) -> Self {
        self.processors.push(Arc::new(processor));
        self
    }

    pub fn with_shared_processor(mut self, processor: Arc<dyn TraceProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// A fresh, not yet started trace
    pub fn trace(&self, disabled: bool) -> Trace {
        if disabled || !self.enabled {
            Trace::disabled()
        } else {
            Trace::new(self.processors.clone())
        }
    }
}

impl Default for Tracer {
    /// A tracer with the [`LogProcessor`]
    fn default() -> Self {
        Self::new().with_processor(LogProcessor)
    }
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("processors", &self.processors.len())
            .field("enabled", &self.enabled)
            .finish()
    }
}

/// Trace of a single run
pub struct Trace {
    disabled: bool,
    include_sensitive_data: bool,
    trace_id: String,
    group_id: Option<String>,
    workflow_name: String,
    metadata: Map<String, Value>,
    started_at: Option<Instant>,
    finished: bool,
    spans: HashMap<String, TraceSpan>,
    processors: Vec<Arc<dyn TraceProcessor>>,
}

impl Trace {
    pub fn new(processors: Vec<Arc<dyn TraceProcessor>>) -> Self {
        Self {
            disabled: false,
            include_sensitive_data: true,
            trace_id: String::new(),
            group_id: None,
            workflow_name: String::new(),
            metadata: Map::new(),
            started_at: None,
            finished: false,
            spans: HashMap::new(),
            processors,
        }
    }

    pub fn disabled() -> Self {
        Self {
            disabled: true,
            ..Self::new(Vec::new())
        }
    }

    /// When `false`, span error data is dropped before it is stored
    pub fn with_sensitive_data(mut self, include: bool) -> Self {
        self.include_sensitive_data = include;
        self
    }

    /// Start the trace, generating a trace id unless one is given
    pub fn start(
        &mut self,
        workflow_name: &str,
        trace_id: Option<String>,
        group_id: Option<String>,
        metadata: Map<String, Value>,
    ) -> &mut Self {
        if self.disabled {
            return self;
        }

        self.workflow_name = workflow_name.to_string();
        self.trace_id = trace_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.group_id = group_id;
        self.metadata = metadata;
        self.started_at = Some(Instant::now());

        for processor in &self.processors {
            processor.on_trace_start(
                &self.trace_id,
                &self.workflow_name,
                self.group_id.as_deref(),
                &self.metadata,
            );
        }
        self
    }

    /// Open a span for an agent activation and return its id
    pub fn start_agent_span(
        &mut self,
        agent_name: &str,
        handoffs: Vec<String>,
        tools: Vec<String>,
        output_type: &str,
    ) -> String {
        let mut attributes = Map::new();
        attributes.insert("handoffs".into(), json!(handoffs));
        attributes.insert("tools".into(), json!(tools));
        attributes.insert("output_type".into(), json!(output_type));
        self.start_span(agent_name, "agent", attributes)
    }

    /// Open a span of any type and return its id
    pub fn start_span(&mut self, name: &str, span_type: &str, attributes: Map<String, Value>) -> String {
        if self.disabled {
            return String::new();
        }

        let span_id = Uuid::new_v4().to_string();
        let span = TraceSpan::new(span_id.clone(), name, span_type, attributes);
        for processor in &self.processors {
            processor.on_span_start(&self.trace_id, &span);
        }
        self.spans.insert(span_id.clone(), span);
        span_id
    }

    /// Attach an error to an open or closed span; unknown ids are ignored
    pub fn add_error_to_span(&mut self, span_id: &str, message: &str, data: Value) -> &mut Self {
        if self.disabled {
            return self;
        }
        let Some(span) = self.spans.get_mut(span_id) else {
            return self;
        };

        let data = if self.include_sensitive_data {
            data
        } else {
            Value::Object(Map::new())
        };
        span.add_error(message, data);

        if let Some(error) = span.errors.last() {
            for processor in &self.processors {
                processor.on_span_error(&self.trace_id, span, error);
            }
        }
        self
    }

    /// Close a span; closing it a second time has no effect
    pub fn finish_span(&mut self, span_id: &str) -> &mut Self {
        if self.disabled {
            return self;
        }
        let Some(span) = self.spans.get_mut(span_id) else {
            return self;
        };

        if span.finish() {
            for processor in &self.processors {
                processor.on_span_end(&self.trace_id, span);
            }
        }
        self
    }

    /// Finish the trace and report the elapsed time to every processor
    ///
    /// Each call notifies again; use [`is_finished`](Self::is_finished) to
    /// report a run only once.
    pub fn finish(&mut self) -> &mut Self {
        if self.disabled {
            return self;
        }
        self.finished = true;

        let duration = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        for processor in &self.processors {
            processor.on_trace_end(&self.trace_id, &self.spans, duration);
        }
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn workflow_name(&self) -> &str {
        &self.workflow_name
    }

    pub fn span(&self, span_id: &str) -> Option<&TraceSpan> {
        self.spans.get(span_id)
    }

    pub fn spans(&self) -> &HashMap<String, TraceSpan> {
        &self.spans
    }
}

impl std::fmt::Debug for Trace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trace")
            .field("trace_id", &self.trace_id)
            .field("workflow_name", &self.workflow_name)
            .field("disabled", &self.disabled)
            .field("spans", &self.spans.len())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl TraceProcessor for Events {
        fn on_trace_start(&self, _: &str, name: &str, _: Option<&str>, _: &Map<String, Value>) {
            self.0.lock().unwrap().push(format!("trace_start:{name}"));
        }
        fn on_span_start(&self, _: &str, span: &TraceSpan) {
            self.0.lock().unwrap().push(format!("span_start:{}", span.name));
        }
        fn on_span_error(&self, _: &str, _: &TraceSpan, error: &SpanError) {
            self.0.lock().unwrap().push(format!("span_error:{}:{}", error.message, error.data));
        }
        fn on_span_end(&self, _: &str, span: &TraceSpan) {
            self.0.lock().unwrap().push(format!("span_end:{}", span.name));
        }
        fn on_trace_end(&self, _: &str, spans: &HashMap<String, TraceSpan>, _: Duration) {
            self.0.lock().unwrap().push(format!("trace_end:{}", spans.len()));
        }
    }

    #[test]
    fn test_lifecycle_notifies_processors() {
        let events = Arc::new(Events::default());
        let mut trace = Trace::new(vec![events.clone() as Arc<dyn TraceProcessor>]);
        trace.start("Agent workflow", Some("trace_1".into()), None, Map::new());
        assert_eq!(trace.trace_id(), "trace_1");

        let span = trace.start_agent_span("Assistant", vec![], vec!["get_weather".into()], "string");
        assert_eq!(trace.span(&span).unwrap().attribute("output_type"), Some(&json!("string")));
        trace.add_error_to_span(&span, "boom", json!({"turn": 1}));
        trace.finish_span(&span);
        trace.finish_span(&span);
        assert!(!trace.is_finished());
        trace.finish();
        assert!(trace.is_finished());

        let seen = events.0.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                "trace_start:Agent workflow",
                "span_start:Assistant",
                "span_error:boom:{\"turn\":1}",
                "span_end:Assistant",
                "trace_end:1",
            ]
        );
    }

    #[test]
    fn test_every_finish_notifies() {
        let events = Arc::new(Events::default());
        let mut trace = Trace::new(vec![events.clone() as Arc<dyn TraceProcessor>]);
        trace.start("Agent workflow", None, None, Map::new());
        trace.finish().finish();

        let seen = events.0.lock().unwrap().clone();
        assert_eq!(seen, vec!["trace_start:Agent workflow", "trace_end:0", "trace_end:0"]);
    }

    #[test]
    fn test_generated_trace_id() {
        let mut trace = Trace::new(vec![]);
        trace.start("w", None, None, Map::new());
        assert!(Uuid::parse_str(trace.trace_id()).is_ok());
    }

    #[test]
    fn test_disabled_trace_is_inert() {
        let mut trace = Trace::disabled();
        trace.start("w", None, None, Map::new());
        let span = trace.start_agent_span("Assistant", vec![], vec![], "string");
        assert!(span.is_empty());
        trace.add_error_to_span(&span, "ignored", Value::Null).finish_span(&span).finish();
        assert!(trace.spans().is_empty());
        assert!(!trace.is_finished());
    }

    #[test]
    fn test_sensitive_data_is_dropped() {
        let events = Arc::new(Events::default());
        let mut trace =
            Trace::new(vec![events.clone() as Arc<dyn TraceProcessor>]).with_sensitive_data(false);
        trace.start("w", None, None, Map::new());
        let span = trace.start_agent_span("Assistant", vec![], vec![], "string");
        trace.add_error_to_span(&span, "failed", json!({"input": "secret"}));

        assert_eq!(trace.span(&span).unwrap().errors[0].data, json!({}));
        assert!(events.0.lock().unwrap().contains(&"span_error:failed:{}".to_string()));
    }
}
