//! Trace spans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An error recorded against a span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanError {
    pub message: String,

    #[serde(default)]
    pub data: Value,
}

/// A timed, named interval of a trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSpan {
    pub id: String,
    pub name: String,

    #[serde(rename = "type")]
    pub span_type: String,

    pub start_time: DateTime<Utc>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub attributes: Map<String, Value>,

    #[serde(default)]
    pub errors: Vec<SpanError>,
}

impl TraceSpan {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        span_type: impl Into<String>,
        attributes: Map<String, Value>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            span_type: span_type.into(),
            start_time: Utc::now(),
            end_time: None,
            attributes,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, message: impl Into<String>, data: Value) {
        self.errors.push(SpanError {
            message: message.into(),
            data,
        });
    }

    /// Close the span; returns `false` if it was already closed
    pub fn finish(&mut self) -> bool {
        if self.end_time.is_some() {
            return false;
        }
        self.end_time = Some(Utc::now());
        true
    }

    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }

    /// Elapsed time in microseconds, once finished
    pub fn duration_micros(&self) -> Option<i64> {
        self.end_time
            .and_then(|end| (end - self.start_time).num_microseconds())
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }
}
