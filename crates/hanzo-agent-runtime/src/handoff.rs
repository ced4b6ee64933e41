//! Handoffs: delegation from one agent to another mid-run

use crate::agent::Agent;
use crate::context::RunContext;
use crate::items::RunItem;
use std::sync::Arc;

/// Rewrites the conversation items handed to the next agent
pub trait HandoffInputFilter: Send + Sync {
    fn filter(&self, items: Vec<RunItem>, ctx: &RunContext, handoff: &Handoff) -> Vec<RunItem>;
}

impl<F> HandoffInputFilter for F
where
    F: Fn(Vec<RunItem>, &RunContext, &Handoff) -> Vec<RunItem> + Send + Sync,
{
    fn filter(&self, items: Vec<RunItem>, ctx: &RunContext, handoff: &Handoff) -> Vec<RunItem> {
        self(items, ctx, handoff)
    }
}

/// Drops tool traffic so the next agent only sees the conversation text
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveToolResults;

impl HandoffInputFilter for RemoveToolResults {
    fn filter(&self, items: Vec<RunItem>, _ctx: &RunContext, _handoff: &Handoff) -> Vec<RunItem> {
        items
            .into_iter()
            .filter_map(|item| match item {
                RunItem::ToolResult { .. } => None,
                RunItem::AiMessage(mut output) => {
                    output.tool_calls.clear();
                    if output.content.is_none() && output.handoff.is_none() {
                        None
                    } else {
                        Some(RunItem::AiMessage(output))
                    }
                }
                other => Some(other),
            })
            .collect()
    }
}

/// A declared transfer of control to another agent
///
/// The target's name is captured when the handoff is built and does not
/// follow later clones of the target.
#[derive(Clone)]
pub struct Handoff {
    agent: Arc<Agent>,
    agent_name: String,
    description: String,
    input_filter: Option<Arc<dyn HandoffInputFilter>>,
}

impl Handoff {
    pub fn new(agent: Agent) -> Self {
        Self::from_shared(Arc::new(agent))
    }

    pub fn from_shared(agent: Arc<Agent>) -> Self {
        let description = agent
            .handoff_description
            .clone()
            .unwrap_or_else(|| format!("Handoff to {} agent", agent.name));
        Self {
            agent_name: agent.name.clone(),
            description,
            agent,
            input_filter: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Rewrite the items handed to the target with a closure
    pub fn with_input_filter<F>(self, filter: F) -> Self
    where
        F: Fn(Vec<RunItem>, &RunContext, &Handoff) -> Vec<RunItem> + Send + Sync + 'static,
    {
        self.with_filter(Arc::new(filter))
    }

    pub fn with_filter(mut self, filter: Arc<dyn HandoffInputFilter>) -> Self {
        self.input_filter = Some(filter);
        self
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_filter(&self) -> Option<&Arc<dyn HandoffInputFilter>> {
        self.input_filter.as_ref()
    }

    /// Apply this handoff's filter, or `fallback` when it has none
    pub fn apply_input_filter(
        &self,
        items: Vec<RunItem>,
        ctx: &RunContext,
        fallback: Option<&Arc<dyn HandoffInputFilter>>,
    ) -> Vec<RunItem> {
        match self.input_filter.as_ref().or(fallback) {
            Some(filter) => filter.filter(items, ctx, self),
            None => items,
        }
    }
}

impl From<Agent> for Handoff {
    fn from(agent: Agent) -> Self {
        Handoff::new(agent)
    }
}

impl From<Arc<Agent>> for Handoff {
    fn from(agent: Arc<Agent>) -> Self {
        Handoff::from_shared(agent)
    }
}

impl std::fmt::Debug for Handoff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handoff")
            .field("agent_name", &self.agent_name)
            .field("description", &self.description)
            .field("has_input_filter", &self.input_filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelOutput, ToolCall};
    use serde_json::json;

    fn sample_items() -> Vec<RunItem> {
        vec![
            RunItem::UserMessage("hola".into()),
            RunItem::AiMessage(ModelOutput::tool_calls(vec![ToolCall::new("lookup", json!({}))])),
            RunItem::ToolResult {
                tool_call_id: None,
                tool_name: "lookup".into(),
                result: json!("found"),
            },
            RunItem::AiMessage(ModelOutput::handoff("Spanish agent")),
        ]
    }

    #[test]
    fn test_description_defaults() {
        let plain = Handoff::new(Agent::new("Spanish agent"));
        assert_eq!(plain.agent_name(), "Spanish agent");
        assert_eq!(plain.description(), "Handoff to Spanish agent agent");

        let described = Handoff::new(
            Agent::builder("English agent")
                .handoff_description("Speaks English")
                .build(),
        );
        assert_eq!(described.description(), "Speaks English");
        assert_eq!(described.with_description("custom").description(), "custom");
    }

    #[test]
    fn test_name_is_fixed_at_construction() {
        let target = Agent::new("Spanish agent");
        let handoff = Handoff::new(target.clone());
        let renamed = target.clone_with().name("Renamed").build();
        assert_eq!(renamed.name, "Renamed");
        assert_eq!(handoff.agent_name(), "Spanish agent");
    }

    #[test]
    fn test_remove_tool_results() {
        let handoff = Handoff::new(Agent::new("Spanish agent"));
        let filtered = RemoveToolResults.filter(sample_items(), &RunContext::new(), &handoff);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|i| i.item_type() != "tool_result"));
    }

    #[test]
    fn test_handoff_filter_wins_over_fallback() {
        let fallback: Arc<dyn HandoffInputFilter> = Arc::new(RemoveToolResults);
        let ctx = RunContext::new();

        let unfiltered = Handoff::new(Agent::new("Spanish agent"));
        assert_eq!(
            unfiltered.apply_input_filter(sample_items(), &ctx, Some(&fallback)).len(),
            2
        );

        let own = unfiltered.with_input_filter(|items, _ctx, _h| items.into_iter().take(1).collect());
        assert_eq!(own.apply_input_filter(sample_items(), &ctx, Some(&fallback)).len(), 1);
        assert_eq!(own.apply_input_filter(sample_items(), &ctx, None).len(), 1);
    }
}
