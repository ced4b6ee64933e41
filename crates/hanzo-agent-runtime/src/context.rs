//! Runtime context for agent execution

use crate::types::Usage;
use std::any::Any;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runtime context wrapper for agent execution
///
/// The context holds user-provided state, usage statistics and the run's
/// cancellation token. It is owned by exactly one run and passed to tools,
/// guardrails and instruction callbacks. User state that callbacks need to
/// write should use interior mutability (e.g. a `Mutex`).
#[derive(Debug, Clone)]
pub struct RunContext {
    /// User-provided context data
    context: Option<Arc<dyn Any + Send + Sync>>,

    /// Usage statistics
    usage: Usage,

    cancellation: CancellationToken,
}

impl RunContext {
    /// Create a new run context
    pub fn new() -> Self {
        Self {
            context: None,
            usage: Usage::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Create a run context with user data
    pub fn with_context<T: Any + Send + Sync + 'static>(data: T) -> Self {
        Self {
            context: Some(Arc::new(data)),
            ..Self::new()
        }
    }

    /// Create a run context sharing already-wrapped user data
    pub fn with_shared_context(data: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            context: Some(data),
            ..Self::new()
        }
    }

    /// Use the given token to cancel this run
    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Get the user context data
    pub fn context<T: Any + Send + Sync + 'static>(&self) -> Option<&T> {
        self.context
            .as_ref()
            .and_then(|c| c.downcast_ref::<T>())
    }

    /// Replace the user context data
    pub fn set_context<T: Any + Send + Sync + 'static>(&mut self, data: T) {
        self.context = Some(Arc::new(data));
    }

    /// Get mutable access to usage statistics
    pub fn usage_mut(&mut self) -> &mut Usage {
        &mut self.usage
    }

    /// Get usage statistics
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    /// Add usage from a model response
    pub fn add_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Context for a nested run: same user data, a child cancellation token
    /// and fresh usage counters
    pub fn fork(&self) -> Self {
        Self {
            context: self.context.clone(),
            usage: Usage::default(),
            cancellation: self.cancellation.child_token(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_user_context_downcast() {
        let ctx = RunContext::with_context(Mutex::new(vec!["a".to_string()]));
        ctx.context::<Mutex<Vec<String>>>()
            .unwrap()
            .lock()
            .unwrap()
            .push("b".into());

        let seen = ctx.context::<Mutex<Vec<String>>>().unwrap().lock().unwrap().clone();
        assert_eq!(seen, vec!["a", "b"]);
        assert!(ctx.context::<String>().is_none());
    }

    #[test]
    fn test_fork_shares_data_and_cancellation() {
        let mut parent = RunContext::with_context(42u32);
        parent.add_usage(&Usage::new(1, 5, 5));

        let child = parent.fork();
        assert_eq!(child.context::<u32>(), Some(&42));
        assert_eq!(child.usage(), &Usage::default());

        parent.cancellation_token().cancel();
        assert!(child.is_cancelled());
    }
}
