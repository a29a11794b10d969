//! Result type returned by sub-request actions and compensations.

use serde_json::Value;

/// Outcome of a sub-request action or compensation.
///
/// The carried context is opaque to the coordinator: it is journaled
/// verbatim and handed to the next callable in the pipeline, never parsed,
/// merged, or transformed. On success the context becomes the next step's
/// input; on failure it is preserved so the compensating path can inspect
/// what the failing step saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionResult {
    /// The callable succeeded; `context` feeds the next step.
    Success {
        /// Payload for the next step (or the next compensation).
        context: Value,
    },

    /// The callable failed; the saga moves to the compensating path.
    Failure {
        /// User-visible description of what went wrong.
        error: String,
        /// Payload preserved for the compensation pipeline.
        context: Value,
    },
}

impl ActionResult {
    /// Creates a success result carrying the given context.
    pub fn success(context: Value) -> Self {
        ActionResult::Success { context }
    }

    /// Creates a failure result with a user-visible error and the context
    /// to preserve for compensation.
    pub fn failure(error: impl Into<String>, context: Value) -> Self {
        ActionResult::Failure {
            error: error.into(),
            context,
        }
    }

    /// Returns true when the callable succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success { .. })
    }

    /// Returns the carried context.
    pub fn context(&self) -> &Value {
        match self {
            ActionResult::Success { context } | ActionResult::Failure { context, .. } => context,
        }
    }

    /// Consumes the result, returning the carried context.
    pub fn into_context(self) -> Value {
        match self {
            ActionResult::Success { context } | ActionResult::Failure { context, .. } => context,
        }
    }

    /// Returns the error message when the callable failed.
    pub fn error(&self) -> Option<&str> {
        match self {
            ActionResult::Success { .. } => None,
            ActionResult::Failure { error, .. } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_carries_context() {
        let result = ActionResult::success(json!({"amount": 10}));
        assert!(result.is_success());
        assert!(result.error().is_none());
        assert_eq!(result.context(), &json!({"amount": 10}));
        assert_eq!(result.into_context(), json!({"amount": 10}));
    }

    #[test]
    fn failure_preserves_error_and_context() {
        let result = ActionResult::failure("insufficient funds", json!({"amount": 10}));
        assert!(!result.is_success());
        assert_eq!(result.error(), Some("insufficient funds"));
        assert_eq!(result.context(), &json!({"amount": 10}));
    }

    #[test]
    fn callers_can_pattern_match() {
        match ActionResult::failure("boom", Value::Null) {
            ActionResult::Failure { error, context } => {
                assert_eq!(error, "boom");
                assert!(context.is_null());
            }
            ActionResult::Success { .. } => panic!("expected a failure"),
        }
    }
}
