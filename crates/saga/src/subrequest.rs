//! Sub-request definitions and the ordered registry.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use event_log::{INIT_STEP, is_reserved_step};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::SagaError;
use crate::result::ActionResult;

/// Future returned by an action or compensation callable.
pub type ActionFuture = Pin<Box<dyn Future<Output = ActionResult> + Send>>;

/// A sub-request action or compensation.
///
/// Callables receive the ambient cancellation token and the context payload
/// recorded by the previous step. Compensations must be idempotent: a crash
/// between a compensation's side effect and its journal append re-invokes
/// it on recovery, and a failed compensation is retried on the next loop
/// turn.
pub type Action = Arc<dyn Fn(CancellationToken, Value) -> ActionFuture + Send + Sync>;

/// Wraps an async closure into a boxed [`Action`].
pub fn action_fn<F, Fut>(f: F) -> Action
where
    F: Fn(CancellationToken, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ActionResult> + Send + 'static,
{
    Arc::new(move |cancel, context| Box::pin(f(cancel, context)))
}

/// A registered saga step: a forward action and its compensating inverse.
#[derive(Clone)]
pub struct SubRequest {
    id: String,
    action: Action,
    compensation: Action,
}

impl SubRequest {
    /// Creates a definition. Id constraints are checked when the definition
    /// is appended to a [`SubRequestList`].
    pub fn new(id: impl Into<String>, action: Action, compensation: Action) -> Self {
        Self {
            id: id.into(),
            action,
            compensation,
        }
    }

    /// Returns the step id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Invokes the forward action.
    pub fn run_action(&self, cancel: CancellationToken, context: Value) -> ActionFuture {
        (self.action)(cancel, context)
    }

    /// Invokes the compensating action.
    pub fn run_compensation(&self, cancel: CancellationToken, context: Value) -> ActionFuture {
        (self.compensation)(cancel, context)
    }
}

impl std::fmt::Debug for SubRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubRequest")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// The ordered, append-only collection of sub-request definitions.
///
/// Registration order defines forward execution order; the compensating
/// path walks the same list in reverse. The list is built once during
/// registration and treated as immutable while sagas execute.
#[derive(Debug, Clone, Default)]
pub struct SubRequestList {
    defs: Vec<SubRequest>,
}

impl SubRequestList {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a definition.
    ///
    /// Ids must be non-empty, unique within the registry, and must not be
    /// one of the reserved `_init` / `_finish` markers.
    pub fn append(&mut self, def: SubRequest) -> Result<(), SagaError> {
        if def.id().is_empty() {
            return Err(SagaError::EmptySubRequestId);
        }
        if is_reserved_step(def.id()) {
            return Err(SagaError::ReservedSubRequest(def.id().to_string()));
        }
        if self.defs.iter().any(|d| d.id == def.id) {
            return Err(SagaError::DuplicateSubRequest(def.id().to_string()));
        }
        self.defs.push(def);
        Ok(())
    }

    /// Returns true when no sub-request has been registered.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    /// Returns the number of registered sub-requests.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Returns the first definition.
    pub fn first(&self) -> Result<&SubRequest, SagaError> {
        self.defs.first().ok_or(SagaError::EmptyRegistry)
    }

    /// Returns the definition with the given id, exact match.
    pub fn by_id(&self, id: &str) -> Result<&SubRequest, SagaError> {
        self.defs
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| SagaError::UnknownSubRequest(id.to_string()))
    }

    /// Returns the definition immediately following `id`, or `None` at the
    /// end of the pipeline. The `_init` marker resolves to the first
    /// definition.
    pub fn after(&self, id: &str) -> Result<Option<&SubRequest>, SagaError> {
        if id == INIT_STEP {
            return self.first().map(Some);
        }
        let idx = self.position(id)?;
        Ok(self.defs.get(idx + 1))
    }

    /// Returns the definition immediately preceding `id`, or `None` when
    /// `id` is the first step.
    pub fn before(&self, id: &str) -> Result<Option<&SubRequest>, SagaError> {
        let idx = self.position(id)?;
        Ok(idx.checked_sub(1).and_then(|i| self.defs.get(i)))
    }

    fn position(&self, id: &str) -> Result<usize, SagaError> {
        self.defs
            .iter()
            .position(|d| d.id == id)
            .ok_or_else(|| SagaError::UnknownSubRequest(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Action {
        action_fn(|_cancel, context| async move { ActionResult::success(context) })
    }

    fn list_of(ids: &[&str]) -> SubRequestList {
        let mut list = SubRequestList::new();
        for id in ids {
            list.append(SubRequest::new(*id, noop(), noop())).unwrap();
        }
        list
    }

    #[test]
    fn first_of_empty_registry_fails() {
        let list = SubRequestList::new();
        assert!(matches!(list.first(), Err(SagaError::EmptyRegistry)));
        assert!(list.is_empty());
    }

    #[test]
    fn append_preserves_registration_order() {
        let list = list_of(&["debit", "credit"]);
        assert_eq!(list.len(), 2);
        assert_eq!(list.first().unwrap().id(), "debit");
    }

    #[test]
    fn append_rejects_duplicates() {
        let mut list = list_of(&["debit"]);
        let err = list.append(SubRequest::new("debit", noop(), noop()));
        assert!(matches!(err, Err(SagaError::DuplicateSubRequest(id)) if id == "debit"));
    }

    #[test]
    fn append_rejects_reserved_markers() {
        let mut list = SubRequestList::new();
        for reserved in ["_init", "_finish"] {
            let err = list.append(SubRequest::new(reserved, noop(), noop()));
            assert!(matches!(err, Err(SagaError::ReservedSubRequest(_))));
        }
        // Other underscore-prefixed ids are merely discouraged.
        list.append(SubRequest::new("_internal", noop(), noop()))
            .unwrap();
    }

    #[test]
    fn append_rejects_empty_id() {
        let mut list = SubRequestList::new();
        let err = list.append(SubRequest::new("", noop(), noop()));
        assert!(matches!(err, Err(SagaError::EmptySubRequestId)));
    }

    #[test]
    fn by_id_is_exact_match() {
        let list = list_of(&["debit", "credit"]);
        assert_eq!(list.by_id("credit").unwrap().id(), "credit");
        assert!(matches!(
            list.by_id("deb"),
            Err(SagaError::UnknownSubRequest(_))
        ));
    }

    #[test]
    fn after_init_is_the_first_step() {
        let list = list_of(&["debit", "credit"]);
        assert_eq!(list.after("_init").unwrap().unwrap().id(), "debit");
    }

    #[test]
    fn after_walks_forward() {
        let list = list_of(&["debit", "credit"]);
        assert_eq!(list.after("debit").unwrap().unwrap().id(), "credit");
    }

    #[test]
    fn after_last_step_is_end_of_pipeline() {
        let list = list_of(&["debit", "credit"]);
        assert!(list.after("credit").unwrap().is_none());
    }

    #[test]
    fn after_unknown_id_fails() {
        let list = list_of(&["debit", "credit"]);
        let err = list.after("foo").unwrap_err();
        assert_eq!(err.to_string(), "unknown sub-request id \"foo\"");
    }

    #[test]
    fn before_walks_backward() {
        let list = list_of(&["debit", "credit"]);
        assert_eq!(list.before("credit").unwrap().unwrap().id(), "debit");
    }

    #[test]
    fn before_first_step_is_start_of_pipeline() {
        let list = list_of(&["debit", "credit"]);
        assert!(list.before("debit").unwrap().is_none());
    }

    #[test]
    fn before_unknown_id_fails() {
        let list = list_of(&["debit", "credit"]);
        assert!(matches!(
            list.before("foo"),
            Err(SagaError::UnknownSubRequest(_))
        ));
    }
}
