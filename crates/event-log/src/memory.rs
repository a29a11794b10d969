use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{EventLog, EventLogStoreError, Result, store::EventLogStore};

/// In-memory event-log store.
///
/// Keeps every record in RAM behind a single mutex so concurrent sagas can
/// append safely. It provides no durability and should only be used for
/// tests. Cloning yields a handle to the same underlying log, which lets a
/// test keep a handle and inspect what the coordinator wrote.
#[derive(Clone, Default)]
pub struct InMemoryEventLogStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    records: Vec<EventLog>,
    fail_on_save: bool,
}

impl InMemoryEventLogStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of records across all sagas.
    pub async fn record_count(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    /// Returns the records stored for one saga, in append order.
    pub async fn records_for_saga(&self, saga_id: SagaId) -> Vec<EventLog> {
        self.inner
            .lock()
            .await
            .records
            .iter()
            .filter(|r| r.saga_id == saga_id)
            .cloned()
            .collect()
    }

    /// Removes every stored record.
    pub async fn clear(&self) {
        self.inner.lock().await.records.clear();
    }

    /// Makes subsequent `save_event_log` calls fail with a backend error.
    pub async fn set_fail_on_save(&self, fail: bool) {
        self.inner.lock().await.fail_on_save = fail;
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLogStore {
    async fn save_event_log(&self, cancel: &CancellationToken, record: &EventLog) -> Result<()> {
        if cancel.is_cancelled() {
            return Err(EventLogStoreError::Cancelled);
        }

        let mut inner = self.inner.lock().await;
        if inner.fail_on_save {
            return Err(EventLogStoreError::Backend(
                "save failure injected".to_string(),
            ));
        }
        inner.records.push(record.clone());
        Ok(())
    }

    async fn load_event_logs(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<Vec<EventLog>> {
        if cancel.is_cancelled() {
            return Err(EventLogStoreError::Cancelled);
        }
        Ok(self.records_for_saga(saga_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StepState;

    fn make_record(saga_id: SagaId, step: &str, state: StepState) -> EventLog {
        EventLog::new(saga_id, step, state, serde_json::json!({"amount": 10}))
    }

    #[tokio::test]
    async fn save_and_load_preserves_append_order() {
        let store = InMemoryEventLogStore::new();
        let cancel = CancellationToken::new();
        let saga_id = SagaId::new();

        store
            .save_event_log(&cancel, &make_record(saga_id, "_init", StepState::Done))
            .await
            .unwrap();
        store
            .save_event_log(&cancel, &make_record(saga_id, "debit", StepState::Running))
            .await
            .unwrap();
        store
            .save_event_log(&cancel, &make_record(saga_id, "debit", StepState::Done))
            .await
            .unwrap();

        let records = store.load_event_logs(&cancel, saga_id).await.unwrap();
        let steps: Vec<(&str, StepState)> = records
            .iter()
            .map(|r| (r.step.as_str(), r.state))
            .collect();
        assert_eq!(
            steps,
            vec![
                ("_init", StepState::Done),
                ("debit", StepState::Running),
                ("debit", StepState::Done),
            ]
        );
    }

    #[tokio::test]
    async fn load_filters_by_saga() {
        let store = InMemoryEventLogStore::new();
        let cancel = CancellationToken::new();
        let saga_a = SagaId::new();
        let saga_b = SagaId::new();

        store
            .save_event_log(&cancel, &make_record(saga_a, "_init", StepState::Done))
            .await
            .unwrap();
        store
            .save_event_log(&cancel, &make_record(saga_b, "_init", StepState::Done))
            .await
            .unwrap();
        store
            .save_event_log(&cancel, &make_record(saga_a, "debit", StepState::Running))
            .await
            .unwrap();

        assert_eq!(store.record_count().await, 3);
        assert_eq!(store.load_event_logs(&cancel, saga_a).await.unwrap().len(), 2);
        assert_eq!(store.load_event_logs(&cancel, saga_b).await.unwrap().len(), 1);
        assert!(
            store
                .load_event_logs(&cancel, SagaId::new())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn clones_share_the_log() {
        let store = InMemoryEventLogStore::new();
        let handle = store.clone();
        let cancel = CancellationToken::new();

        store
            .save_event_log(&cancel, &make_record(SagaId::new(), "_init", StepState::Done))
            .await
            .unwrap();

        assert_eq!(handle.record_count().await, 1);
    }

    #[tokio::test]
    async fn injected_failure_writes_nothing() {
        let store = InMemoryEventLogStore::new();
        let cancel = CancellationToken::new();

        store.set_fail_on_save(true).await;
        let result = store
            .save_event_log(&cancel, &make_record(SagaId::new(), "_init", StepState::Done))
            .await;

        assert!(matches!(result, Err(EventLogStoreError::Backend(_))));
        assert_eq!(store.record_count().await, 0);

        store.set_fail_on_save(false).await;
        store
            .save_event_log(&cancel, &make_record(SagaId::new(), "_init", StepState::Done))
            .await
            .unwrap();
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn cancelled_token_refuses_the_operation() {
        let store = InMemoryEventLogStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let saga_id = SagaId::new();
        let save = store
            .save_event_log(&cancel, &make_record(saga_id, "_init", StepState::Done))
            .await;
        assert!(matches!(save, Err(EventLogStoreError::Cancelled)));
        assert_eq!(store.record_count().await, 0);

        let load = store.load_event_logs(&cancel, saga_id).await;
        assert!(matches!(load, Err(EventLogStoreError::Cancelled)));
    }

    #[tokio::test]
    async fn clear_empties_the_log() {
        let store = InMemoryEventLogStore::new();
        let cancel = CancellationToken::new();

        store
            .save_event_log(&cancel, &make_record(SagaId::new(), "_init", StepState::Done))
            .await
            .unwrap();
        store.clear().await;

        assert_eq!(store.record_count().await, 0);
    }
}
