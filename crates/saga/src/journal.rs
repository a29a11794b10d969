//! The saga journal: validate, append, project.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::SagaId;
use event_log::{EventLog, EventLogStore, FINISH_STEP, INIT_STEP, StepState};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::error::SagaError;
use crate::state::{Saga, SagaStatus};

/// Pluggable saga-id generation strategy.
///
/// Generated ids must be unique; a collision is programmer error, not a
/// condition the journal defends against.
pub type IdGenerator = Arc<dyn Fn() -> SagaId + Send + Sync>;

/// Capability set the coordinator drives a saga through.
///
/// The journal is the only writer to storage and the single source of
/// truth for saga progress: the coordinator never touches the storage
/// driver directly. The production implementation is [`SagaJournal`];
/// tests may substitute their own double.
#[async_trait]
pub trait Journal: Send + Sync {
    /// Creates a saga: writes its `_init/done` record carrying the initial
    /// context and registers a running projection. Returns the new id.
    async fn create_new_saga(
        &self,
        cancel: &CancellationToken,
        context: Value,
    ) -> Result<SagaId, SagaError>;

    /// Records that a sub-request's callable has been started.
    async fn mark_sub_request_as_running(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError>;

    /// Records that a sub-request's callable succeeded.
    ///
    /// Legal only while the step's most recent record is `running`.
    async fn mark_sub_request_as_done(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError>;

    /// Records that a sub-request's callable failed, which also moves the
    /// saga onto the compensating path.
    ///
    /// Legal only while the step's most recent record is `running`.
    async fn mark_sub_request_as_aborted(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError>;

    /// Writes the terminal `_finish/done` record.
    ///
    /// Legal only when the log's last record is settled as `done` (no step
    /// in flight, no dangling abort).
    async fn mark_saga_as_done(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<(), SagaError>;

    /// Drops the in-memory projection. Storage records are retained.
    async fn delete_saga(&self, saga_id: SagaId);

    /// Returns the saga's status, or `None` for sagas this journal does
    /// not track.
    async fn saga_status(&self, saga_id: SagaId) -> Option<SagaStatus>;

    /// Returns a copy of the saga's last record, or `None` when the saga is
    /// untracked.
    async fn last_event_log(&self, saga_id: SagaId) -> Option<EventLog>;

    /// Rebuilds the projection for `saga_id` by replaying its storage
    /// records, and returns the reconstructed status.
    async fn restore_saga(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<SagaStatus, SagaError>;
}

/// Journal over an [`EventLogStore`].
///
/// Owns the per-saga projections. Every mutation validates the transition,
/// appends the record to storage, and only then updates the projection; a
/// failed append leaves the in-memory state untouched and surfaces the
/// storage error, so the projection never gets ahead of what is durable.
pub struct SagaJournal<S> {
    storage: S,
    sagas: RwLock<HashMap<SagaId, Saga>>,
    generate_id: IdGenerator,
}

impl<S: EventLogStore> SagaJournal<S> {
    /// Creates a journal generating random v4 saga ids.
    pub fn new(storage: S) -> Self {
        Self::with_id_generator(storage, Arc::new(SagaId::new))
    }

    /// Creates a journal with a caller-supplied id generation strategy.
    pub fn with_id_generator(storage: S, generate_id: IdGenerator) -> Self {
        Self {
            storage,
            sagas: RwLock::new(HashMap::new()),
            generate_id,
        }
    }

    /// Shared body of the done/aborted marks: both require the step's most
    /// recent record to be `running`.
    async fn mark_sub_request_outcome(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        state: StepState,
        context: Value,
    ) -> Result<(), SagaError> {
        let mut sagas = self.sagas.write().await;
        let saga = sagas
            .get_mut(&saga_id)
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        match saga.step_state(step) {
            Some(StepState::Running) => {}
            Some(have) => {
                return Err(SagaError::IllegalTransition {
                    step: step.to_string(),
                    expected: StepState::Running,
                    have,
                });
            }
            None => {
                return Err(SagaError::NoPreviousState {
                    step: step.to_string(),
                });
            }
        }

        let record = EventLog::new(saga_id, step, state, context);
        self.storage.save_event_log(cancel, &record).await?;
        saga.apply(record);

        tracing::debug!(%saga_id, step, %state, "sub-request outcome recorded");
        Ok(())
    }
}

#[async_trait]
impl<S: EventLogStore> Journal for SagaJournal<S> {
    async fn create_new_saga(
        &self,
        cancel: &CancellationToken,
        context: Value,
    ) -> Result<SagaId, SagaError> {
        let saga_id = (self.generate_id)();

        let record = EventLog::new(saga_id, INIT_STEP, StepState::Done, context);
        self.storage.save_event_log(cancel, &record).await?;

        let mut sagas = self.sagas.write().await;
        sagas.insert(saga_id, Saga::new(saga_id, record));

        tracing::debug!(%saga_id, "saga created");
        Ok(saga_id)
    }

    async fn mark_sub_request_as_running(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError> {
        let mut sagas = self.sagas.write().await;
        let saga = sagas
            .get_mut(&saga_id)
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        let record = EventLog::new(saga_id, step, StepState::Running, context);
        self.storage.save_event_log(cancel, &record).await?;
        saga.apply(record);

        tracing::debug!(%saga_id, step, "sub-request marked running");
        Ok(())
    }

    async fn mark_sub_request_as_done(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError> {
        self.mark_sub_request_outcome(cancel, saga_id, step, StepState::Done, context)
            .await
    }

    async fn mark_sub_request_as_aborted(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
        step: &str,
        context: Value,
    ) -> Result<(), SagaError> {
        self.mark_sub_request_outcome(cancel, saga_id, step, StepState::Aborted, context)
            .await
    }

    async fn mark_saga_as_done(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<(), SagaError> {
        let mut sagas = self.sagas.write().await;
        let saga = sagas
            .get_mut(&saga_id)
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        // A saga can only finish from a settled log.
        match saga.last_event_log().map(|r| r.state) {
            Some(StepState::Done) => {}
            Some(have) => {
                return Err(SagaError::IllegalTransition {
                    step: FINISH_STEP.to_string(),
                    expected: StepState::Done,
                    have,
                });
            }
            None => {
                return Err(SagaError::NoPreviousState {
                    step: FINISH_STEP.to_string(),
                });
            }
        }

        let record = EventLog::finish(saga_id);
        self.storage.save_event_log(cancel, &record).await?;
        saga.apply(record);

        tracing::debug!(%saga_id, "saga marked done");
        Ok(())
    }

    async fn delete_saga(&self, saga_id: SagaId) {
        self.sagas.write().await.remove(&saga_id);
        tracing::debug!(%saga_id, "saga dropped from the journal");
    }

    async fn saga_status(&self, saga_id: SagaId) -> Option<SagaStatus> {
        self.sagas.read().await.get(&saga_id).map(Saga::status)
    }

    async fn last_event_log(&self, saga_id: SagaId) -> Option<EventLog> {
        self.sagas
            .read()
            .await
            .get(&saga_id)
            .and_then(|saga| saga.last_event_log().cloned())
    }

    async fn restore_saga(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<SagaStatus, SagaError> {
        let records = self.storage.load_event_logs(cancel, saga_id).await?;
        if records.is_empty() {
            return Err(SagaError::SagaNotFound(saga_id));
        }

        let saga = Saga::replay(saga_id, records)?;
        let status = saga.status();
        self.sagas.write().await.insert(saga_id, saga);

        tracing::debug!(%saga_id, %status, "saga restored from storage");
        Ok(status)
    }
}
