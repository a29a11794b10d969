//! The saga execution coordinator.

use std::future::Future;
use std::time::Instant;

use common::SagaId;
use event_log::{EventLogStore, StepState};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::SagaError;
use crate::journal::{Journal, SagaJournal};
use crate::result::ActionResult;
use crate::state::SagaStatus;
use crate::subrequest::{SubRequest, SubRequestList, action_fn};

/// Saga execution coordinator.
///
/// Drives a saga through its registered sub-requests: forward while every
/// step succeeds, backward through the compensations once one fails, so
/// the saga always terminates with either all steps committed or all
/// committed steps compensated. Every transition goes through the journal
/// before it takes effect, which is what lets a saga be restored and
/// resumed from whatever was last durably recorded.
///
/// The drive loop is single-threaded per saga and runs on the caller's
/// task; `start_saga` does not return until the saga terminates. One
/// coordinator may still run several independent sagas concurrently from
/// different tasks.
pub struct SagaCoordinator<J> {
    sub_requests: SubRequestList,
    journal: J,
    compensation_retry_limit: Option<u32>,
}

impl<S: EventLogStore> SagaCoordinator<SagaJournal<S>> {
    /// Creates a coordinator journaling into the given storage driver.
    pub fn new(storage: S) -> Self {
        Self::with_journal(SagaJournal::new(storage))
    }
}

impl<J: Journal> SagaCoordinator<J> {
    /// Creates a coordinator over an existing journal.
    pub fn with_journal(journal: J) -> Self {
        Self {
            sub_requests: SubRequestList::new(),
            journal,
            compensation_retry_limit: None,
        }
    }

    /// Bounds how many times one compensation may fail back-to-back before
    /// the coordinator gives up with
    /// [`SagaError::CompensationRetryExhausted`].
    ///
    /// The default is unbounded: a compensation that keeps failing keeps
    /// the loop spinning, which is safe only because compensations are
    /// required to be idempotent. The counter resets whenever a
    /// compensation makes progress.
    pub fn with_compensation_retry_limit(mut self, limit: u32) -> Self {
        self.compensation_retry_limit = Some(limit);
        self
    }

    /// Appends a sub-request to the saga pipeline.
    ///
    /// Registration order is forward execution order; compensations run in
    /// reverse. Ids must be unique, non-empty, and not one of the reserved
    /// `_init` / `_finish` markers.
    pub fn append_new_sub_request<A, AFut, C, CFut>(
        mut self,
        id: impl Into<String>,
        action: A,
        compensation: C,
    ) -> Result<Self, SagaError>
    where
        A: Fn(CancellationToken, Value) -> AFut + Send + Sync + 'static,
        AFut: Future<Output = ActionResult> + Send + 'static,
        C: Fn(CancellationToken, Value) -> CFut + Send + Sync + 'static,
        CFut: Future<Output = ActionResult> + Send + 'static,
    {
        self.sub_requests.append(SubRequest::new(
            id,
            action_fn(action),
            action_fn(compensation),
        ))?;
        Ok(self)
    }

    /// Returns the status of a saga currently tracked by the journal, or
    /// `None` once the saga terminated and was dropped from tracking.
    pub async fn saga_status(&self, saga_id: SagaId) -> Option<SagaStatus> {
        self.journal.saga_status(saga_id).await
    }

    /// Creates a new saga carrying `initial_context` and drives it to
    /// termination.
    ///
    /// Returns the saga id: the in-memory projection is dropped once the
    /// saga terminates, but its journaled records remain in storage under
    /// that id. Journal and storage errors abort the loop and leave the
    /// saga in the last durably recorded state.
    #[tracing::instrument(skip_all)]
    pub async fn start_saga(
        &self,
        cancel: &CancellationToken,
        initial_context: Value,
    ) -> Result<SagaId, SagaError> {
        if self.sub_requests.is_empty() {
            return Err(SagaError::EmptyRegistry);
        }

        metrics::counter!("saga_executions_total").increment(1);
        let started = Instant::now();

        let saga_id = self
            .journal
            .create_new_saga(cancel, initial_context)
            .await
            .map_err(|e| SagaError::SagaCreation(Box::new(e)))?;
        tracing::info!(%saga_id, "saga started");

        let outcome = self.run_saga(cancel, saga_id).await;
        metrics::histogram!("saga_duration_seconds").record(started.elapsed().as_secs_f64());
        outcome?;

        Ok(saga_id)
    }

    /// Restores a saga from storage and drives it to termination.
    ///
    /// Recovery entry point after a crash or restart. The log must not end
    /// on a forward step still marked `running`: re-running an interrupted
    /// action blindly is only safe when the caller can vouch for its
    /// idempotency, so that case surfaces [`SagaError::InFlightStep`]
    /// instead. An interrupted *compensation* is re-run, which the
    /// idempotency contract already covers.
    #[tracing::instrument(skip_all)]
    pub async fn resume_saga(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<(), SagaError> {
        let status = self.journal.restore_saga(cancel, saga_id).await?;
        tracing::info!(%saga_id, %status, "saga restored");
        self.run_saga(cancel, saga_id).await
    }

    /// The drive loop: reads the saga status and dispatches until the saga
    /// reaches `done`.
    async fn run_saga(&self, cancel: &CancellationToken, saga_id: SagaId) -> Result<(), SagaError> {
        let mut compensated = false;
        let mut retries: Option<(String, u32)> = None;

        loop {
            match self.journal.saga_status(saga_id).await {
                Some(SagaStatus::Running) => self.exec_next_action(cancel, saga_id).await?,
                Some(SagaStatus::Aborted) => {
                    compensated = true;
                    let failed = self.exec_next_compensation(cancel, saga_id).await?;
                    self.track_compensation_retries(&mut retries, failed)?;
                }
                Some(SagaStatus::Done) => {
                    self.journal.delete_saga(saga_id).await;
                    if compensated {
                        metrics::counter!("saga_compensated_total").increment(1);
                        tracing::info!(%saga_id, "saga terminated after compensation");
                    } else {
                        metrics::counter!("saga_completed").increment(1);
                        tracing::info!(%saga_id, "saga completed");
                    }
                    return Ok(());
                }
                None => return Err(SagaError::SagaNotFound(saga_id)),
            }
        }
    }

    /// One forward iteration: select the sub-request after the last settled
    /// step and run its action.
    async fn exec_next_action(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<(), SagaError> {
        let last = self
            .journal
            .last_event_log(saga_id)
            .await
            .ok_or(SagaError::SagaNotFound(saga_id))?;
        if last.state == StepState::Running {
            return Err(SagaError::InFlightStep { step: last.step });
        }

        let Some(next) = self.sub_requests.after(&last.step)? else {
            tracing::info!(%saga_id, "no sub-request left, marking saga as done");
            return self.journal.mark_saga_as_done(cancel, saga_id).await;
        };

        let step = next.id().to_string();
        tracing::info!(%saga_id, step, "sub-request action started");
        self.journal
            .mark_sub_request_as_running(cancel, saga_id, &step, last.context.clone())
            .await?;

        match next.run_action(cancel.clone(), last.context).await {
            ActionResult::Success { context } => {
                tracing::info!(%saga_id, step, "sub-request action succeeded");
                self.journal
                    .mark_sub_request_as_done(cancel, saga_id, &step, context)
                    .await
            }
            ActionResult::Failure { error, context } => {
                tracing::warn!(%saga_id, step, error, "sub-request action failed, aborting saga");
                metrics::counter!("saga_step_failures_total").increment(1);
                self.journal
                    .mark_sub_request_as_aborted(cancel, saga_id, &step, context)
                    .await
            }
        }
    }

    /// One compensating iteration. Returns the step id when its
    /// compensation failed (so the caller can count retries), `None` when
    /// the walk made progress.
    async fn exec_next_compensation(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<Option<String>, SagaError> {
        let last = self
            .journal
            .last_event_log(saga_id)
            .await
            .ok_or(SagaError::SagaNotFound(saga_id))?;

        // An interrupted or just-aborted step is compensated in place; a
        // completed one moves the walk leftward.
        let target = match last.state {
            StepState::Running | StepState::Aborted => Some(self.sub_requests.by_id(&last.step)?),
            StepState::Done => self.sub_requests.before(&last.step)?,
        };

        let Some(target) = target else {
            tracing::info!(%saga_id, "all committed sub-requests compensated, marking saga as done");
            self.journal.mark_saga_as_done(cancel, saga_id).await?;
            return Ok(None);
        };

        let step = target.id().to_string();
        tracing::info!(%saga_id, step, "compensation started");
        self.journal
            .mark_sub_request_as_running(cancel, saga_id, &step, last.context.clone())
            .await?;

        match target.run_compensation(cancel.clone(), last.context).await {
            ActionResult::Success { context } => {
                tracing::info!(%saga_id, step, "compensation succeeded");
                self.journal
                    .mark_sub_request_as_done(cancel, saga_id, &step, context)
                    .await?;
                Ok(None)
            }
            ActionResult::Failure { error, context } => {
                tracing::warn!(%saga_id, step, error, "compensation failed, will retry");
                self.journal
                    .mark_sub_request_as_aborted(cancel, saga_id, &step, context)
                    .await?;
                Ok(Some(step))
            }
        }
    }

    /// Counts consecutive failures of the same compensation and enforces
    /// the optional retry bound.
    fn track_compensation_retries(
        &self,
        retries: &mut Option<(String, u32)>,
        failed: Option<String>,
    ) -> Result<(), SagaError> {
        let Some(step) = failed else {
            *retries = None;
            return Ok(());
        };

        let attempts = match retries {
            Some((s, n)) if *s == step => *n + 1,
            _ => 1,
        };
        *retries = Some((step.clone(), attempts));

        if let Some(limit) = self.compensation_retry_limit
            && attempts >= limit
        {
            metrics::counter!("saga_compensation_exhausted_total").increment(1);
            return Err(SagaError::CompensationRetryExhausted { step, attempts });
        }
        Ok(())
    }
}
