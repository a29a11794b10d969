//! Saga error types.

use common::SagaId;
use event_log::{EventLogStoreError, StepState};
use thiserror::Error;

/// Errors that can occur while coordinating a saga.
///
/// Failures of user actions and compensations are not errors at this
/// level: they are [`ActionResult::Failure`](crate::ActionResult::Failure)
/// values that steer the saga onto the compensating path. Everything here
/// aborts the drive loop and leaves the saga in whatever state the journal
/// last durably recorded.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The durable append failed. The in-memory projection was not updated,
    /// so the saga remains resumable from the prior record.
    #[error("failed to save into the storage: {0}")]
    Storage(#[from] EventLogStoreError),

    /// Writing the saga's `_init` record failed; no saga exists.
    #[error("failed to create a new saga: {0}")]
    SagaCreation(#[source] Box<SagaError>),

    /// The journal does not track the given saga.
    #[error("saga {0} not found in the journal")]
    SagaNotFound(SagaId),

    /// An outcome was recorded for a step whose most recent record is not
    /// in the expected state, e.g. completing an already-completed step.
    #[error("expected current state to be \"{expected}\", have \"{have}\"")]
    IllegalTransition {
        step: String,
        expected: StepState,
        have: StepState,
    },

    /// An outcome was recorded for a step that has no record at all.
    #[error("expected current state to be \"running\", found no previous record for step {step:?}")]
    NoPreviousState { step: String },

    /// A registry lookup for a step id that was never registered. Usually a
    /// journal written by a different registry version.
    #[error("unknown sub-request id {0:?}")]
    UnknownSubRequest(String),

    /// The registry holds no sub-requests.
    #[error("no sub-request registered")]
    EmptyRegistry,

    /// Two sub-requests were registered under the same id.
    #[error("duplicate sub-request id {0:?}")]
    DuplicateSubRequest(String),

    /// A sub-request was registered under a reserved marker id.
    #[error("sub-request id {0:?} is reserved")]
    ReservedSubRequest(String),

    /// A sub-request was registered with an empty id.
    #[error("sub-request id must not be empty")]
    EmptySubRequestId,

    /// Forward dispatch found the previous step still running: a prior
    /// invocation was interrupted mid-step. Re-running the step is only
    /// safe when the caller can vouch for its idempotency, so the
    /// coordinator refuses instead.
    #[error("the previous sub-request action is not finished (step {step:?} is still running)")]
    InFlightStep { step: String },

    /// The stored event log could not have been produced by this journal.
    #[error("corrupted journal for saga {saga_id}: {reason}")]
    CorruptJournal { saga_id: SagaId, reason: String },

    /// A compensation kept failing and the configured retry bound was hit.
    #[error("compensation for step {step:?} failed {attempts} times, giving up")]
    CompensationRetryExhausted { step: String, attempts: u32 },
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
