//! Saga status and the per-saga journal projection.

use common::SagaId;
use event_log::{EventLog, FINISH_STEP, INIT_STEP, StepState, is_reserved_step};
use serde::{Deserialize, Serialize};

use crate::error::SagaError;

/// The status of a saga in its lifecycle.
///
/// ```text
/// Running ──┬────────────► Done
///           └─► Aborted ──► Done
/// ```
///
/// `Aborted` means the compensating path is in progress; it still
/// terminates in `Done` once every committed step has been compensated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SagaStatus {
    /// Forward steps are being executed.
    Running,

    /// A step failed; compensations are unwinding the committed steps.
    Aborted,

    /// The saga terminated (terminal state).
    Done,
}

impl SagaStatus {
    /// Returns true when this is the terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaStatus::Done)
    }

    /// Returns the status name as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaStatus::Running => "running",
            SagaStatus::Aborted => "aborted",
            SagaStatus::Done => "done",
        }
    }
}

impl std::fmt::Display for SagaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The in-memory projection of one saga: its status and event log.
///
/// A projection is only ever derived from appended records. [`Saga::apply`]
/// is the single transition function, used both when a record is appended
/// live and when the log is replayed from storage, so a rebuilt projection
/// always matches the one a live run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    id: SagaId,
    status: SagaStatus,
    event_logs: Vec<EventLog>,
}

impl Saga {
    /// Creates the projection from the freshly written `_init/done` record.
    pub(crate) fn new(id: SagaId, init: EventLog) -> Self {
        Self {
            id,
            status: SagaStatus::Running,
            event_logs: vec![init],
        }
    }

    /// Rebuilds a projection by replaying records loaded from storage.
    ///
    /// Rejects logs this journal could never have written: an empty log, a
    /// log not starting with `_init/done`, an outcome record without a
    /// preceding `running` for the same step, a `_finish` on an unsettled
    /// log, or records after `_finish`.
    pub fn replay(id: SagaId, records: Vec<EventLog>) -> Result<Self, SagaError> {
        let corrupt = |reason: String| SagaError::CorruptJournal {
            saga_id: id,
            reason,
        };

        let mut records = records.into_iter();
        let Some(init) = records.next() else {
            return Err(corrupt("event log is empty".to_string()));
        };
        if init.step != INIT_STEP || init.state != StepState::Done {
            return Err(corrupt(format!(
                "expected the log to start with _init/done, found {}/{}",
                init.step, init.state
            )));
        }

        let mut saga = Saga::new(id, init);
        for record in records {
            if saga.status == SagaStatus::Done {
                return Err(corrupt("found records after _finish".to_string()));
            }
            if record.step == FINISH_STEP {
                if saga.last_event_log().map(|r| r.state) != Some(StepState::Done) {
                    return Err(corrupt("_finish written on an unsettled log".to_string()));
                }
            } else if record.state.is_terminal()
                && !is_reserved_step(&record.step)
                && saga.step_state(&record.step) != Some(StepState::Running)
            {
                return Err(corrupt(format!(
                    "step {:?} reached {} without a running record",
                    record.step, record.state
                )));
            }
            saga.apply(record);
        }
        Ok(saga)
    }

    /// Appends a record and folds it into the status.
    pub(crate) fn apply(&mut self, record: EventLog) {
        if record.state == StepState::Aborted {
            self.status = SagaStatus::Aborted;
        }
        if record.step == FINISH_STEP && record.state == StepState::Done {
            self.status = SagaStatus::Done;
        }
        self.event_logs.push(record);
    }

    /// Returns the saga id.
    pub fn id(&self) -> SagaId {
        self.id
    }

    /// Returns the current status.
    pub fn status(&self) -> SagaStatus {
        self.status
    }

    /// Returns every record appended so far, oldest first.
    pub fn event_logs(&self) -> &[EventLog] {
        &self.event_logs
    }

    /// Returns the last appended record.
    pub fn last_event_log(&self) -> Option<&EventLog> {
        self.event_logs.last()
    }

    /// Returns the state of the most recent record for an exact-match step
    /// id, or `None` when the step never appeared.
    pub fn step_state(&self, step: &str) -> Option<StepState> {
        self.event_logs
            .iter()
            .rev()
            .find(|r| r.step == step)
            .map(|r| r.state)
    }
}
