use chrono::{DateTime, Utc};
use common::SagaId;
use serde::{Deserialize, Serialize};

/// Reserved step marker written when a saga is created.
pub const INIT_STEP: &str = "_init";

/// Reserved step marker written when a saga terminates.
pub const FINISH_STEP: &str = "_finish";

/// Returns true when the given step id is one of the reserved markers.
///
/// The markers participate in step ordering but are never part of the user
/// registry.
pub fn is_reserved_step(step: &str) -> bool {
    step == INIT_STEP || step == FINISH_STEP
}

/// The state recorded for a single step transition.
///
/// A user step always appears in the log as `running` followed by exactly
/// one of `done` or `aborted`. The reserved `_init` and `_finish` markers
/// are only ever written as `done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    /// The step's callable has been started but has not settled.
    Running,
    /// The step's callable succeeded.
    Done,
    /// The step's callable failed.
    Aborted,
}

impl StepState {
    /// Returns true when this is a settled outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepState::Done | StepState::Aborted)
    }

    /// Returns the lowercase wire token for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepState::Running => "running",
            StepState::Done => "done",
            StepState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for StepState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable record of a saga state transition.
///
/// The journal appends a record before any transition becomes
/// authoritative; the in-memory saga state is a projection of these
/// records. The context payload is opaque: it is stored verbatim and never
/// inspected by the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLog {
    /// The saga this record belongs to.
    pub saga_id: SagaId,

    /// A user-registered sub-request id, or `_init` / `_finish`.
    pub step: String,

    /// The recorded transition state.
    pub state: StepState,

    /// The opaque payload threaded through the pipeline. `Null` when empty.
    pub context: serde_json::Value,

    /// When the record was produced.
    pub recorded_at: DateTime<Utc>,
}

impl EventLog {
    /// Creates a record for the given step transition.
    pub fn new(
        saga_id: SagaId,
        step: impl Into<String>,
        state: StepState,
        context: serde_json::Value,
    ) -> Self {
        Self {
            saga_id,
            step: step.into(),
            state,
            context,
            recorded_at: Utc::now(),
        }
    }

    /// Creates the terminal `_finish/done` record. It carries no context.
    pub fn finish(saga_id: SagaId) -> Self {
        Self::new(saga_id, FINISH_STEP, StepState::Done, serde_json::Value::Null)
    }
}
