use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a saga instance.
///
/// The journal tracks every saga under an opaque id and stamps it on each
/// event-log record. The default generation strategy draws a random
/// 128-bit UUID; wherever the id surfaces (logs, error messages, the
/// serialized record) it is rendered as canonical hyphenated text, and the
/// transparent serde form is how storage drivers round-trip it. Generated
/// ids must be unique within the coordinator's lifetime; a collision is
/// programmer error, not a condition the journal defends against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Draws a new random saga ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
