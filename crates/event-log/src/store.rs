use async_trait::async_trait;
use common::SagaId;
use tokio_util::sync::CancellationToken;

use crate::{EventLog, error::Result};

/// Driver interface for durably appending saga event-log records.
///
/// This is the only storage seam the coordinator core depends on. A
/// successful [`save_event_log`](EventLogStore::save_event_log) means the
/// record is at-least-once durable; on failure the record must not be
/// considered written. Implementations must be safe under concurrent
/// appends for different saga ids; a single saga is only ever appended to
/// by one drive loop at a time.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    /// Durably appends a single record.
    ///
    /// Implementations may honour the ambient cancellation token by
    /// returning [`Cancelled`](crate::EventLogStoreError::Cancelled), in
    /// which case nothing was written.
    async fn save_event_log(&self, cancel: &CancellationToken, record: &EventLog) -> Result<()>;

    /// Returns every record stored for the given saga, in append order.
    ///
    /// This is the replay read used to rebuild a journal projection after a
    /// restart. A saga this store has never seen yields an empty vec.
    async fn load_event_logs(
        &self,
        cancel: &CancellationToken,
        saga_id: SagaId,
    ) -> Result<Vec<EventLog>>;
}
