//! Saga execution coordinator.
//!
//! A saga is a distributed transaction decomposed into an ordered pipeline
//! of sub-requests, each paired with a compensating action that
//! semantically undoes it. The coordinator drives the pipeline forward
//! while every step succeeds, and backward through the compensations once
//! one fails, so every saga terminates with either all steps committed or
//! all committed steps compensated.
//!
//! Every state transition is appended to a durable event log before it
//! takes effect; the in-memory state is a replayable projection of that
//! log, which is what makes the outcome survive a crash of the process
//! driving the saga.
//!
//! ```no_run
//! use event_log::InMemoryEventLogStore;
//! use saga::{ActionResult, SagaCoordinator};
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), saga::SagaError> {
//! let coordinator = SagaCoordinator::new(InMemoryEventLogStore::new())
//!     .append_new_sub_request(
//!         "debit",
//!         |_cancel, context| async move { ActionResult::success(context) },
//!         |_cancel, context| async move { ActionResult::success(context) },
//!     )?
//!     .append_new_sub_request(
//!         "credit",
//!         |_cancel, context| async move { ActionResult::success(context) },
//!         |_cancel, context| async move { ActionResult::success(context) },
//!     )?;
//!
//! let saga_id = coordinator
//!     .start_saga(&CancellationToken::new(), json!({"amount": 10}))
//!     .await?;
//! # let _ = saga_id;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod journal;
pub mod result;
pub mod state;
pub mod subrequest;

pub use common::SagaId;
pub use coordinator::SagaCoordinator;
pub use error::SagaError;
pub use journal::{IdGenerator, Journal, SagaJournal};
pub use result::ActionResult;
pub use state::{Saga, SagaStatus};
pub use subrequest::{Action, ActionFuture, SubRequest, SubRequestList, action_fn};
