//! Types shared across the saga workspace.

pub mod types;

pub use types::SagaId;
