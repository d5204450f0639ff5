//! # Tabpilot State
//!
//! Durable record of a browser-automation session: task/session identity,
//! last action, last snapshot hash, a bounded typed event log, named
//! checkpoints, and the recovery/intervention flags the orchestrator keys
//! off.
//!
//! Persistence is fire-and-forget: every mutator appends a typed event and
//! pushes the whole state through a [`StateStore`]; a store failure is
//! logged, never propagated, so a flaky disk cannot take an action down
//! with it.

pub mod automation;
pub mod error;
pub mod state;
pub mod store;

pub use automation::AutomationStateStore;
pub use error::StateError;
pub use state::{
    page_hash, AutomationState, CheckpointRecord, EventLogEntry, StateEventKind, DEFAULT_EVENT_CAP,
};
pub use store::{FileStateStore, MemoryStateStore, StateStore};
