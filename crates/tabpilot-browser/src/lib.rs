//! # Tabpilot Browser
//!
//! Browser control core over the Chrome DevTools Protocol.
//!
//! The crate is organized around five collaborators:
//!
//! - [`cdp`]: the protocol client, a WebSocket transport behind the
//!   [`cdp::CdpTransport`] seam plus a [`cdp::ConnectionManager`] owning
//!   the single debugger attachment, the tab stack, new-tab waits, and
//!   event fan-out.
//! - [`snapshot`]: accessibility-tree snapshots rendered as indented text,
//!   with uids that stay stable for the life of an attachment.
//! - [`actions`]: the [`actions::ActionExecutor`] that resolves uids to
//!   live nodes and drives trusted input, with script fallbacks for
//!   widgets that swallow real events.
//! - [`wait`]: settling, meaning navigation detection and DOM quiescence
//!   after every mutation.
//! - [`orchestrator`]: checkpointed, watchdog-supervised command runs
//!   with operator-intervention handoff.
//!
//! Durable session state lives in the `tabpilot-state` crate; retry
//! supervision in `tabpilot-watchdog`.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use tabpilot_browser::actions::{ActionExecutor, ExecutorConfig};
//! use tabpilot_browser::cdp::{ConnectionManager, WsTransport};
//! use tabpilot_browser::feedback::OverlayFeedback;
//! use tabpilot_browser::orchestrator::{ActionDescriptor, Orchestrator};
//! use tabpilot_browser::snapshot::SnapshotManager;
//! use tabpilot_browser::wait::{WaitConfig, WaitCoordinator};
//! use tabpilot_state::{AutomationStateStore, FileStateStore};
//! use tabpilot_watchdog::WatchdogConfig;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(WsTransport::connect("http://localhost:9222").await?);
//! let conn = ConnectionManager::new(transport).await?;
//! let snapshots = SnapshotManager::new(conn.clone());
//! let wait = Arc::new(WaitCoordinator::new(conn.clone(), WaitConfig::default()));
//! let feedback = Arc::new(OverlayFeedback::new(conn.clone()));
//! let executor = ActionExecutor::new(
//!     conn.clone(),
//!     snapshots.clone(),
//!     wait,
//!     feedback.clone(),
//!     ExecutorConfig::default(),
//! );
//! let store = Arc::new(FileStateStore::new(FileStateStore::default_path()).await?);
//! let state = Arc::new(AutomationStateStore::open("session", store).await);
//!
//! let orchestrator = Orchestrator::new(
//!     conn, snapshots, executor, state, feedback, WatchdogConfig::default(),
//! );
//! let outcome = orchestrator
//!     .run(&ActionDescriptor::new("snapshot", serde_json::json!({})))
//!     .await;
//! println!("{}", outcome.text());
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod cdp;
pub mod error;
pub mod feedback;
pub mod orchestrator;
pub mod snapshot;
pub mod wait;

pub use actions::{ActionExecutor, ExecutorConfig};
pub use cdp::{CdpError, CdpTransport, ConnectionManager, WsTransport};
pub use error::ActionError;
pub use feedback::{NoopFeedback, OverlayFeedback, VisualFeedback};
pub use orchestrator::{ActionDescriptor, Orchestrator, OrchestratorPhase, ToolOutcome};
pub use snapshot::{SnapshotManager, SnapshotOptions};
pub use wait::{WaitConfig, WaitCoordinator};
