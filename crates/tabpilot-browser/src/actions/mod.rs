//! Page actions: clicking, filling, keys, dragging, navigation.
//!
//! The executor resolves snapshot uids to live DOM nodes, preflights
//! element state, dispatches trusted input events, and falls back to
//! in-page scripts when trusted events do not take.

mod keyboard;
mod mouse;
mod navigation;
mod resolve;
pub mod scripts;

use std::sync::Arc;

use crate::cdp::ConnectionManager;
use crate::feedback::VisualFeedback;
use crate::snapshot::SnapshotManager;
use crate::wait::WaitCoordinator;

pub use resolve::ResolvedElement;

/// Executor tuning.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Physical click attempts before the script fallback.
    pub max_click_retries: u32,
    /// Linear backoff between click attempts.
    pub click_backoff_ms: u64,
    /// How long preflight waits for visible/enabled.
    pub preflight_timeout_ms: u64,
    /// How long to wait for a popup after clicking a `target=_blank` link.
    pub new_tab_timeout_ms: u64,
    /// Interpolated move events in a drag.
    pub drag_steps: u32,
    /// Delay between drag move events.
    pub drag_step_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_click_retries: 3,
            click_backoff_ms: 500,
            preflight_timeout_ms: 3_000,
            new_tab_timeout_ms: 5_000,
            drag_steps: 10,
            drag_step_delay_ms: 20,
        }
    }
}

/// Executes actions against the attached page.
pub struct ActionExecutor {
    pub(crate) conn: Arc<ConnectionManager>,
    pub(crate) snapshots: Arc<SnapshotManager>,
    pub(crate) wait: Arc<WaitCoordinator>,
    pub(crate) feedback: Arc<dyn VisualFeedback>,
    pub(crate) config: ExecutorConfig,
}

impl ActionExecutor {
    pub fn new(
        conn: Arc<ConnectionManager>,
        snapshots: Arc<SnapshotManager>,
        wait: Arc<WaitCoordinator>,
        feedback: Arc<dyn VisualFeedback>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            conn,
            snapshots,
            wait,
            feedback,
            config,
        }
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
