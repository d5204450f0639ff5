//! The command orchestrator: every action runs as a checkpointed,
//! supervised transaction.
//!
//! A run records the page and the intent before dispatching, supervises
//! the dispatch under the watchdog, commits on success, and marks
//! recovery on failure. Navigation-class failures roll the session back
//! to the checkpoint's URL. Failures that look like they need a human
//! pause the run and retry once after the operator hands control back.

pub mod blocking;
pub mod commands;
pub mod intervention;

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tabpilot_state::AutomationStateStore;
use tabpilot_watchdog::{RunOptions, Watchdog, WatchdogConfig, WatchdogError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::actions::ActionExecutor;
use crate::cdp::{CdpError, ConnectionManager};
use crate::error::ActionError;
use crate::feedback::VisualFeedback;
use crate::snapshot::{SnapshotManager, SnapshotOptions};

pub use commands::{ActionDescriptor, CommandSpec, CommandTable, ToolOutcome};
pub use intervention::InterventionGate;

/// Where the orchestrator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorPhase {
    /// No command has run yet.
    Idle,
    /// Commands are flowing.
    Active,
    /// An operator has control.
    Paused,
    /// The last command failed; state carries a recovery mark.
    Recovering,
}

/// Failure messages that warrant handing control to the operator before
/// one more try.
const INTERVENTION_HINTS: &[&str] = &[
    "timeout",
    "deadline",
    "not found",
    "not interactable",
    "not visible",
    "navigation",
    "load",
    "intercepted",
    "obscured",
];

fn needs_intervention(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    INTERVENTION_HINTS.iter().any(|hint| m.contains(hint))
}

#[derive(Debug, Error)]
enum RunError {
    #[error(transparent)]
    Cdp(#[from] CdpError),
    #[error(transparent)]
    Watchdog(#[from] WatchdogError),
}

/// Runs commands against one browser session.
pub struct Orchestrator {
    conn: Arc<ConnectionManager>,
    snapshots: Arc<SnapshotManager>,
    executor: ActionExecutor,
    state: Arc<AutomationStateStore>,
    feedback: Arc<dyn VisualFeedback>,
    watchdog: Watchdog,
    commands: CommandTable,
    gate: InterventionGate,
    phase: Mutex<OrchestratorPhase>,
}

impl Orchestrator {
    pub fn new(
        conn: Arc<ConnectionManager>,
        snapshots: Arc<SnapshotManager>,
        executor: ActionExecutor,
        state: Arc<AutomationStateStore>,
        feedback: Arc<dyn VisualFeedback>,
        watchdog_config: WatchdogConfig,
    ) -> Self {
        Self {
            conn,
            snapshots,
            executor,
            state,
            feedback,
            watchdog: Watchdog::new(watchdog_config),
            commands: CommandTable::standard(),
            gate: InterventionGate::new(),
            phase: Mutex::new(OrchestratorPhase::Idle),
        }
    }

    pub fn phase(&self) -> OrchestratorPhase {
        *self.phase.lock()
    }

    /// Operator hands control back after a pause.
    pub fn resume(&self, note: Option<String>) {
        self.gate.resume(note);
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    /// Run one command to an outcome. Never panics the caller with an
    /// error type; failures come back as [`ToolOutcome::Error`].
    pub async fn run(&self, descriptor: &ActionDescriptor) -> ToolOutcome {
        match self.run_once(descriptor).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                if needs_intervention(&message) {
                    info!(
                        "'{}' failed retryably; handing control to the operator",
                        descriptor.name
                    );
                    self.pause_for_intervention(&format!(
                        "'{}' failed: {}",
                        descriptor.name, message
                    ))
                    .await;
                    match self.run_once(descriptor).await {
                        Ok(outcome) => outcome,
                        Err(e) => ToolOutcome::error(e),
                    }
                } else {
                    ToolOutcome::error(message)
                }
            }
        }
    }

    async fn run_once(&self, descriptor: &ActionDescriptor) -> Result<ToolOutcome, RunError> {
        // Unknown names are a caller mistake, answered without touching
        // the browser.
        let spec = match self.commands.get(&descriptor.name) {
            Some(spec) => *spec,
            None => {
                return Ok(ToolOutcome::error(format!(
                    "Unknown command '{}'. Available: {}",
                    descriptor.name,
                    self.commands.names().join(", ")
                )));
            }
        };

        self.ensure_connection().await?;
        self.gate.wait_clear().await;
        self.enter_active().await;

        if let Some(reason) = blocking::scan_for_blockers(&self.conn).await {
            self.pause_for_intervention(&reason).await;
        }

        let checkpoint_label = format!("before_{}", spec.name);
        self.begin_transaction(&spec, descriptor, &checkpoint_label)
            .await;

        let opts = RunOptions {
            timeout_ms: Some(spec.timeout_ms),
            retries: Some(spec.retries),
        };
        let args = descriptor.args.clone();
        let dispatch_spec = &spec;
        let dispatch_args = &args;
        let result = self
            .watchdog
            .run(
                spec.name,
                || self.dispatch(dispatch_spec, dispatch_args),
                opts,
                None,
            )
            .await;

        match result {
            Ok(outcome) => {
                self.state.record_commit(spec.name).await;
                {
                    let mut phase = self.phase.lock();
                    if *phase == OrchestratorPhase::Recovering {
                        *phase = OrchestratorPhase::Active;
                    }
                }
                if self.state.state().await.needs_recovery {
                    self.state.clear_recovery().await;
                }
                Ok(outcome)
            }
            Err(e) => {
                warn!("'{}' exhausted supervision: {}", spec.name, e);
                self.state.mark_recovery(&e.to_string()).await;
                *self.phase.lock() = OrchestratorPhase::Recovering;
                if spec.navigation_class {
                    self.rollback(&checkpoint_label).await;
                }
                Err(e.into())
            }
        }
    }

    /// Record page, intent, and a rollback point before dispatching.
    async fn begin_transaction(
        &self,
        spec: &CommandSpec,
        descriptor: &ActionDescriptor,
        checkpoint_label: &str,
    ) {
        if let Ok(doc) = self.snapshots.take_snapshot(SnapshotOptions::default()).await {
            self.state.record_snapshot(&doc).await;
        }
        self.state.record_action(spec.name).await;

        let url = match self.executor.current_page().await {
            Ok(Some(page)) => Some(page.url),
            _ => None,
        };
        self.state
            .save_checkpoint(
                checkpoint_label,
                json!({"url": url, "args": descriptor.args}),
            )
            .await;
    }

    /// Restore the checkpoint and steer the tab back to its URL.
    async fn rollback(&self, checkpoint_label: &str) {
        let record = match self.state.restore_checkpoint(checkpoint_label).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Rollback skipped: {}", e);
                return;
            }
        };
        if let Some(url) = record.payload["url"].as_str() {
            debug!("Rolling back to {}", url);
            if let Err(e) = self.executor.navigate(url).await {
                warn!("Rollback navigation failed: {}", e);
            }
        }
    }

    async fn dispatch(&self, spec: &CommandSpec, args: &Value) -> Result<ToolOutcome, ActionError> {
        use commands::*;

        let text = match spec.name {
            "click" => {
                let a: ClickArgs = parse(args)?;
                self.executor.click(&a.uid, a.double).await?
            }
            "fill" => {
                let a: FillArgs = parse(args)?;
                self.executor.fill(&a.uid, &a.value).await?
            }
            "press_key" => {
                let a: PressKeyArgs = parse(args)?;
                self.executor.press_key(&a.key).await?
            }
            "drag" => {
                let a: DragArgs = parse(args)?;
                self.executor.drag(&a.from_uid, &a.to_uid).await?
            }
            "hover" => {
                let a: HoverArgs = parse(args)?;
                self.executor.hover(&a.uid).await?
            }
            "navigate" => {
                let a: NavigateArgs = parse(args)?;
                self.executor.navigate(&a.url).await?
            }
            "go_back" => self.executor.go_back().await?,
            "go_forward" => self.executor.go_forward().await?,
            "reload" => self.executor.reload().await?,
            "open_tab" => {
                let a: OpenTabArgs = parse(args)?;
                self.executor.open_tab(a.url.as_deref()).await?
            }
            "close_tab" => {
                let a: TabIdArgs = parse(args)?;
                self.executor.close_tab(&a.target_id).await?
            }
            "list_tabs" => self.executor.list_tabs().await?,
            "select_tab" => {
                let a: TabIdArgs = parse(args)?;
                self.executor.select_tab(&a.target_id).await?
            }
            "snapshot" => {
                let a: SnapshotArgs = parse(args)?;
                let doc = self
                    .snapshots
                    .take_snapshot(SnapshotOptions {
                        verbose: a.verbose,
                        force_refresh: true,
                    })
                    .await
                    .map_err(ActionError::from)?;
                self.state.record_snapshot(&doc).await;
                doc
            }
            "screenshot" => {
                let image = self.executor.screenshot().await?;
                return Ok(ToolOutcome::ImageText {
                    image,
                    text: "Screenshot of the current page".to_string(),
                });
            }
            other => return Err(ActionError::Failed(format!("unroutable command {other}"))),
        };
        Ok(ToolOutcome::Text(text))
    }

    /// Pause, wait for the operator, then account for whatever they did.
    async fn pause_for_intervention(&self, reason: &str) {
        *self.phase.lock() = OrchestratorPhase::Paused;

        let pre_hash = self.snapshots.current_hash().await.ok();
        if let Ok(doc) = self
            .snapshots
            .take_snapshot(SnapshotOptions {
                force_refresh: true,
                ..Default::default()
            })
            .await
        {
            self.state.record_snapshot(&doc).await;
        }
        self.state
            .save_checkpoint("before_intervention", json!({"reason": reason}))
            .await;
        self.state.begin_intervention(reason).await;
        self.feedback.show_pause_banner(reason).await;

        self.gate.engage(reason);
        self.gate.wait_clear().await;

        // The operator may have changed the page under us.
        if let Ok(new_hash) = self.snapshots.current_hash().await {
            if pre_hash != Some(new_hash) {
                debug!("Page changed during intervention");
                self.state.record_unattended_change(pre_hash, new_hash).await;
            }
        }

        let note = self.gate.take_note();
        self.state.end_intervention(note).await;
        self.feedback.hide_pause_banner().await;
        *self.phase.lock() = OrchestratorPhase::Active;
    }

    /// Attach to the first open page when nothing is attached yet.
    async fn ensure_connection(&self) -> Result<(), CdpError> {
        if self.conn.attached() {
            return Ok(());
        }
        let tabs = self.conn.list_tabs().await?;
        let first = tabs
            .first()
            .ok_or_else(|| CdpError::TargetNotFound("no open pages".into()))?;
        debug!("Auto-attaching to {}", first.id);
        self.conn.attach(&first.id).await?;
        Ok(())
    }

    async fn enter_active(&self) {
        let first_use = {
            let mut phase = self.phase.lock();
            if *phase == OrchestratorPhase::Idle {
                *phase = OrchestratorPhase::Active;
                true
            } else {
                false
            }
        };
        if first_use {
            self.feedback.show_automation_indicator().await;
        }
    }
}

fn parse<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ActionError> {
    serde_json::from_value(args.clone())
        .map_err(|e| ActionError::Failed(format!("invalid arguments: {}", e)))
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
