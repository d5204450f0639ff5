//! The automation state store: mutators, checkpoints, flags.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::StateError;
use crate::state::{
    page_hash, AutomationState, CheckpointRecord, StateEventKind, DEFAULT_EVENT_CAP,
};
use crate::store::StateStore;

/// Durable record of one automation session.
///
/// Every mutator appends a typed event and persists the whole state through
/// the backing [`StateStore`]. Appending alone (via [`log_event`]) does not
/// force persistence. Persistence is best-effort: a store failure is logged
/// and swallowed, so a crash between mutation and persistence can lose that
/// mutation.
///
/// [`log_event`]: AutomationStateStore::log_event
pub struct AutomationStateStore {
    key: String,
    state: RwLock<AutomationState>,
    store: Arc<dyn StateStore>,
    event_cap: usize,
}

impl AutomationStateStore {
    /// Open the state under `key`, loading any persisted record or starting
    /// fresh.
    pub async fn open(key: impl Into<String>, store: Arc<dyn StateStore>) -> Self {
        let key = key.into();
        let state = match store.load(&key).await {
            Ok(Some(state)) => {
                debug!("Loaded automation state for '{}'", key);
                state
            }
            Ok(None) => AutomationState::new(),
            Err(e) => {
                warn!("Failed to load state for '{}': {}; starting fresh", key, e);
                AutomationState::new()
            }
        };

        Self {
            key,
            state: RwLock::new(state),
            store,
            event_cap: DEFAULT_EVENT_CAP,
        }
    }

    /// Current state, cloned.
    pub async fn state(&self) -> AutomationState {
        self.state.read().await.clone()
    }

    /// Append an event without persisting.
    pub async fn log_event(&self, kind: StateEventKind) {
        self.state.write().await.append_event(kind, self.event_cap);
    }

    /// Apply a mutation, append its event, persist the whole state.
    async fn mutate<R>(
        &self,
        kind: StateEventKind,
        f: impl FnOnce(&mut AutomationState) -> R,
    ) -> R {
        let snapshot;
        let result;
        {
            let mut state = self.state.write().await;
            result = f(&mut state);
            state.append_event(kind, self.event_cap);
            snapshot = state.clone();
        }
        if let Err(e) = self.store.persist(&self.key, &snapshot).await {
            warn!("Failed to persist state for '{}': {}", self.key, e);
        }
        result
    }

    /// Record the action about to run.
    pub async fn record_action(&self, name: &str) {
        let name = name.to_string();
        self.mutate(
            StateEventKind::ActionRecorded { name: name.clone() },
            move |s| s.last_action = Some(name),
        )
        .await;
    }

    /// Record a commit after a successful dispatch.
    pub async fn record_commit(&self, name: &str) {
        self.mutate(
            StateEventKind::ActionCommitted {
                name: name.to_string(),
            },
            |_| {},
        )
        .await;
    }

    /// Record the latest snapshot document; returns its hash. Bumps the
    /// DOM-change counter when the hash moves.
    pub async fn record_snapshot(&self, document: &str) -> u32 {
        let hash = page_hash(document);
        let doc = document.to_string();
        self.mutate(StateEventKind::SnapshotRecorded { hash }, move |s| {
            if s.snapshot_hash != Some(hash) {
                s.dom_version += 1;
            }
            s.last_snapshot = Some(doc);
            s.snapshot_hash = Some(hash);
            hash
        })
        .await
    }

    /// Compare `hash` against the last recorded snapshot hash.
    pub async fn has_page_changed(&self, hash: u32) -> bool {
        self.state.read().await.snapshot_hash != Some(hash)
    }

    pub async fn set_task_id(&self, task_id: Option<String>) {
        let mut state = self.state.write().await;
        state.task_id = task_id;
    }

    pub async fn push_todo(&self, item: &str) {
        let item = item.to_string();
        self.mutate(
            StateEventKind::TodoPushed { item: item.clone() },
            move |s| s.todo_queue.push(item),
        )
        .await;
    }

    pub async fn pop_todo(&self) -> Option<String> {
        let popped = {
            let state = self.state.read().await;
            state.todo_queue.first().cloned()
        };
        let item = popped?;
        self.mutate(
            StateEventKind::TodoPopped { item: item.clone() },
            |s| {
                if !s.todo_queue.is_empty() {
                    s.todo_queue.remove(0);
                }
            },
        )
        .await;
        Some(item)
    }

    /// Save a named checkpoint of the current state. Last write wins.
    pub async fn save_checkpoint(
        &self,
        label: &str,
        payload: serde_json::Value,
    ) -> CheckpointRecord {
        let label = label.to_string();
        self.mutate(
            StateEventKind::CheckpointSaved {
                label: label.clone(),
            },
            move |s| {
                let record = s.checkpoint(&label, payload);
                s.checkpoints.insert(label, record.clone());
                record
            },
        )
        .await
    }

    /// Restore the checkpoint saved under `label`.
    pub async fn restore_checkpoint(&self, label: &str) -> Result<CheckpointRecord, StateError> {
        let found = {
            let state = self.state.read().await;
            state.checkpoints.get(label).cloned()
        };
        let record = found.ok_or_else(|| StateError::CheckpointNotFound(label.to_string()))?;

        let applied = record.clone();
        self.mutate(
            StateEventKind::CheckpointRestored {
                label: label.to_string(),
            },
            move |s| s.apply_checkpoint(&applied),
        )
        .await;
        Ok(record)
    }

    pub async fn mark_recovery(&self, reason: &str) {
        self.mutate(
            StateEventKind::RecoveryMarked {
                reason: reason.to_string(),
            },
            |s| s.needs_recovery = true,
        )
        .await;
    }

    pub async fn clear_recovery(&self) {
        self.mutate(StateEventKind::RecoveryCleared, |s| {
            s.needs_recovery = false
        })
        .await;
    }

    pub async fn begin_intervention(&self, reason: &str) {
        self.mutate(
            StateEventKind::InterventionStarted {
                reason: reason.to_string(),
            },
            |s| s.user_intervention = true,
        )
        .await;
    }

    pub async fn end_intervention(&self, note: Option<String>) {
        self.mutate(StateEventKind::InterventionCleared { note }, |s| {
            s.user_intervention = false
        })
        .await;
    }

    /// Record that the page changed while the operator had control.
    pub async fn record_unattended_change(&self, old_hash: Option<u32>, new_hash: u32) {
        self.mutate(
            StateEventKind::PageChangedWhileUnattended { old_hash, new_hash },
            |_| {},
        )
        .await;
    }
}
