//! Automation state data structures and the page hash.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum retained event log entries; oldest are evicted first.
pub const DEFAULT_EVENT_CAP: usize = 100;

/// Deterministic 32-bit rolling hash over a document's text.
///
/// Equality-only: used to answer "did the page change", never for
/// integrity.
pub fn page_hash(text: &str) -> u32 {
    let mut h: u32 = 5381;
    for b in text.bytes() {
        h = h.wrapping_mul(31).wrapping_add(b as u32);
    }
    h
}

/// Typed event appended by every state mutator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEventKind {
    ActionRecorded { name: String },
    SnapshotRecorded { hash: u32 },
    CheckpointSaved { label: String },
    CheckpointRestored { label: String },
    ActionCommitted { name: String },
    RecoveryMarked { reason: String },
    RecoveryCleared,
    InterventionStarted { reason: String },
    InterventionCleared { note: Option<String> },
    PageChangedWhileUnattended { old_hash: Option<u32>, new_hash: u32 },
    TodoPushed { item: String },
    TodoPopped { item: String },
}

/// One entry in the bounded event ring.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventLogEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: StateEventKind,
}

impl EventLogEntry {
    pub fn now(kind: StateEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Named, overwritable snapshot of automation state for later comparison or
/// rollback. Keyed by label; last write wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckpointRecord {
    pub label: String,
    pub task_id: Option<String>,
    pub session_id: String,
    pub last_action: Option<String>,
    pub snapshot_hash: Option<u32>,
    pub dom_version: u64,
    pub todo_queue: Vec<String>,
    /// Free-form payload supplied by the caller (e.g. the page URL).
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The full persisted state record. One record per storage key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationState {
    pub task_id: Option<String>,
    pub session_id: String,
    pub last_action: Option<String>,
    pub last_snapshot: Option<String>,
    pub snapshot_hash: Option<u32>,
    /// Monotonic DOM-change counter, bumped whenever the snapshot hash moves.
    pub dom_version: u64,
    pub todo_queue: Vec<String>,
    pub events: VecDeque<EventLogEntry>,
    pub checkpoints: HashMap<String, CheckpointRecord>,
    pub needs_recovery: bool,
    pub user_intervention: bool,
}

impl AutomationState {
    /// Fresh state with a new session id.
    pub fn new() -> Self {
        Self {
            task_id: None,
            session_id: Uuid::new_v4().to_string(),
            last_action: None,
            last_snapshot: None,
            snapshot_hash: None,
            dom_version: 0,
            todo_queue: Vec::new(),
            events: VecDeque::new(),
            checkpoints: HashMap::new(),
            needs_recovery: false,
            user_intervention: false,
        }
    }

    /// Append an event, evicting the oldest past `cap`. Does not persist.
    pub fn append_event(&mut self, kind: StateEventKind, cap: usize) {
        self.events.push_back(EventLogEntry::now(kind));
        while self.events.len() > cap {
            self.events.pop_front();
        }
    }

    /// Build a checkpoint of the current state under `label`.
    pub fn checkpoint(&self, label: &str, payload: serde_json::Value) -> CheckpointRecord {
        CheckpointRecord {
            label: label.to_string(),
            task_id: self.task_id.clone(),
            session_id: self.session_id.clone(),
            last_action: self.last_action.clone(),
            snapshot_hash: self.snapshot_hash,
            dom_version: self.dom_version,
            todo_queue: self.todo_queue.clone(),
            payload,
            created_at: Utc::now(),
        }
    }

    /// Restore the fields a checkpoint captures.
    pub fn apply_checkpoint(&mut self, record: &CheckpointRecord) {
        self.last_action = record.last_action.clone();
        self.snapshot_hash = record.snapshot_hash;
        self.dom_version = record.dom_version;
        self.todo_queue = record.todo_queue.clone();
    }
}

impl Default for AutomationState {
    fn default() -> Self {
        Self::new()
    }
}
