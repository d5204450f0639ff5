//! Pause gate handed between automation and the person at the keyboard.

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::info;

/// While engaged, command runs block in [`InterventionGate::wait_clear`]
/// until the operator resumes, optionally leaving a note describing what
/// they did.
pub struct InterventionGate {
    paused: watch::Sender<bool>,
    note: Mutex<Option<String>>,
}

impl Default for InterventionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl InterventionGate {
    pub fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            paused,
            note: Mutex::new(None),
        }
    }

    /// Hand control to the operator.
    pub fn engage(&self, reason: &str) {
        info!("Pausing for user intervention: {}", reason);
        self.note.lock().take();
        // send_replace updates the value even with no receiver alive;
        // plain send would silently drop the pause.
        self.paused.send_replace(true);
    }

    /// Operator hands control back, optionally describing what changed.
    pub fn resume(&self, note: Option<String>) {
        info!("User intervention finished");
        *self.note.lock() = note;
        self.paused.send_replace(false);
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// Wait until the gate is open.
    pub async fn wait_clear(&self) {
        let mut rx = self.paused.subscribe();
        while *rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Take the note left by the operator, if any.
    pub fn take_note(&self) -> Option<String> {
        self.note.lock().take()
    }
}
