//! Watchdog errors.

use thiserror::Error;

use crate::classify::FailureClass;

/// Watchdog error types.
#[derive(Debug, Error)]
pub enum WatchdogError {
    /// All attempts exhausted (or the failure was non-retryable).
    #[error("action '{name}' failed after {attempts} attempt(s) [{class:?}]: {message}")]
    Exhausted {
        name: String,
        attempts: u32,
        class: FailureClass,
        message: String,
    },
}

impl WatchdogError {
    /// The classification attached to the terminal failure.
    pub fn class(&self) -> FailureClass {
        match self {
            WatchdogError::Exhausted { class, .. } => *class,
        }
    }

    /// How many attempts were made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            WatchdogError::Exhausted { attempts, .. } => *attempts,
        }
    }
}
