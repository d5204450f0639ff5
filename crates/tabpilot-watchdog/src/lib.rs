//! # Tabpilot Watchdog
//!
//! Generic supervisor for browser automation actions.
//!
//! Runs a single action under a deadline, emits heartbeats while it is in
//! flight, classifies failures as retryable or not, and retries with
//! exponential backoff. The watchdog is the only retrying layer in the
//! stack; callers above it decide escalation, callers below it just fail.

pub mod classify;
pub mod config;
pub mod error;
pub mod supervisor;

pub use classify::{classify, classify_message, ClassifyFailure, FailureClass};
pub use config::WatchdogConfig;
pub use error::WatchdogError;
pub use supervisor::{LogObserver, RunOptions, Watchdog, WatchdogNotice, WatchdogObserver};
