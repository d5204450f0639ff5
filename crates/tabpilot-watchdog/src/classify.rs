//! Failure classification.

use std::fmt::Display;

/// How a failed attempt should be treated by the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Watchdog deadline exceeded. Always retryable.
    Timeout,
    /// Connection-level failure.
    Network,
    /// A UID or remote object reference went stale.
    StaleContext,
    /// Element is present but could not be interacted with.
    ElementInteraction,
    /// Matched the curated retryable keyword set.
    Retryable,
    /// Unclassified. No retry will help.
    NonRetryable,
}

impl FailureClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FailureClass::NonRetryable)
    }
}

/// Lets a domain error pin its own class instead of going through message
/// matching (e.g. a genuinely missing UID is non-retryable no matter what
/// its message says).
pub trait ClassifyFailure {
    fn failure_class(&self) -> Option<FailureClass> {
        None
    }
}

/// Keywords that make an otherwise unclassified failure retryable.
const RETRYABLE_KEYWORDS: &[&str] = &[
    "timeout",
    "network",
    "not found",
    "not visible",
    "not interactable",
    "navigation",
    "load",
    "stale",
    "temporarily unavailable",
];

/// Classify a failure by its message text.
pub fn classify_message(message: &str) -> FailureClass {
    let m = message.to_ascii_lowercase();

    if m.contains("network") || m.contains("connection") {
        FailureClass::Network
    } else if m.contains("stale") || m.contains("detached") {
        FailureClass::StaleContext
    } else if m.contains("intercept") || m.contains("not interactable") {
        FailureClass::ElementInteraction
    } else if RETRYABLE_KEYWORDS.iter().any(|k| m.contains(k)) {
        FailureClass::Retryable
    } else {
        FailureClass::NonRetryable
    }
}

/// Classify an error, preferring its pinned class over message matching.
pub fn classify<E: Display + ClassifyFailure>(err: &E) -> FailureClass {
    err.failure_class()
        .unwrap_or_else(|| classify_message(&err.to_string()))
}
