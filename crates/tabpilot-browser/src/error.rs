//! Action-level errors.
//!
//! These carry enough context for two consumers: the text surface shown to
//! the caller (stale-handle errors embed a refreshed snapshot so the caller
//! can re-target without another round trip) and the failure classifier
//! driving retry decisions.

use tabpilot_watchdog::{ClassifyFailure, FailureClass};
use thiserror::Error;

use crate::cdp::CdpError;

/// Errors from executing a page action.
#[derive(Debug, Error)]
pub enum ActionError {
    /// Underlying protocol failure.
    #[error(transparent)]
    Cdp(#[from] CdpError),

    /// The uid was never minted by a snapshot of this session.
    #[error("Unknown element uid: {uid}. Take a snapshot first")]
    UnknownUid { uid: String },

    /// The uid is known but its node no longer resolves; the page changed.
    #[error("Element {uid} is stale; the page has changed. Current page:\n{snapshot}")]
    StaleUid { uid: String, snapshot: String },

    /// The element never became visible.
    #[error("Element {uid} is not visible")]
    NotVisible { uid: String },

    /// The element is disabled.
    #[error("Element {uid} is not enabled")]
    NotEnabled { uid: String },

    /// Another element intercepts the interaction point.
    #[error("Element {uid} is not interactable: {reason}")]
    NotInteractable { uid: String, reason: String },

    /// Named key has no mapping.
    #[error("Unsupported key: {0}")]
    UnsupportedKey(String),

    /// A wait ran out of time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Navigation reported a browser-side error.
    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// In-page script reported a failure.
    #[error("Script error: {0}")]
    Script(String),

    /// Catch-all with a caller-facing message.
    #[error("{0}")]
    Failed(String),
}

impl ClassifyFailure for ActionError {
    fn failure_class(&self) -> Option<FailureClass> {
        match self {
            ActionError::UnknownUid { .. } => Some(FailureClass::NonRetryable),
            ActionError::StaleUid { .. } => Some(FailureClass::StaleContext),
            ActionError::NotVisible { .. } | ActionError::NotInteractable { .. } => {
                Some(FailureClass::ElementInteraction)
            }
            ActionError::NotEnabled { .. } => Some(FailureClass::NonRetryable),
            ActionError::UnsupportedKey(_) => Some(FailureClass::NonRetryable),
            ActionError::Timeout(_) => Some(FailureClass::Timeout),
            ActionError::Cdp(CdpError::Timeout(_)) => Some(FailureClass::Timeout),
            ActionError::Cdp(CdpError::NotAttached | CdpError::SessionClosed) => {
                Some(FailureClass::StaleContext)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pinned_classes() {
        let err = ActionError::UnknownUid { uid: "u9".into() };
        assert_eq!(err.failure_class(), Some(FailureClass::NonRetryable));

        let err = ActionError::StaleUid {
            uid: "u9".into(),
            snapshot: "doc".into(),
        };
        assert_eq!(err.failure_class(), Some(FailureClass::StaleContext));

        let err = ActionError::NotInteractable {
            uid: "u9".into(),
            reason: "obscured".into(),
        };
        assert_eq!(err.failure_class(), Some(FailureClass::ElementInteraction));

        // Unpinned errors defer to message classification.
        let err = ActionError::NavigationFailed("net::ERR_ABORTED".into());
        assert!(err.failure_class().is_none());
    }

    #[test]
    fn test_stale_uid_message_embeds_snapshot() {
        let err = ActionError::StaleUid {
            uid: "u3".into(),
            snapshot: "uid=u9 button \"Save\"".into(),
        };
        let text = err.to_string();
        assert!(text.contains("u3"));
        assert!(text.contains("uid=u9 button \"Save\""));
    }
}
