//! Uid-to-DOM resolution.

use serde_json::json;
use tracing::trace;

use crate::cdp::CdpError;
use crate::error::ActionError;
use crate::snapshot::SnapshotOptions;

use super::ActionExecutor;

/// A snapshot uid resolved to a live node.
#[derive(Debug, Clone)]
pub struct ResolvedElement {
    pub uid: String,
    pub backend_node_id: i64,
    pub object_id: String,
}

impl ActionExecutor {
    /// Resolve a uid to its live DOM node.
    ///
    /// An unknown uid (never minted in this session) is a caller mistake
    /// and fatal. A known uid that no longer resolves means the page moved
    /// on; the error carries a refreshed snapshot so the caller can
    /// re-target immediately.
    pub(crate) async fn resolve(&self, uid: &str) -> Result<ResolvedElement, ActionError> {
        let backend_node_id =
            self.snapshots
                .backend_node_id(uid)
                .ok_or_else(|| ActionError::UnknownUid {
                    uid: uid.to_string(),
                })?;

        let resolved = self
            .conn
            .call(
                "DOM.resolveNode",
                Some(json!({"backendNodeId": backend_node_id})),
            )
            .await;

        let object_id = match resolved {
            Ok(value) => value["object"]["objectId"].as_str().map(|s| s.to_string()),
            Err(CdpError::Protocol { .. }) => None,
            Err(e) => return Err(e.into()),
        };

        let object_id = match object_id {
            Some(oid) => oid,
            None => return Err(self.stale(uid).await),
        };

        // Cosmetic; never blocks or fails the action.
        let feedback = self.feedback.clone();
        tokio::spawn(async move {
            feedback.highlight_node(backend_node_id).await;
        });

        trace!("Resolved {} -> backend {}", uid, backend_node_id);
        Ok(ResolvedElement {
            uid: uid.to_string(),
            backend_node_id,
            object_id,
        })
    }

    /// Build a stale-uid error carrying a refreshed snapshot.
    pub(crate) async fn stale(&self, uid: &str) -> ActionError {
        let snapshot = self
            .snapshots
            .take_snapshot(SnapshotOptions {
                force_refresh: true,
                ..Default::default()
            })
            .await
            .unwrap_or_else(|e| format!("(snapshot unavailable: {})", e));
        ActionError::StaleUid {
            uid: uid.to_string(),
            snapshot,
        }
    }
}
