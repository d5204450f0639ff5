//! Visual feedback: element highlights and automation indicators.
//!
//! All feedback is cosmetic and best effort; a failed highlight never
//! fails the action it decorates.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, trace};

use crate::cdp::ConnectionManager;

/// Where automation shows itself to the person watching the browser.
#[async_trait]
pub trait VisualFeedback: Send + Sync {
    /// Briefly mark the element about to be acted on.
    async fn highlight_node(&self, backend_node_id: i64);

    /// Remove any active highlight.
    async fn clear_highlight(&self);

    /// Signal that automation is driving this tab.
    async fn show_automation_indicator(&self);

    /// Tell the user the automation is paused and waiting for them.
    async fn show_pause_banner(&self, reason: &str);

    /// Clear the pause banner.
    async fn hide_pause_banner(&self);
}

/// Overlay-domain implementation.
pub struct OverlayFeedback {
    conn: Arc<ConnectionManager>,
}

impl OverlayFeedback {
    pub fn new(conn: Arc<ConnectionManager>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl VisualFeedback for OverlayFeedback {
    async fn highlight_node(&self, backend_node_id: i64) {
        let result = self
            .conn
            .call(
                "Overlay.highlightNode",
                Some(json!({
                    "backendNodeId": backend_node_id,
                    "highlightConfig": {
                        "contentColor": {"r": 111, "g": 168, "b": 220, "a": 0.4},
                        "borderColor": {"r": 111, "g": 168, "b": 220, "a": 0.9},
                    },
                })),
            )
            .await;
        if let Err(e) = result {
            trace!("Highlight failed: {}", e);
        }
    }

    async fn clear_highlight(&self) {
        let _ = self.conn.call("Overlay.hideHighlight", None).await;
    }

    async fn show_automation_indicator(&self) {
        // Rendering of the indicator itself belongs to the embedding UI.
        debug!("Automation active on this tab");
    }

    async fn show_pause_banner(&self, reason: &str) {
        debug!("Automation paused: {}", reason);
    }

    async fn hide_pause_banner(&self) {
        debug!("Automation resumed");
    }
}

/// Feedback sink that does nothing. For headless runs and tests.
pub struct NoopFeedback;

#[async_trait]
impl VisualFeedback for NoopFeedback {
    async fn highlight_node(&self, _backend_node_id: i64) {}
    async fn clear_highlight(&self) {}
    async fn show_automation_indicator(&self) {}
    async fn show_pause_banner(&self, _reason: &str) {}
    async fn hide_pause_banner(&self) {}
}
