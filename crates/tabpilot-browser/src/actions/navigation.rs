//! Navigation and tab-surface actions.

use base64::Engine;
use serde_json::json;
use tracing::debug;

use crate::cdp::PageInfo;
use crate::error::ActionError;

use super::ActionExecutor;

impl ActionExecutor {
    /// Navigate the attached tab to a URL.
    pub async fn navigate(&self, url: &str) -> Result<String, ActionError> {
        url::Url::parse(url).map_err(|e| ActionError::NavigationFailed(format!("{}: {}", url, e)))?;

        let result = self
            .wait
            .settle(|| async move {
                self.conn
                    .call("Page.navigate", Some(json!({"url": url})))
                    .await
            })
            .await?;

        if let Some(error_text) = result["errorText"].as_str() {
            if !error_text.is_empty() {
                return Err(ActionError::NavigationFailed(format!(
                    "{}: {}",
                    url, error_text
                )));
            }
        }
        Ok(format!("Navigated to {}", url))
    }

    /// Go back one entry in this tab's history.
    pub async fn go_back(&self) -> Result<String, ActionError> {
        self.traverse_history(-1).await?;
        Ok("Went back".to_string())
    }

    /// Go forward one entry in this tab's history.
    pub async fn go_forward(&self) -> Result<String, ActionError> {
        self.traverse_history(1).await?;
        Ok("Went forward".to_string())
    }

    async fn traverse_history(&self, delta: i64) -> Result<(), ActionError> {
        let history = self.conn.call("Page.getNavigationHistory", None).await?;
        let current = history["currentIndex"].as_i64().unwrap_or(0);
        let entries = history["entries"].as_array().cloned().unwrap_or_default();

        let index = current + delta;
        if index < 0 || index as usize >= entries.len() {
            return Err(ActionError::NavigationFailed(if delta < 0 {
                "already at the oldest history entry".to_string()
            } else {
                "already at the newest history entry".to_string()
            }));
        }

        let entry_id = entries[index as usize]["id"]
            .as_i64()
            .ok_or_else(|| ActionError::Failed("history entry without id".into()))?;

        self.wait
            .settle(|| async move {
                self.conn
                    .call(
                        "Page.navigateToHistoryEntry",
                        Some(json!({"entryId": entry_id})),
                    )
                    .await
            })
            .await?;
        Ok(())
    }

    /// Reload the attached tab.
    pub async fn reload(&self) -> Result<String, ActionError> {
        self.wait
            .settle(|| async move { self.conn.call("Page.reload", None).await })
            .await?;
        Ok("Reloaded".to_string())
    }

    /// Capture the viewport as PNG bytes.
    pub async fn screenshot(&self) -> Result<Vec<u8>, ActionError> {
        let result = self
            .conn
            .call(
                "Page.captureScreenshot",
                Some(json!({"format": "png"})),
            )
            .await?;
        let data = result["data"]
            .as_str()
            .ok_or_else(|| ActionError::Failed("screenshot returned no data".into()))?;
        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| ActionError::Failed(format!("bad screenshot payload: {}", e)))
    }

    // ------------------------------------------------------------------
    // Tab surface
    // ------------------------------------------------------------------

    /// List open tabs, marking the attached one.
    pub async fn list_tabs(&self) -> Result<String, ActionError> {
        let tabs = self.conn.list_tabs().await?;
        let attached = self.conn.attached_target();

        let mut out = String::new();
        for tab in &tabs {
            let marker = if attached.as_deref() == Some(tab.id.as_str()) {
                "* "
            } else {
                "  "
            };
            out.push_str(&format!("{}[{}] {} - {}\n", marker, tab.id, tab.title, tab.url));
        }
        if out.is_empty() {
            out.push_str("(no open tabs)");
        }
        Ok(out)
    }

    /// Open a new tab and attach to it.
    pub async fn open_tab(&self, url: Option<&str>) -> Result<String, ActionError> {
        if let Some(u) = url {
            url::Url::parse(u)
                .map_err(|e| ActionError::NavigationFailed(format!("{}: {}", u, e)))?;
        }
        let page = self.conn.open_tab(url).await?;
        debug!("Opened tab {}", page.id);
        Ok(format!("Opened new tab [{}] {}", page.id, page.url))
    }

    /// Close a tab by id, falling back to the previous tab when the
    /// attached one goes away.
    pub async fn close_tab(&self, target_id: &str) -> Result<String, ActionError> {
        let was_attached = self.conn.attached_target().as_deref() == Some(target_id);
        self.conn.close_tab(target_id).await?;
        if was_attached {
            if let Some(previous) = self.conn.return_to_previous().await? {
                return Ok(format!(
                    "Closed tab [{}]; returned to [{}]",
                    target_id, previous
                ));
            }
        }
        Ok(format!("Closed tab [{}]", target_id))
    }

    /// Attach to a tab by id.
    pub async fn select_tab(&self, target_id: &str) -> Result<String, ActionError> {
        let attached = self.conn.switch_to_tab(target_id, true).await?;
        if attached {
            Ok(format!("Switched to tab [{}]", target_id))
        } else {
            Ok(format!(
                "Tab [{}] is restricted; switched without debugger attachment",
                target_id
            ))
        }
    }

    /// Page info for the attached tab, if it can be found.
    pub async fn current_page(&self) -> Result<Option<PageInfo>, ActionError> {
        let attached = match self.conn.attached_target() {
            Some(id) => id,
            None => return Ok(None),
        };
        let tabs = self.conn.list_tabs().await?;
        Ok(tabs.into_iter().find(|t| t.id == attached))
    }
}
