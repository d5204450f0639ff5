//! Trusted pointer input: click, drag, hover.

use serde_json::json;
use tabpilot_watchdog::classify;
use tracing::{debug, warn};

use crate::cdp::{BoxModel, CdpError};
use crate::error::ActionError;

use super::scripts;
use super::{ActionExecutor, ResolvedElement};

impl ActionExecutor {
    /// Click an element by uid.
    ///
    /// Dispatches trusted input events at the element's center. Attempts
    /// that fail retryably back off linearly and retry; once every trusted
    /// attempt is spent, an in-page synthetic click is tried, which some
    /// custom widgets accept when trusted events are swallowed. A
    /// `target=_blank` link arms a bounded wait for the popup and follows
    /// it when it appears.
    pub async fn click(&self, uid: &str, double: bool) -> Result<String, ActionError> {
        for attempt in 1..=self.config.max_click_retries {
            match self.click_physical(uid, double).await {
                Ok(note) => return Ok(note),
                Err(e) => {
                    let class = classify(&e);
                    // Stale handles must surface: only a fresh snapshot can
                    // produce a uid worth retrying with.
                    let fatal = !class.is_retryable()
                        || matches!(
                            e,
                            ActionError::StaleUid { .. } | ActionError::UnknownUid { .. }
                        );
                    if fatal {
                        return Err(e);
                    }
                    warn!("Click attempt {} failed ({:?}): {}", attempt, class, e);
                    if attempt < self.config.max_click_retries {
                        tokio::time::sleep(std::time::Duration::from_millis(
                            self.config.click_backoff_ms * attempt as u64,
                        ))
                        .await;
                    }
                }
            }
        }

        self.click_via_script(uid, double).await
    }

    async fn click_physical(&self, uid: &str, double: bool) -> Result<String, ActionError> {
        let element = self.resolve(uid).await?;
        let facts = self.describe(&element).await?;

        // Options are not hit-testable; the select swallows the point.
        if facts.tag_name == "option" {
            return self.click_via_script(uid, double).await;
        }

        self.preflight(&element).await?;

        let new_tab_wait = if facts.target == "_blank" {
            match self.conn.arm_new_tab_wait() {
                Ok(wait) => Some(wait),
                Err(CdpError::NewTabWaitBusy) => {
                    return Err(CdpError::NewTabWaitBusy.into());
                }
                Err(e) => return Err(e.into()),
            }
        } else {
            None
        };

        let (x, y) = self.element_center(&element).await?;
        let click_count: u32 = if double { 2 } else { 1 };

        self.wait
            .settle(|| async move {
                self.mouse_event("mouseMoved", x, y, "none", 0).await?;
                for n in 1..=click_count {
                    self.mouse_event("mousePressed", x, y, "left", n).await?;
                    self.mouse_event("mouseReleased", x, y, "left", n).await?;
                }
                Ok::<_, ActionError>(())
            })
            .await?;

        let mut message = if double {
            format!("Double-clicked {}", uid)
        } else {
            format!("Clicked {}", uid)
        };

        if let Some(wait) = new_tab_wait {
            match wait.wait(self.config.new_tab_timeout_ms).await {
                Some(page) => {
                    debug!("Following popup {}", page.id);
                    self.conn.switch_to_tab(&page.id, true).await?;
                    message.push_str(&format!("; opened and switched to new tab ({})", page.url));
                }
                None => {
                    debug!("No popup appeared within the wait window");
                }
            }
        }

        Ok(message)
    }

    async fn click_via_script(&self, uid: &str, double: bool) -> Result<String, ActionError> {
        let element = self.resolve(uid).await?;
        let target = &element;
        let result = self
            .wait
            .settle(|| {
                self.call_element_function(target, scripts::FALLBACK_CLICK, vec![json!(double)])
            })
            .await?;

        if result["ok"].as_bool() != Some(true) {
            let reason = result["error"].as_str().unwrap_or("synthetic click failed");
            return Err(ActionError::Failed(reason.to_string()));
        }
        Ok(format!("Clicked {} (via script fallback)", uid))
    }

    /// Drag from one element to another with interpolated moves.
    pub async fn drag(&self, from_uid: &str, to_uid: &str) -> Result<String, ActionError> {
        let from = self.resolve(from_uid).await?;
        let to = self.resolve(to_uid).await?;
        self.preflight(&from).await?;

        let (x0, y0) = self.element_center(&from).await?;
        let (x1, y1) = self.element_center(&to).await?;
        let steps = self.config.drag_steps.max(1);
        let delay = std::time::Duration::from_millis(self.config.drag_step_delay_ms);

        self.wait
            .settle(|| async move {
                self.mouse_event("mouseMoved", x0, y0, "none", 0).await?;
                self.mouse_event("mousePressed", x0, y0, "left", 1).await?;
                for i in 1..=steps {
                    let t = i as f64 / steps as f64;
                    let x = x0 + (x1 - x0) * t;
                    let y = y0 + (y1 - y0) * t;
                    self.mouse_event("mouseMoved", x, y, "left", 0).await?;
                    tokio::time::sleep(delay).await;
                }
                self.mouse_event("mouseReleased", x1, y1, "left", 1).await?;
                Ok::<_, ActionError>(())
            })
            .await?;

        Ok(format!("Dragged {} to {}", from_uid, to_uid))
    }

    /// Move the pointer over an element without pressing.
    pub async fn hover(&self, uid: &str) -> Result<String, ActionError> {
        let element = self.resolve(uid).await?;
        self.preflight(&element).await?;
        let (x, y) = self.element_center(&element).await?;

        self.mouse_event("mouseMoved", x, y, "none", 0).await?;
        // Hover menus and tooltips mutate the DOM; give them a beat.
        self.wait.wait_for_dom_stable().await;

        Ok(format!("Hovered over {}", uid))
    }

    // ------------------------------------------------------------------
    // Shared plumbing
    // ------------------------------------------------------------------

    /// Visible and enabled, or a typed error naming what never happened.
    pub(crate) async fn preflight(&self, element: &ResolvedElement) -> Result<(), ActionError> {
        let visible = self
            .wait
            .wait_for_condition(
                scripts::VISIBLE_CONDITION,
                self.config.preflight_timeout_ms,
                Some(&element.object_id),
            )
            .await?;
        if !visible {
            return Err(ActionError::NotVisible {
                uid: element.uid.clone(),
            });
        }

        let enabled = self
            .wait
            .wait_for_condition(
                scripts::ENABLED_CONDITION,
                self.config.preflight_timeout_ms,
                Some(&element.object_id),
            )
            .await?;
        if !enabled {
            return Err(ActionError::NotEnabled {
                uid: element.uid.clone(),
            });
        }
        Ok(())
    }

    /// Center of the element's content box in viewport coordinates,
    /// after scrolling it into view.
    pub(crate) async fn element_center(
        &self,
        element: &ResolvedElement,
    ) -> Result<(f64, f64), ActionError> {
        let _ = self
            .conn
            .call(
                "DOM.scrollIntoViewIfNeeded",
                Some(json!({"backendNodeId": element.backend_node_id})),
            )
            .await;

        let result = self
            .conn
            .call(
                "DOM.getBoxModel",
                Some(json!({"backendNodeId": element.backend_node_id})),
            )
            .await
            .map_err(|e| match e {
                CdpError::Protocol { .. } => ActionError::NotVisible {
                    uid: element.uid.clone(),
                },
                other => other.into(),
            })?;

        let model: BoxModel = serde_json::from_value(result["model"].clone())
            .map_err(|e| ActionError::Failed(format!("bad box model: {}", e)))?;
        Ok(quad_center(&model.content))
    }

    pub(crate) async fn mouse_event(
        &self,
        event_type: &str,
        x: f64,
        y: f64,
        button: &str,
        click_count: u32,
    ) -> Result<(), ActionError> {
        let mut params = json!({
            "type": event_type,
            "x": x,
            "y": y,
            "button": button,
        });
        if click_count > 0 {
            params["clickCount"] = json!(click_count);
        }
        self.conn.call("Input.dispatchMouseEvent", Some(params)).await?;
        Ok(())
    }

    pub(crate) async fn describe(
        &self,
        element: &ResolvedElement,
    ) -> Result<ElementFacts, ActionError> {
        let value = self
            .call_element_function(element, scripts::DESCRIBE_ELEMENT, vec![])
            .await?;
        Ok(ElementFacts {
            tag_name: value["tagName"].as_str().unwrap_or("").to_string(),
            target: value["target"].as_str().unwrap_or("").to_string(),
        })
    }

    /// Run an element-scoped function and unwrap its by-value result.
    pub(crate) async fn call_element_function(
        &self,
        element: &ResolvedElement,
        declaration: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, ActionError> {
        let arguments: Vec<_> = args.into_iter().map(|v| json!({"value": v})).collect();
        let result = self
            .conn
            .call(
                "Runtime.callFunctionOn",
                Some(json!({
                    "objectId": element.object_id,
                    "functionDeclaration": declaration,
                    "arguments": arguments,
                    "returnByValue": true,
                })),
            )
            .await?;
        crate::wait::unwrap_eval(result)
    }
}

/// What [`ActionExecutor::describe`] learns about an element.
#[derive(Debug, Clone)]
pub(crate) struct ElementFacts {
    pub tag_name: String,
    pub target: String,
}

/// Center of a CDP quad (x1 y1 x2 y2 x3 y3 x4 y4).
fn quad_center(quad: &[f64]) -> (f64, f64) {
    if quad.len() < 8 {
        return (0.0, 0.0);
    }
    let x = (quad[0] + quad[2] + quad[4] + quad[6]) / 4.0;
    let y = (quad[1] + quad[3] + quad[5] + quad[7]) / 4.0;
    (x, y)
}
