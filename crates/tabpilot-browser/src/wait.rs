//! Post-action settling: navigation detection, DOM quiescence, polled
//! conditions.
//!
//! Every page mutation runs through [`WaitCoordinator::settle`] so callers
//! see the page after its consequences, not before.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::cdp::{CdpError, ConnectionManager};
use crate::error::ActionError;

/// Installed once per document; stamps the time of the last DOM mutation.
const MUTATION_PROBE_JS: &str = r#"
(() => {
    if (window.__tabpilotMutations) return true;
    window.__tabpilotMutations = { last: Date.now() };
    const observer = new MutationObserver(() => {
        window.__tabpilotMutations.last = Date.now();
    });
    observer.observe(document.documentElement, {
        childList: true, subtree: true, attributes: true, characterData: true
    });
    return true;
})()
"#;

/// Timing knobs for settling.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Fallback settle when no event stream is available.
    pub grace_ms: u64,
    /// Window after an action in which a navigation start is attributed
    /// to it.
    pub nav_start_window_ms: u64,
    /// Upper bound on waiting for a started navigation to complete.
    pub nav_complete_timeout_ms: u64,
    /// DOM must be mutation-free for this long to count as stable.
    pub dom_stable_ms: u64,
    /// Give up waiting for stability after this long.
    pub dom_stable_max_ms: u64,
    /// Poll cadence for condition and stability checks.
    pub poll_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            grace_ms: 2_000,
            nav_start_window_ms: 500,
            nav_complete_timeout_ms: 10_000,
            dom_stable_ms: 500,
            dom_stable_max_ms: 5_000,
            poll_ms: 100,
        }
    }
}

/// Coordinates waits against one connection.
pub struct WaitCoordinator {
    conn: Arc<ConnectionManager>,
    config: WaitConfig,
}

impl WaitCoordinator {
    pub fn new(conn: Arc<ConnectionManager>, config: WaitConfig) -> Self {
        Self { conn, config }
    }

    pub fn config(&self) -> &WaitConfig {
        &self.config
    }

    /// Run an action and wait for its consequences to land.
    ///
    /// Watches for a navigation starting shortly after the action; if one
    /// starts, waits (bounded) for it to complete, then for the DOM to go
    /// quiet. Without an attachment this degrades to a fixed grace sleep.
    pub async fn settle<T, E, F, Fut>(&self, action: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if !self.conn.attached() {
            let result = action().await?;
            tokio::time::sleep(Duration::from_millis(self.config.grace_ms)).await;
            return Ok(result);
        }

        let mut events = self.conn.subscribe();
        let result = action().await?;

        // Did the action start a navigation?
        let window = Duration::from_millis(self.config.nav_start_window_ms);
        let deadline = Instant::now() + window;
        let mut navigating = false;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match tokio::time::timeout(remaining, events.recv()).await {
                Ok(Some(event)) => match event.method.as_str() {
                    "Page.frameStartedNavigating" | "Page.frameStartedLoading" => {
                        debug!("Navigation started after action");
                        navigating = true;
                        break;
                    }
                    "Page.navigatedWithinDocument" => {
                        trace!("Same-document navigation after action");
                        break;
                    }
                    _ => {}
                },
                Ok(None) => break,
                Err(_) => break,
            }
        }

        if navigating {
            let complete = Duration::from_millis(self.config.nav_complete_timeout_ms);
            let deadline = Instant::now() + complete;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(
                        "Navigation did not complete within {}ms; continuing",
                        self.config.nav_complete_timeout_ms
                    );
                    break;
                }
                match tokio::time::timeout(remaining, events.recv()).await {
                    Ok(Some(event)) => match event.method.as_str() {
                        "Page.loadEventFired" | "Page.navigatedWithinDocument" => {
                            debug!("Navigation complete");
                            break;
                        }
                        _ => {}
                    },
                    Ok(None) => break,
                    Err(_) => break,
                }
            }
        }

        self.wait_for_dom_stable().await;
        Ok(result)
    }

    /// Wait until the DOM has been mutation-free for `dom_stable_ms`,
    /// bounded by `dom_stable_max_ms`. Best effort: probe failures (e.g.
    /// mid-navigation contexts) end the wait rather than the action.
    pub async fn wait_for_dom_stable(&self) {
        if self.install_mutation_probe().await.is_err() {
            tokio::time::sleep(Duration::from_millis(self.config.dom_stable_ms)).await;
            return;
        }

        let deadline = Instant::now() + Duration::from_millis(self.config.dom_stable_max_ms);
        let check = format!(
            "window.__tabpilotMutations && (Date.now() - window.__tabpilotMutations.last >= {})",
            self.config.dom_stable_ms
        );
        loop {
            match self.eval_bool(&check).await {
                Ok(true) => {
                    trace!("DOM stable");
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    // Document likely replaced under us; reinstall next poll.
                    trace!("Stability probe failed: {}", e);
                    let _ = self.install_mutation_probe().await;
                }
            }
            if Instant::now() >= deadline {
                debug!(
                    "DOM did not settle within {}ms; continuing",
                    self.config.dom_stable_max_ms
                );
                return;
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_ms)).await;
        }
    }

    /// Poll a JS expression until it is truthy or the timeout lapses.
    ///
    /// With an `object_id` the expression is evaluated with `el` bound to
    /// that remote object. Evaluation errors count as false.
    pub async fn wait_for_condition(
        &self,
        expression: &str,
        timeout_ms: u64,
        object_id: Option<&str>,
    ) -> Result<bool, ActionError> {
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let truthy = match object_id {
                Some(oid) => self.eval_bool_on(expression, oid).await,
                None => self.eval_bool(expression).await,
            };
            match truthy {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(CdpError::NotAttached) => return Err(CdpError::NotAttached.into()),
                Err(e) => trace!("Condition poll failed: {}", e),
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_millis(self.config.poll_ms)).await;
        }
    }

    /// Wait until in-flight request count stays at or below `threshold`
    /// for `idle_ms`. Returns false when the timeout lapses first.
    pub async fn wait_for_network_idle(
        &self,
        threshold: usize,
        timeout_ms: u64,
        idle_ms: u64,
    ) -> bool {
        let mut events = self.conn.subscribe();
        let mut in_flight: std::collections::HashSet<String> = std::collections::HashSet::new();
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        let mut idle_since = Some(Instant::now());

        loop {
            if let Some(since) = idle_since {
                if since.elapsed() >= Duration::from_millis(idle_ms) {
                    return true;
                }
            }
            if Instant::now() >= deadline {
                return false;
            }

            let poll = Duration::from_millis(self.config.poll_ms);
            match tokio::time::timeout(poll, events.recv()).await {
                Ok(Some(event)) => {
                    let request_id = event.params["requestId"].as_str().map(|s| s.to_string());
                    match (event.method.as_str(), request_id) {
                        ("Network.requestWillBeSent", Some(id)) => {
                            in_flight.insert(id);
                        }
                        ("Network.loadingFinished" | "Network.loadingFailed", Some(id)) => {
                            in_flight.remove(&id);
                        }
                        _ => {}
                    }
                    idle_since = if in_flight.len() <= threshold {
                        idle_since.or_else(|| Some(Instant::now()))
                    } else {
                        None
                    };
                }
                Ok(None) => return false,
                Err(_) => {
                    // No traffic this poll; idle clock keeps running.
                    if idle_since.is_none() && in_flight.len() <= threshold {
                        idle_since = Some(Instant::now());
                    }
                }
            }
        }
    }

    async fn install_mutation_probe(&self) -> Result<(), CdpError> {
        self.conn
            .call(
                "Runtime.evaluate",
                Some(json!({"expression": MUTATION_PROBE_JS, "returnByValue": true})),
            )
            .await?;
        Ok(())
    }

    async fn eval_bool(&self, expression: &str) -> Result<bool, CdpError> {
        let wrapped = format!("!!({})", expression);
        let result = self
            .conn
            .call(
                "Runtime.evaluate",
                Some(json!({"expression": wrapped, "returnByValue": true})),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(CdpError::InvalidResponse(details["text"].to_string()));
        }
        Ok(result["result"]["value"].as_bool().unwrap_or(false))
    }

    async fn eval_bool_on(&self, expression: &str, object_id: &str) -> Result<bool, CdpError> {
        let declaration = format!(
            "function() {{ const el = this; return !!({}); }}",
            expression
        );
        let result = self
            .conn
            .call(
                "Runtime.callFunctionOn",
                Some(json!({
                    "objectId": object_id,
                    "functionDeclaration": declaration,
                    "returnByValue": true,
                })),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            return Err(CdpError::InvalidResponse(details["text"].to_string()));
        }
        Ok(result["result"]["value"].as_bool().unwrap_or(false))
    }
}

/// Extract a value-bearing evaluate result or surface its exception.
pub(crate) fn unwrap_eval(result: Value) -> Result<Value, ActionError> {
    if let Some(details) = result.get("exceptionDetails") {
        let text = details["exception"]["description"]
            .as_str()
            .or_else(|| details["text"].as_str())
            .unwrap_or("script threw");
        return Err(ActionError::Script(text.to_string()));
    }
    Ok(result["result"]["value"].clone())
}

#[cfg(test)]
#[path = "wait_tests.rs"]
mod tests;
