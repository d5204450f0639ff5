//! Connection lifecycle: attachment, event dispatch, tab stack, tracing.
//!
//! One [`ConnectionManager`] owns at most one debugger attachment at a time.
//! Attach is idempotent; commands are always issued through the attached
//! session. A background dispatcher consumes transport events to keep the
//! tab stack in sync with target destruction, feed new-tab waiters, and
//! collect trace chunks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, trace, warn};

use super::error::CdpError;
use super::protocol::{CdpEvent, PageInfo};
use super::transport::CdpTransport;

/// Domains enabled on every fresh attachment.
const SESSION_DOMAINS: &[&str] = &[
    "Page.enable",
    "DOM.enable",
    "Runtime.enable",
    "Network.enable",
    "Log.enable",
    "Audits.enable",
    "Accessibility.enable",
    "Overlay.enable",
];

/// The currently attached target/session pair.
#[derive(Debug, Clone)]
struct Attachment {
    target_id: String,
    session_id: String,
}

/// Hook run whenever the attached session changes or is lost.
type SessionResetHook = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    attachment: RwLock<Option<Attachment>>,
    /// Previously attached target ids, most recent last.
    tab_stack: Mutex<Vec<String>>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<CdpEvent>>>,
    next_subscriber_id: AtomicU64,
    reset_hooks: Mutex<Vec<SessionResetHook>>,
    /// At most one outstanding new-tab waiter.
    new_tab_waiter: Mutex<Option<oneshot::Sender<PageInfo>>>,
    trace_buffer: Mutex<Vec<Value>>,
    trace_complete: Notify,
}

impl Shared {
    fn run_reset_hooks(&self) {
        let hooks = self.reset_hooks.lock();
        for hook in hooks.iter() {
            hook();
        }
    }
}

/// Subscription to session events. Unregisters on drop.
pub struct EventSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<CdpEvent>,
    shared: Arc<Shared>,
}

impl EventSubscription {
    /// Receive the next event, or `None` when the dispatcher has gone away.
    pub async fn recv(&mut self) -> Option<CdpEvent> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<CdpEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.shared.subscribers.lock().remove(&self.id);
    }
}

/// Armed wait for the next page target the browser creates.
pub struct NewTabWait {
    rx: oneshot::Receiver<PageInfo>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for NewTabWait {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewTabWait").finish_non_exhaustive()
    }
}

impl NewTabWait {
    /// Wait up to `timeout_ms` for a new page target.
    pub async fn wait(self, timeout_ms: u64) -> Option<PageInfo> {
        let result =
            tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), self.rx).await;
        // Disarm regardless of outcome so a later arm succeeds.
        self.shared.new_tab_waiter.lock().take();
        match result {
            Ok(Ok(info)) => Some(info),
            _ => None,
        }
    }
}

/// Manages the debugger connection to one browser.
pub struct ConnectionManager {
    transport: Arc<dyn CdpTransport>,
    shared: Arc<Shared>,
    _dispatch_task: tokio::task::JoinHandle<()>,
}

impl ConnectionManager {
    /// Wrap a transport and start the event dispatcher.
    pub async fn new(transport: Arc<dyn CdpTransport>) -> Result<Arc<Self>, CdpError> {
        let shared = Arc::new(Shared {
            attachment: RwLock::new(None),
            tab_stack: Mutex::new(Vec::new()),
            subscribers: Mutex::new(HashMap::new()),
            next_subscriber_id: AtomicU64::new(1),
            reset_hooks: Mutex::new(Vec::new()),
            new_tab_waiter: Mutex::new(None),
            trace_buffer: Mutex::new(Vec::new()),
            trace_complete: Notify::new(),
        });

        // Target lifecycle events arrive only with discovery on.
        transport
            .call(
                "Target.setDiscoverTargets",
                Some(json!({"discover": true})),
                None,
            )
            .await?;

        let dispatch_task = {
            let shared = shared.clone();
            let mut events = transport.events();
            tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(event) => Self::dispatch_event(&shared, event),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            warn!("Event dispatcher lagged, dropped {} events", n);
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            })
        };

        Ok(Arc::new(Self {
            transport,
            shared,
            _dispatch_task: dispatch_task,
        }))
    }

    fn dispatch_event(shared: &Arc<Shared>, event: CdpEvent) {
        match event.method.as_str() {
            "Target.targetCreated" => {
                if event.params["targetInfo"]["type"] == "page" {
                    // Parse before consuming the waiter so a malformed
                    // payload leaves it armed for the real target.
                    if let Ok(info) = serde_json::from_value::<super::protocol::TargetInfo>(
                        event.params["targetInfo"].clone(),
                    ) {
                        if let Some(waiter) = shared.new_tab_waiter.lock().take() {
                            debug!("New page target created: {}", info.target_id);
                            let _ = waiter.send(info.into());
                        }
                    }
                }
            }
            "Target.targetDestroyed" => {
                if let Some(target_id) = event.params["targetId"].as_str() {
                    shared.tab_stack.lock().retain(|id| id != target_id);
                    let was_attached = shared
                        .attachment
                        .read()
                        .as_ref()
                        .map(|a| a.target_id == target_id)
                        .unwrap_or(false);
                    if was_attached {
                        debug!("Attached target {} destroyed", target_id);
                        *shared.attachment.write() = None;
                        shared.run_reset_hooks();
                    }
                }
            }
            "Tracing.dataCollected" => {
                if let Some(chunks) = event.params["value"].as_array() {
                    shared.trace_buffer.lock().extend(chunks.iter().cloned());
                }
            }
            "Tracing.tracingComplete" => {
                shared.trace_complete.notify_one();
            }
            _ => {}
        }

        // Session-scoped events flow to subscribers of the attached session.
        let for_attached = match &event.session_id {
            Some(sid) => shared
                .attachment
                .read()
                .as_ref()
                .map(|a| &a.session_id == sid)
                .unwrap_or(false),
            None => false,
        };
        if for_attached {
            trace!("Session event: {}", event.method);
            let mut subscribers = shared.subscribers.lock();
            subscribers.retain(|_, tx| tx.send(event.clone()).is_ok());
        }
    }

    /// Attach the debugger to a target.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when the browser refuses
    /// attachment (restricted pages such as the web store or internal URLs);
    /// the caller can still use discovery-level operations on such pages.
    /// Attaching to the already-attached target is a no-op.
    pub async fn attach(&self, target_id: &str) -> Result<bool, CdpError> {
        if let Some(att) = self.shared.attachment.read().as_ref() {
            if att.target_id == target_id {
                return Ok(true);
            }
        }

        // Single-attachment discipline: release the old session first.
        if self.attached() {
            self.detach().await;
        }

        let result = self
            .transport
            .call(
                "Target.attachToTarget",
                Some(json!({"targetId": target_id, "flatten": true})),
                None,
            )
            .await;

        let session_id = match result {
            Ok(value) => value["sessionId"]
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| {
                    CdpError::InvalidResponse("attachToTarget returned no sessionId".into())
                })?,
            Err(CdpError::Protocol { code, message }) => {
                debug!(
                    "Attach to {} refused ({}): {}; treating as restricted page",
                    target_id, code, message
                );
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        debug!("Attached to target {} (session {})", target_id, session_id);
        *self.shared.attachment.write() = Some(Attachment {
            target_id: target_id.to_string(),
            session_id: session_id.clone(),
        });
        self.shared.run_reset_hooks();

        for method in SESSION_DOMAINS {
            if let Err(e) = self
                .transport
                .call(method, None, Some(&session_id))
                .await
            {
                // Some domains are unavailable on some targets.
                warn!("Failed to enable {}: {}", method, e);
            }
        }

        Ok(true)
    }

    /// Detach from the current target, if any. Best effort.
    pub async fn detach(&self) {
        let attachment = self.shared.attachment.write().take();
        if let Some(att) = attachment {
            debug!("Detaching from target {}", att.target_id);
            let _ = self
                .transport
                .call(
                    "Target.detachFromTarget",
                    Some(json!({"sessionId": att.session_id})),
                    None,
                )
                .await;
            self.shared.run_reset_hooks();
            self.shared.trace_buffer.lock().clear();
        }
    }

    /// Whether a target is currently attached.
    pub fn attached(&self) -> bool {
        self.shared.attachment.read().is_some()
    }

    /// The attached target id, if any.
    pub fn attached_target(&self) -> Option<String> {
        self.shared
            .attachment
            .read()
            .as_ref()
            .map(|a| a.target_id.clone())
    }

    /// Issue a command within the attached session.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        let session_id = self
            .shared
            .attachment
            .read()
            .as_ref()
            .map(|a| a.session_id.clone())
            .ok_or(CdpError::NotAttached)?;
        self.transport.call(method, params, Some(&session_id)).await
    }

    /// Issue a browser-level command (no session).
    pub async fn call_browser(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, CdpError> {
        self.transport.call(method, params, None).await
    }

    /// Subscribe to events of the attached session.
    pub fn subscribe(&self) -> EventSubscription {
        let id = self.shared.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().insert(id, tx);
        EventSubscription {
            id,
            rx,
            shared: self.shared.clone(),
        }
    }

    /// Register a hook run whenever the attached session changes or is lost.
    ///
    /// Used by per-session caches to drop state that is only valid within
    /// one attachment.
    pub fn register_session_reset_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.shared.reset_hooks.lock().push(Arc::new(hook));
    }

    // ------------------------------------------------------------------
    // Tab management
    // ------------------------------------------------------------------

    /// List page targets.
    pub async fn list_tabs(&self) -> Result<Vec<PageInfo>, CdpError> {
        let pages = self.transport.list_targets().await?;
        Ok(pages
            .into_iter()
            .filter(|p| p.page_type == "page")
            .collect())
    }

    /// Open a new tab and attach to it.
    pub async fn open_tab(&self, url: Option<&str>) -> Result<PageInfo, CdpError> {
        let page = self.transport.create_target(url).await?;
        self.switch_to_tab(&page.id, true).await?;
        Ok(page)
    }

    /// Close a tab. Closing the attached tab detaches first.
    pub async fn close_tab(&self, target_id: &str) -> Result<(), CdpError> {
        if self.attached_target().as_deref() == Some(target_id) {
            self.detach().await;
        }
        self.shared.tab_stack.lock().retain(|id| id != target_id);
        self.transport
            .call(
                "Target.closeTarget",
                Some(json!({"targetId": target_id})),
                None,
            )
            .await?;
        Ok(())
    }

    /// Attach to a tab, optionally remembering the current one for
    /// [`Self::return_to_previous`].
    pub async fn switch_to_tab(
        &self,
        target_id: &str,
        push_current: bool,
    ) -> Result<bool, CdpError> {
        if push_current {
            if let Some(current) = self.attached_target() {
                if current != target_id {
                    self.shared.tab_stack.lock().push(current);
                }
            }
        }
        let attached = self.attach(target_id).await?;
        if attached {
            // Bring it to the foreground so the user sees what automation sees.
            let _ = self
                .transport
                .call(
                    "Target.activateTarget",
                    Some(json!({"targetId": target_id})),
                    None,
                )
                .await;
        }
        Ok(attached)
    }

    /// Return to the most recently stacked tab, if one survives.
    pub async fn return_to_previous(&self) -> Result<Option<String>, CdpError> {
        let previous = self.shared.tab_stack.lock().pop();
        match previous {
            Some(target_id) => {
                self.switch_to_tab(&target_id, false).await?;
                Ok(Some(target_id))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // New-tab waits
    // ------------------------------------------------------------------

    /// Arm a wait for the next page target the browser creates.
    ///
    /// Only one wait may be outstanding; a second arm fails with
    /// [`CdpError::NewTabWaitBusy`].
    pub fn arm_new_tab_wait(&self) -> Result<NewTabWait, CdpError> {
        let mut slot = self.shared.new_tab_waiter.lock();
        if slot.is_some() {
            return Err(CdpError::NewTabWaitBusy);
        }
        let (tx, rx) = oneshot::channel();
        *slot = Some(tx);
        Ok(NewTabWait {
            rx,
            shared: self.shared.clone(),
        })
    }

    /// Arm and wait in one call.
    pub async fn wait_for_new_tab(&self, timeout_ms: u64) -> Result<Option<PageInfo>, CdpError> {
        let wait = self.arm_new_tab_wait()?;
        Ok(wait.wait(timeout_ms).await)
    }

    // ------------------------------------------------------------------
    // Performance tracing
    // ------------------------------------------------------------------

    /// Begin collecting a performance trace on the attached session.
    pub async fn start_trace(&self) -> Result<(), CdpError> {
        self.shared.trace_buffer.lock().clear();
        self.call(
            "Tracing.start",
            Some(json!({
                "categories": "devtools.timeline,disabled-by-default-devtools.timeline",
                "transferMode": "ReportEvents",
            })),
        )
        .await?;
        Ok(())
    }

    /// Stop tracing and return the collected events.
    pub async fn end_trace(&self, timeout_ms: u64) -> Result<Vec<Value>, CdpError> {
        self.call("Tracing.end", None).await?;
        let notified = self.shared.trace_complete.notified();
        if tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), notified)
            .await
            .is_err()
        {
            warn!("Trace completion not signalled within {}ms", timeout_ms);
        }
        Ok(std::mem::take(&mut *self.shared.trace_buffer.lock()))
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self._dispatch_task.abort();
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
