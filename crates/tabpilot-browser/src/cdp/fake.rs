//! Scripted in-process transport for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use super::error::CdpError;
use super::protocol::{CdpEvent, PageInfo};
use super::transport::CdpTransport;

type Handler = Box<dyn FnMut(Option<Value>) -> Result<Value, CdpError> + Send>;

/// Transport whose responses are scripted per method.
///
/// Unhandled methods succeed with `null`, so tests only script the calls
/// they care about. Every call is logged for later assertions.
pub struct FakeTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
    events_tx: broadcast::Sender<CdpEvent>,
    targets: Mutex<Vec<PageInfo>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            handlers: Mutex::new(HashMap::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
            events_tx,
            targets: Mutex::new(vec![page_info("T1", "https://example.com")]),
        })
    }

    /// Script a handler for a method.
    pub fn on(
        &self,
        method: &str,
        handler: impl FnMut(Option<Value>) -> Result<Value, CdpError> + Send + 'static,
    ) {
        self.handlers
            .lock()
            .insert(method.to_string(), Box::new(handler));
    }

    /// Script a fixed response for a method.
    pub fn on_value(&self, method: &str, value: Value) {
        self.on(method, move |_| Ok(value.clone()));
    }

    /// Emit an event as if the browser sent it.
    pub fn emit(&self, method: &str, params: Value, session_id: Option<&str>) {
        let _ = self.events_tx.send(CdpEvent {
            method: method.to_string(),
            params,
            session_id: session_id.map(|s| s.to_string()),
        });
    }

    /// How many times a method was called.
    pub fn call_count(&self, method: &str) -> usize {
        self.calls.lock().iter().filter(|(m, _)| m == method).count()
    }

    /// All recorded (method, params) pairs.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }

    /// Params of the calls to one method.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Replace the scripted target list.
    pub fn set_targets(&self, targets: Vec<PageInfo>) {
        *self.targets.lock() = targets;
    }
}

#[async_trait]
impl CdpTransport for FakeTransport {
    async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        _session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        self.calls
            .lock()
            .push((method.to_string(), params.clone().unwrap_or(Value::Null)));
        let mut handlers = self.handlers.lock();
        match handlers.get_mut(method) {
            Some(handler) => handler(params),
            None if method == "Target.attachToTarget" => {
                Ok(json!({"sessionId": "fake-session"}))
            }
            None => Ok(Value::Null),
        }
    }

    fn events(&self) -> broadcast::Receiver<CdpEvent> {
        self.events_tx.subscribe()
    }

    async fn list_targets(&self) -> Result<Vec<PageInfo>, CdpError> {
        Ok(self.targets.lock().clone())
    }

    async fn create_target(&self, url: Option<&str>) -> Result<PageInfo, CdpError> {
        let info = page_info("T-new", url.unwrap_or("about:blank"));
        self.targets.lock().push(info.clone());
        Ok(info)
    }
}

/// Build a page-typed [`PageInfo`] for tests.
pub fn page_info(id: &str, url: &str) -> PageInfo {
    PageInfo {
        id: id.to_string(),
        page_type: "page".to_string(),
        title: String::new(),
        url: url.to_string(),
        web_socket_debugger_url: None,
        dev_tools_frontend_url: None,
    }
}
