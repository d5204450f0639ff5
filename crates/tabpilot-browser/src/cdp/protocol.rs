//! CDP protocol types and message definitions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// CDP request message.
#[derive(Debug, Serialize)]
pub struct CdpRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// Raw inbound CDP message: either a response (id) or an event (method).
#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<CdpErrorResponse>,
    pub method: Option<String>,
    pub params: Option<Value>,
    #[serde(rename = "sessionId")]
    pub session_id: Option<String>,
}

/// CDP error in response.
#[derive(Debug, Deserialize)]
pub struct CdpErrorResponse {
    pub code: i64,
    pub message: String,
    pub data: Option<String>,
}

/// An inbound protocol event.
#[derive(Debug, Clone)]
pub struct CdpEvent {
    pub method: String,
    pub params: Value,
    pub session_id: Option<String>,
}

/// Target info from the Target domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    pub title: String,
    pub url: String,
    pub attached: Option<bool>,
    pub browser_context_id: Option<String>,
}

/// Page info from the /json discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub page_type: String,
    pub title: String,
    pub url: String,
    pub web_socket_debugger_url: Option<String>,
    pub dev_tools_frontend_url: Option<String>,
}

impl From<TargetInfo> for PageInfo {
    fn from(t: TargetInfo) -> Self {
        PageInfo {
            id: t.target_id,
            page_type: t.target_type,
            title: t.title,
            url: t.url,
            web_socket_debugger_url: None,
            dev_tools_frontend_url: None,
        }
    }
}

/// Browser version info.
///
/// Note: the browser returns PascalCase field names for this endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "Protocol-Version")]
    pub protocol_version: String,
    #[serde(rename = "User-Agent")]
    pub user_agent: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: String,
}

// ============================================================================
// DOM / Runtime Types
// ============================================================================

/// Box model from CDP.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxModel {
    pub content: Vec<f64>,
    pub padding: Vec<f64>,
    pub border: Vec<f64>,
    pub margin: Vec<f64>,
    pub width: i64,
    pub height: i64,
}

// ============================================================================
// Accessibility Types
// ============================================================================

/// AX node from the Accessibility domain.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    pub role: Option<AxValue>,
    pub name: Option<AxValue>,
    pub description: Option<AxValue>,
    pub value: Option<AxValue>,
    pub properties: Option<Vec<AxProperty>>,
    pub parent_id: Option<String>,
    pub child_ids: Option<Vec<String>>,
    // Not derivable from camelCase: the protocol spells out DOM.
    #[serde(rename = "backendDOMNodeId")]
    pub backend_dom_node_id: Option<i64>,
    pub frame_id: Option<String>,
}

impl AxNode {
    pub fn role_str(&self) -> &str {
        self.role.as_ref().map(AxValue::as_str).unwrap_or("")
    }

    pub fn name_str(&self) -> &str {
        self.name.as_ref().map(AxValue::as_str).unwrap_or("")
    }

    pub fn value_str(&self) -> &str {
        self.value.as_ref().map(AxValue::as_str).unwrap_or("")
    }

    pub fn description_str(&self) -> &str {
        self.description.as_ref().map(AxValue::as_str).unwrap_or("")
    }

    pub fn child_count(&self) -> usize {
        self.child_ids.as_ref().map(Vec::len).unwrap_or(0)
    }

    /// Boolean property value, if present.
    pub fn bool_property(&self, name: &str) -> Option<bool> {
        let props = self.properties.as_ref()?;
        props
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.value.as_ref())
            .and_then(Value::as_bool)
    }
}

/// AX value.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxValue {
    #[serde(rename = "type")]
    pub value_type: String,
    pub value: Option<Value>,
}

impl AxValue {
    pub fn as_str(&self) -> &str {
        self.value.as_ref().and_then(Value::as_str).unwrap_or("")
    }
}

/// AX property.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxProperty {
    pub name: String,
    pub value: AxValue,
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
