//! Accessibility tree rendering with stable element UIDs.
//!
//! Each rendered element carries a `uid=` handle that stays stable across
//! snapshots of the same page: the registry keys minted uids by
//! (frame id, AX node id), so reordered or re-fetched trees keep their
//! handles and only genuinely new nodes get new ones.

use std::collections::HashMap;

use crate::cdp::AxNode;

/// Roles that carry no semantics of their own; their children are lifted to
/// the parent's depth in compact renderings.
const STRUCTURAL_ROLES: &[&str] = &[
    "generic",
    "none",
    "presentation",
    "GenericContainer",
    "InlineTextBox",
    "LineBreak",
];

/// AX properties that describe tree plumbing rather than element state.
const SUPPRESSED_PROPERTIES: &[&str] = &[
    "hiddenRoot",
    "hidden",
    "controls",
    "labelledby",
    "describedby",
    "flowto",
    "activedescendant",
];

/// Mints and remembers element uids.
#[derive(Debug, Default)]
pub struct UidRegistry {
    next: u64,
    by_key: HashMap<(String, String), String>,
    backend_by_uid: HashMap<String, i64>,
}

impl UidRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The uid for (frame, AX node id), minting one on first sight.
    pub fn resolve_or_mint(&mut self, frame_id: &str, node_id: &str) -> String {
        let key = (frame_id.to_string(), node_id.to_string());
        if let Some(uid) = self.by_key.get(&key) {
            return uid.clone();
        }
        self.next += 1;
        let uid = format!("u{}", self.next);
        self.by_key.insert(key, uid.clone());
        uid
    }

    /// Record the backend DOM node behind a uid.
    pub fn record_backend(&mut self, uid: &str, backend_node_id: i64) {
        self.backend_by_uid.insert(uid.to_string(), backend_node_id);
    }

    /// The backend DOM node id for a uid, if known.
    pub fn backend_node_id(&self, uid: &str) -> Option<i64> {
        self.backend_by_uid.get(uid).copied()
    }

    /// Forget everything. Call when the session or document changes so
    /// handles from the old document cannot alias into the new one.
    pub fn clear(&mut self) {
        self.by_key.clear();
        self.backend_by_uid.clear();
        // Counter keeps rising so old uids never get reused.
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Render an AX tree to the indented text form.
///
/// Compact mode (the default) flattens ignored nodes and nameless
/// structural containers; verbose mode keeps every node and labels the
/// ignored ones.
pub fn render_snapshot(nodes: &[AxNode], registry: &mut UidRegistry, verbose: bool) -> String {
    let by_id: HashMap<&str, &AxNode> = nodes.iter().map(|n| (n.node_id.as_str(), n)).collect();

    let root = nodes.iter().find(|n| n.parent_id.is_none());
    let root = match root {
        Some(r) => r,
        None => return "document (no accessibility tree)".to_string(),
    };
    let root_frame = root.frame_id.clone().unwrap_or_default();

    let mut out = String::new();
    render_node(root, &by_id, registry, &root_frame, 0, verbose, &mut out);
    out
}

#[allow(clippy::too_many_arguments)]
fn render_node(
    node: &AxNode,
    by_id: &HashMap<&str, &AxNode>,
    registry: &mut UidRegistry,
    root_frame: &str,
    depth: usize,
    verbose: bool,
    out: &mut String,
) {
    let role = node.role_str();
    let name = node.name_str();

    // Compact mode lifts noise nodes out of the tree: their children render
    // at this depth, as if the node were not there.
    let flattened = !verbose
        && (node.ignored || (name.is_empty() && STRUCTURAL_ROLES.contains(&role)));

    let child_depth = if flattened {
        depth
    } else {
        let frame_id = node.frame_id.as_deref().unwrap_or(root_frame);
        let uid = registry.resolve_or_mint(frame_id, &node.node_id);
        if let Some(backend) = node.backend_dom_node_id {
            registry.record_backend(&uid, backend);
        }
        render_line(node, &uid, frame_id, root_frame, depth, out);
        depth + 1
    };

    if let Some(child_ids) = &node.child_ids {
        for child_id in child_ids {
            if let Some(child) = by_id.get(child_id.as_str()) {
                render_node(child, by_id, registry, root_frame, child_depth, verbose, out);
            }
        }
    }
}

fn render_line(
    node: &AxNode,
    uid: &str,
    frame_id: &str,
    root_frame: &str,
    depth: usize,
    out: &mut String,
) {
    for _ in 0..depth {
        out.push_str("  ");
    }
    out.push_str("uid=");
    out.push_str(uid);
    if frame_id != root_frame {
        out.push_str(" [frameId=");
        out.push_str(frame_id);
        out.push(']');
    }
    out.push(' ');
    out.push_str(node.role_str());

    let name = node.name_str();
    if !name.is_empty() {
        out.push_str(" \"");
        out.push_str(name);
        out.push('"');
    }

    // Options often expose no value of their own; the name is the value.
    let value = node.value_str();
    if !value.is_empty() {
        out.push_str(" value=");
        out.push_str(value);
    } else if node.role_str() == "option" && !name.is_empty() {
        out.push_str(" value=");
        out.push_str(name);
    }

    let desc = node.description_str();
    if !desc.is_empty() {
        out.push_str(" desc=");
        out.push_str(desc);
    }

    if node.ignored {
        out.push_str(" (ignored)");
    }

    push_capability_tokens(node, out);

    out.push('\n');
}

/// State pairs render as capability plus current state, so a caller can see
/// both that a checkbox is checkable and whether it is checked.
fn push_capability_tokens(node: &AxNode, out: &mut String) {
    let props = match &node.properties {
        Some(p) => p,
        None => return,
    };
    for prop in props {
        if SUPPRESSED_PROPERTIES.contains(&prop.name.as_str()) {
            continue;
        }
        let bool_value = prop.value.value.as_ref().and_then(serde_json::Value::as_bool);
        match (prop.name.as_str(), bool_value) {
            ("disabled", Some(v)) => {
                out.push_str(" disableable");
                if v {
                    out.push_str(" disabled");
                }
            }
            ("checked", _) => {
                out.push_str(" checkable");
                let state = prop.value.as_str();
                if state == "true" || bool_value == Some(true) {
                    out.push_str(" checked");
                }
            }
            ("selected", Some(v)) => {
                out.push_str(" selectable");
                if v {
                    out.push_str(" selected");
                }
            }
            ("expanded", Some(v)) => {
                out.push_str(" expandable");
                out.push_str(if v { " expanded" } else { " collapsed" });
            }
            ("focused", Some(v)) => {
                out.push_str(" focusable");
                if v {
                    out.push_str(" focused");
                }
            }
            ("focusable", Some(true)) => out.push_str(" focusable"),
            (name, Some(true)) => {
                out.push(' ');
                out.push_str(name);
            }
            (name, None) => {
                let text = prop.value.as_str();
                if !text.is_empty() && text != "false" {
                    out.push(' ');
                    out.push_str(name);
                    out.push('=');
                    out.push_str(text);
                }
            }
            _ => {}
        }
    }
}

/// 32-bit rolling hash over the fields that make two trees "the same page".
pub fn tree_hash(nodes: &[AxNode]) -> u32 {
    let mut h: u32 = 5381;
    let mut fold = |text: &str| {
        for b in text.bytes() {
            h = h.wrapping_mul(31).wrapping_add(b as u32);
        }
        h = h.wrapping_mul(31).wrapping_add(b'|' as u32);
    };
    for node in nodes {
        fold(&node.node_id);
        fold(node.role_str());
        fold(node.name_str());
        fold(&node.child_count().to_string());
        fold(node.value_str());
        for state in ["disabled", "checked", "selected"] {
            if node.bool_property(state) == Some(true) {
                fold(state);
            }
        }
    }
    h
}

#[cfg(test)]
#[path = "tree_tests.rs"]
mod tests;
