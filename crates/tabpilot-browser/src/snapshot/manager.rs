//! Snapshot capture and caching.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tracing::debug;

use crate::cdp::{AxNode, CdpError, ConnectionManager};

use super::tree::{render_snapshot, tree_hash, UidRegistry};

/// Options for one snapshot capture.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotOptions {
    /// Keep ignored and structural nodes, labelled.
    pub verbose: bool,
    /// Re-render even when the tree hash matches the cached document.
    pub force_refresh: bool,
}

#[derive(Default)]
struct Inner {
    registry: UidRegistry,
    cache: Option<CachedDoc>,
    hits: u64,
    misses: u64,
}

struct CachedDoc {
    document: String,
    tree_hash: u32,
    verbose: bool,
}

/// Captures accessibility snapshots and keeps uid handles stable.
///
/// The uid registry and document cache live for one attachment; a session
/// reset hook clears both so handles never leak across tabs.
pub struct SnapshotManager {
    conn: Arc<ConnectionManager>,
    inner: Arc<Mutex<Inner>>,
}

impl SnapshotManager {
    pub fn new(conn: Arc<ConnectionManager>) -> Arc<Self> {
        let inner: Arc<Mutex<Inner>> = Arc::new(Mutex::new(Inner::default()));
        {
            let inner = inner.clone();
            conn.register_session_reset_hook(move || {
                let mut guard = inner.lock();
                guard.registry.clear();
                guard.cache = None;
            });
        }
        Arc::new(Self { conn, inner })
    }

    /// Capture the current page as an indented accessibility document.
    pub async fn take_snapshot(&self, options: SnapshotOptions) -> Result<String, CdpError> {
        let nodes = self.fetch_tree().await?;
        let hash = tree_hash(&nodes);

        {
            let mut inner = self.inner.lock();
            let cached_doc = if options.force_refresh {
                None
            } else {
                inner
                    .cache
                    .as_ref()
                    .filter(|c| c.tree_hash == hash && c.verbose == options.verbose)
                    .map(|c| c.document.clone())
            };
            if let Some(document) = cached_doc {
                inner.hits += 1;
                debug!("Snapshot cache hit (hash {:08x})", hash);
                return Ok(document);
            }
            inner.misses += 1;
        }

        let document = {
            let mut inner = self.inner.lock();
            let document = render_snapshot(&nodes, &mut inner.registry, options.verbose);
            inner.cache = Some(CachedDoc {
                document: document.clone(),
                tree_hash: hash,
                verbose: options.verbose,
            });
            document
        };

        debug!(
            "Snapshot rendered: {} nodes, hash {:08x}",
            nodes.len(),
            hash
        );
        Ok(document)
    }

    /// Hash of the current tree without rendering.
    pub async fn current_hash(&self) -> Result<u32, CdpError> {
        let nodes = self.fetch_tree().await?;
        Ok(tree_hash(&nodes))
    }

    /// The backend DOM node behind a uid from an earlier snapshot.
    pub fn backend_node_id(&self, uid: &str) -> Option<i64> {
        self.inner.lock().registry.backend_node_id(uid)
    }

    /// (hits, misses) counters for the document cache.
    pub fn cache_stats(&self) -> (u64, u64) {
        let inner = self.inner.lock();
        (inner.hits, inner.misses)
    }

    async fn fetch_tree(&self) -> Result<Vec<AxNode>, CdpError> {
        let result = self
            .conn
            .call("Accessibility.getFullAXTree", Some(json!({})))
            .await?;
        let nodes = result
            .get("nodes")
            .cloned()
            .ok_or_else(|| CdpError::InvalidResponse("getFullAXTree returned no nodes".into()))?;
        Ok(serde_json::from_value(nodes)?)
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
