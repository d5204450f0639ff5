//! Accessibility snapshots with stable element handles.

pub mod manager;
pub mod tree;

pub use manager::{SnapshotManager, SnapshotOptions};
pub use tree::{render_snapshot, tree_hash, UidRegistry};
