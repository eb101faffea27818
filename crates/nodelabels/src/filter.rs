//! # Node Filter
//!
//! Pure selection helpers over node snapshots.
//!
//! - A node is a **member** when its labels contain the managed key mapped to
//!   exactly the managed value.
//! - A node is **available** when its labels lack the managed key entirely.
//!
//! A node carrying the managed key with a different value is neither: it is
//! not counted towards the pool and it is never relabeled.

use std::collections::BTreeMap;
use std::fmt;

use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};

/// A `key=value` label pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelPredicate {
    pub key: String,
    pub value: String,
}

impl LabelPredicate {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Whether the node carries `key` mapped to exactly `value`.
    pub fn matches(&self, node: &Node) -> bool {
        node_labels(node)
            .and_then(|labels| labels.get(&self.key))
            .is_some_and(|value| *value == self.value)
    }

    /// Kubernetes label selector string (`key=value`).
    pub fn selector(&self) -> String {
        format!("{}={}", self.key, self.value)
    }
}

impl fmt::Display for LabelPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Label map of a node, if it has one.
pub fn node_labels(node: &Node) -> Option<&BTreeMap<String, String>> {
    node.metadata.labels.as_ref()
}

/// Node name, or `"<unnamed>"` for logging.
pub fn node_name(node: &Node) -> &str {
    node.metadata.name.as_deref().unwrap_or("<unnamed>")
}

pub fn is_member(node: &Node, label: &LabelPredicate) -> bool {
    label.matches(node)
}

/// Whether the node lacks `key` entirely, regardless of any value.
pub fn is_available(node: &Node, key: &str) -> bool {
    !node_labels(node).is_some_and(|labels| labels.contains_key(key))
}

/// Nodes carrying `label`, in input order.
pub fn filter_members<'a>(nodes: &'a [Node], label: &LabelPredicate) -> Vec<&'a Node> {
    nodes.iter().filter(|n| is_member(n, label)).collect()
}

/// Nodes without `key`, in input order.
pub fn filter_available<'a>(nodes: &'a [Node], key: &str) -> Vec<&'a Node> {
    nodes.iter().filter(|n| is_available(n, key)).collect()
}
