//! # Reconciler
//!
//! One reconcile cycle lists nodes, counts pool members within the filtered
//! universe, and applies at most one corrective label change:
//!
//! - too few members: label the first available node, in list order
//! - too many members: unlabel the first member node, in list order
//!
//! A failed update moves on to the next candidate in the same cycle; the
//! same node is never retried. Larger gaps close over successive cycles.
//! List failures abort the cycle and are left to the next tick.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Node;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::client::NodeClient;
use crate::config::NodePoolConfig;
use crate::error::{Error, Result};
use crate::filter::{filter_members, is_available, is_member, node_name};

/// Result of a successful reconcile cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Member count already matched; nothing was written.
    InSync { count: usize },
    /// The managed label was applied to `node`.
    Labeled {
        node: String,
        current: usize,
        desired: usize,
    },
    /// The managed label was removed from `node`.
    Unlabeled {
        node: String,
        current: usize,
        desired: usize,
    },
}

impl ReconcileOutcome {
    /// Member count after the cycle, assuming the update took effect.
    pub fn member_count(&self) -> usize {
        match self {
            Self::InSync { count } => *count,
            Self::Labeled { current, .. } => current + 1,
            Self::Unlabeled { current, .. } => current - 1,
        }
    }
}

pub struct Reconciler<C: ?Sized> {
    client: Arc<C>,
    config: Arc<NodePoolConfig>,
}

impl<C> Reconciler<C>
where
    C: NodeClient + ?Sized,
{
    pub fn new(client: Arc<C>, config: Arc<NodePoolConfig>) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &NodePoolConfig {
        &self.config
    }

    /// Current pool members within the filtered universe, in list order.
    pub async fn list_members(&self) -> Result<Vec<Node>> {
        let nodes = self.eligible_nodes().await?;
        Ok(filter_members(&nodes, &self.config.label)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Run one cycle towards `desired` member nodes.
    #[instrument(skip(self), fields(label = %self.config.label))]
    pub async fn reconcile(&self, desired: usize) -> Result<ReconcileOutcome> {
        let nodes = self.eligible_nodes().await?;

        let current = filter_members(&nodes, &self.config.label).len();
        debug!(
            current,
            desired,
            universe = nodes.len(),
            "Counted pool members"
        );

        match current.cmp(&desired) {
            Ordering::Equal => Ok(ReconcileOutcome::InSync { count: current }),
            Ordering::Less => self.add_node(nodes, current, desired).await,
            Ordering::Greater => self.remove_node(nodes, current, desired).await,
        }
    }

    /// One list call, narrowed by the filter both server side and locally.
    async fn eligible_nodes(&self) -> Result<Vec<Node>> {
        let mut nodes = self.client.list_nodes(self.config.list_selector()).await?;
        if let Some(filter) = &self.config.filter {
            nodes.retain(|node| filter.matches(node));
        }
        Ok(nodes)
    }

    async fn add_node(
        &self,
        nodes: Vec<Node>,
        current: usize,
        desired: usize,
    ) -> Result<ReconcileOutcome> {
        let label = &self.config.label;
        if desired > nodes.len() {
            warn!(
                desired,
                universe = nodes.len(),
                "Desired count exceeds the number of eligible nodes"
            );
        }

        for mut node in nodes {
            if !is_available(&node, &label.key) {
                continue;
            }

            node.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(label.key.clone(), label.value.clone());

            let name = node_name(&node).to_string();
            match self.client.update_node(&node).await {
                Ok(()) => {
                    info!(node = %name, current, desired, "Assigned node to pool");
                    return Ok(ReconcileOutcome::Labeled {
                        node: name,
                        current,
                        desired,
                    });
                }
                Err(e) => {
                    warn!(node = %name, error = %e, "Failed to assign node");
                }
            }
        }

        Err(Error::NoAssignableNode { current, desired })
    }

    async fn remove_node(
        &self,
        nodes: Vec<Node>,
        current: usize,
        desired: usize,
    ) -> Result<ReconcileOutcome> {
        let label = &self.config.label;

        for mut node in nodes {
            if !is_member(&node, label) {
                continue;
            }

            if let Some(labels) = node.metadata.labels.as_mut() {
                labels.remove(&label.key);
            }

            let name = node_name(&node).to_string();
            match self.client.update_node(&node).await {
                Ok(()) => {
                    info!(node = %name, current, desired, "Removed node from pool");
                    return Ok(ReconcileOutcome::Unlabeled {
                        node: name,
                        current,
                        desired,
                    });
                }
                Err(e) => {
                    warn!(node = %name, error = %e, "Failed to unassign node");
                }
            }
        }

        Err(Error::NoRemovableNode { current, desired })
    }
}
