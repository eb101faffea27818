//! # Cluster Client Adapter
//!
//! The reconciliation core only talks to the cluster through [`NodeClient`]:
//! list, update and watch over node resources. [`KubeNodeClient`] is the
//! production implementation backed by `kube::Api<Node>`; tests substitute
//! mocks or in-memory fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams, PostParams, WatchEvent, WatchParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use tracing::{debug, instrument};

use crate::error::ClusterError;

/// One observed change to a node.
#[derive(Debug, Clone)]
pub enum NodeEvent {
    Added(Node),
    Modified(Node),
    Deleted(Node),
    Bookmark,
}

/// Change stream returned by [`NodeClient::watch_nodes`]. The stream ending
/// means the server closed the watch.
pub type NodeEventStream = BoxStream<'static, Result<NodeEvent, ClusterError>>;

/// Node operations consumed by the reconciliation core.
///
/// Implementations must be safe for concurrent use: the watcher and the
/// driver share one client.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// List nodes, optionally restricted by a label selector (`key=value`).
    /// Order is whatever the backend returns.
    async fn list_nodes(&self, selector: Option<String>) -> Result<Vec<Node>, ClusterError>;

    /// Replace a whole node object.
    async fn update_node(&self, node: &Node) -> Result<(), ClusterError>;

    /// Open a change stream over all nodes.
    async fn watch_nodes(&self) -> Result<NodeEventStream, ClusterError>;
}

/// [`NodeClient`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeNodeClient {
    api: Api<Node>,
}

impl KubeNodeClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    /// Connect using in-cluster configuration or the local kubeconfig.
    pub async fn try_default() -> Result<Self, ClusterError> {
        let client = Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl NodeClient for KubeNodeClient {
    #[instrument(skip(self))]
    async fn list_nodes(&self, selector: Option<String>) -> Result<Vec<Node>, ClusterError> {
        let params = match selector.as_deref() {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };

        let list = self.api.list(&params).await?;
        debug!(count = list.items.len(), "Listed nodes");
        Ok(list.items)
    }

    async fn update_node(&self, node: &Node) -> Result<(), ClusterError> {
        let name = node
            .metadata
            .name
            .as_deref()
            .ok_or(ClusterError::UnnamedNode)?;

        // The node carries the resourceVersion it was listed with, so a
        // concurrent change surfaces as a 409 instead of being overwritten.
        self.api.replace(name, &PostParams::default(), node).await?;
        Ok(())
    }

    async fn watch_nodes(&self) -> Result<NodeEventStream, ClusterError> {
        let stream = self.api.watch(&WatchParams::default(), "0").await?;

        Ok(stream
            .map_err(ClusterError::from)
            .and_then(|event| async move {
                match event {
                    WatchEvent::Added(node) => Ok(NodeEvent::Added(node)),
                    WatchEvent::Modified(node) => Ok(NodeEvent::Modified(node)),
                    WatchEvent::Deleted(node) => Ok(NodeEvent::Deleted(node)),
                    WatchEvent::Bookmark(_) => Ok(NodeEvent::Bookmark),
                    WatchEvent::Error(status) => Err(ClusterError::Kube(kube::Error::Api(status))),
                }
            })
            .boxed())
    }
}
