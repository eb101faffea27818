//! In-memory cluster used by the integration tests.
//!
//! Nodes are returned in insertion order. Updates replace the stored node
//! by name, so successive reconciles observe earlier writes.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Node;
use kube::core::{ErrorResponse, ObjectMeta};
use nodelabels::{ClusterError, NodeClient, NodeEvent, NodeEventStream};

pub fn node(name: &str, labels: &[(&str, &str)]) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn conflict(name: &str) -> ClusterError {
    ClusterError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: format!("Operation cannot be fulfilled on nodes \"{name}\""),
        reason: "Conflict".to_string(),
        code: 409,
    }))
}

/// What the next `watch_nodes` call hands out.
pub enum WatchScript {
    /// Yield these events, then end the stream.
    Events(Vec<NodeEvent>),
    /// Events pushed through the returned sender; ends when it is dropped.
    Live(futures::channel::mpsc::UnboundedReceiver<NodeEvent>),
    /// Fail to open the watch.
    Fail,
}

#[derive(Default)]
pub struct FakeCluster {
    nodes: Mutex<Vec<Node>>,
    failing: Mutex<HashSet<String>>,
    updates: Mutex<Vec<String>>,
    scripts: Mutex<VecDeque<WatchScript>>,
    list_delay: Mutex<Option<Duration>>,
    pub list_calls: AtomicUsize,
    pub watch_calls: AtomicUsize,
}

impl FakeCluster {
    pub fn with_nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            ..Self::default()
        }
    }

    pub fn fail_updates_for(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn set_list_delay(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn push_script(&self, script: WatchScript) {
        self.scripts.lock().unwrap().push_back(script);
    }

    /// Queue a live watch and return the sender that feeds it.
    pub fn live_watch(&self) -> UnboundedSender<NodeEvent> {
        let (tx, rx) = unbounded();
        self.push_script(WatchScript::Live(rx));
        tx
    }

    /// Names of successfully updated nodes, in order.
    pub fn updates(&self) -> Vec<String> {
        self.updates.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn watch_calls(&self) -> usize {
        self.watch_calls.load(Ordering::SeqCst)
    }

    pub fn label(&self, name: &str, key: &str) -> Option<String> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.metadata.name.as_deref() == Some(name))
            .and_then(|n| n.metadata.labels.as_ref())
            .and_then(|labels| labels.get(key).cloned())
    }

    /// Names of nodes carrying `key=value`, in list order.
    pub fn members(&self, key: &str, value: &str) -> Vec<String> {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .filter(|n| {
                n.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(key))
                    .is_some_and(|v| v == value)
            })
            .filter_map(|n| n.metadata.name.clone())
            .collect()
    }
}

#[async_trait]
impl NodeClient for FakeCluster {
    async fn list_nodes(&self, selector: Option<String>) -> Result<Vec<Node>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let nodes = self.nodes.lock().unwrap().clone();
        let Some((key, value)) = selector.as_deref().and_then(|s| s.split_once('=')) else {
            return Ok(nodes);
        };

        Ok(nodes
            .into_iter()
            .filter(|n| {
                n.metadata
                    .labels
                    .as_ref()
                    .and_then(|labels| labels.get(key))
                    .is_some_and(|v| v == value)
            })
            .collect())
    }

    async fn update_node(&self, node: &Node) -> Result<(), ClusterError> {
        let name = node
            .metadata
            .name
            .clone()
            .ok_or(ClusterError::UnnamedNode)?;

        if self.failing.lock().unwrap().contains(&name) {
            return Err(conflict(&name));
        }

        let mut nodes = self.nodes.lock().unwrap();
        if let Some(stored) = nodes
            .iter_mut()
            .find(|n| n.metadata.name.as_deref() == Some(name.as_str()))
        {
            *stored = node.clone();
        }
        self.updates.lock().unwrap().push(name);
        Ok(())
    }

    async fn watch_nodes(&self) -> Result<NodeEventStream, ClusterError> {
        self.watch_calls.fetch_add(1, Ordering::SeqCst);

        let script = self.scripts.lock().unwrap().pop_front();
        match script {
            Some(WatchScript::Events(events)) => {
                Ok(stream::iter(events.into_iter().map(Ok::<_, ClusterError>)).boxed())
            }
            Some(WatchScript::Live(rx)) => Ok(rx.map(Ok::<_, ClusterError>).boxed()),
            Some(WatchScript::Fail) => Err(conflict("watch")),
            None => Ok(stream::pending::<Result<NodeEvent, ClusterError>>().boxed()),
        }
    }
}
