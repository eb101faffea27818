//! Error types for the node pool labeler.

use thiserror::Error;

/// Errors raised by a [`NodeClient`](crate::client::NodeClient) implementation.
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("node has no name and cannot be updated")]
    UnnamedNode,
}

/// Errors detected while validating static configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {field} label key '{key}': {reason}")]
    InvalidLabelKey {
        field: &'static str,
        key: String,
        reason: String,
    },

    #[error("invalid {field} label value '{value}': {reason}")]
    InvalidLabelValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("filter label key '{key}' must differ from the managed label key")]
    FilterUsesManagedKey { key: String },

    #[error("check interval must be greater than zero")]
    ZeroCheckInterval,
}

/// Errors surfaced by the reconciliation core.
#[derive(Error, Debug)]
pub enum Error {
    #[error("cluster client error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("no node assignable; current({current}) desired({desired})")]
    NoAssignableNode { current: usize, desired: usize },

    #[error("failed to find removable node; current({current}) desired({desired})")]
    NoRemovableNode { current: usize, desired: usize },

    #[error("node watch stream ended")]
    WatchStreamEnded,

    #[error("driver task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether the supervisor should tear down and rebuild the subsystem
    /// instead of exiting.
    #[must_use]
    pub fn is_restartable(&self) -> bool {
        matches!(self, Error::WatchStreamEnded)
    }

    /// Whether the error is an exhaustion condition: every candidate was
    /// tried, or none existed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        matches!(
            self,
            Error::NoAssignableNode { .. } | Error::NoRemovableNode { .. }
        )
    }
}
