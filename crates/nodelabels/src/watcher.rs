//! # Node Watcher
//!
//! Consumes the node change stream and turns every change into an
//! edge-triggered wake-up for the driver. The signal channel holds a single
//! token: while one is pending, further changes are dropped, so a burst of
//! events collapses into one reconcile.
//!
//! The watcher does not look at what changed. Any node change, relevant to
//! the pool or not, triggers re-evaluation.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::client::{NodeClient, NodeEvent};
use crate::error::{Error, Result};
use crate::filter::node_name;

/// Capacity of the wake-up channel between watcher and driver.
pub const SIGNAL_CAPACITY: usize = 1;

/// Create the coalescing wake-up channel.
pub fn signal_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(SIGNAL_CAPACITY)
}

pub struct NodeWatcher<C: ?Sized> {
    client: Arc<C>,
    signal: mpsc::Sender<()>,
}

impl<C> NodeWatcher<C>
where
    C: NodeClient + ?Sized,
{
    pub fn new(client: Arc<C>, signal: mpsc::Sender<()>) -> Self {
        Self { client, signal }
    }

    /// Watch nodes until the stream ends, fails, or `cancel` fires.
    ///
    /// Returns `Ok(())` only on cancellation. A stream that ends returns
    /// [`Error::WatchStreamEnded`]; the caller is expected to rebuild the
    /// whole subsystem rather than resume.
    #[instrument(skip_all)]
    pub async fn watch(&self, cancel: CancellationToken) -> Result<()> {
        let mut stream = tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            stream = self.client.watch_nodes() => stream?,
        };
        info!("Watching nodes");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Node watch cancelled");
                    return Ok(());
                }
                next = stream.next() => next,
            };

            match next {
                Some(Ok(NodeEvent::Bookmark)) => trace!("Watch bookmark"),
                Some(Ok(event)) => {
                    trace!(
                        event = event_kind(&event),
                        node = event_node(&event),
                        "Node changed"
                    );
                    self.notify();
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Error during watch of nodes");
                    return Err(e.into());
                }
                None => {
                    info!("Node watch stream ended");
                    return Err(Error::WatchStreamEnded);
                }
            }
        }
    }

    /// Non-blocking wake-up. Returns whether a new token was queued.
    fn notify(&self) -> bool {
        match self.signal.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => {
                trace!("Wake-up already pending");
                false
            }
            Err(TrySendError::Closed(())) => {
                debug!("Wake-up receiver closed");
                false
            }
        }
    }
}

fn event_kind(event: &NodeEvent) -> &'static str {
    match event {
        NodeEvent::Added(_) => "added",
        NodeEvent::Modified(_) => "modified",
        NodeEvent::Deleted(_) => "deleted",
        NodeEvent::Bookmark => "bookmark",
    }
}

fn event_node(event: &NodeEvent) -> &str {
    match event {
        NodeEvent::Added(node) | NodeEvent::Modified(node) | NodeEvent::Deleted(node) => {
            node_name(node)
        }
        NodeEvent::Bookmark => "",
    }
}
