//! # Driver
//!
//! Single task that owns the reconciler. Each iteration waits for whichever
//! comes first: cancellation, a watcher wake-up, or the check interval
//! elapsing. Reconcile calls therefore never overlap.
//!
//! The timer restarts after every iteration, so the periodic branch fires
//! one interval after the previous reconcile regardless of what woke it.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::NodeClient;
use crate::error::Result;
use crate::filter::node_name;
use crate::health::SharedStatus;
use crate::reconciler::{ReconcileOutcome, Reconciler};

pub struct Driver<C: ?Sized> {
    reconciler: Reconciler<C>,
    signal: mpsc::Receiver<()>,
    interval: Duration,
    desired: usize,
    status: Option<SharedStatus>,
}

impl<C> Driver<C>
where
    C: NodeClient + ?Sized,
{
    /// Build a driver for the reconciler's configured desired count and
    /// check interval.
    pub fn new(reconciler: Reconciler<C>, signal: mpsc::Receiver<()>) -> Self {
        let interval = reconciler.config().check_interval;
        let desired = reconciler.config().desired_count;
        Self {
            reconciler,
            signal,
            interval,
            desired,
            status: None,
        }
    }

    /// Record every cycle's result in `status`.
    #[must_use]
    pub fn with_status(mut self, status: SharedStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Run until `cancel` fires. A reconcile in flight when cancellation
    /// arrives is dropped.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            desired = self.desired,
            interval_secs = self.interval.as_secs(),
            "Starting node count driver"
        );

        loop {
            let trigger = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                Some(()) = self.signal.recv() => "watch",
                () = tokio::time::sleep(self.interval) => "timer",
            };
            debug!(trigger, "Woke up");

            let (result, members) = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                cycle = self.cycle() => cycle,
            };

            match &result {
                Ok(ReconcileOutcome::InSync { count }) => {
                    debug!(count, "Node count in sync");
                }
                Ok(outcome) => {
                    debug!(?outcome, "Reconcile applied a change");
                }
                Err(e) if e.is_exhausted() => {
                    error!(error = %e, trigger, "Node pool cannot converge");
                }
                Err(e) => {
                    error!(error = %e, trigger, "Failed to reconcile node count");
                }
            }

            if let Some(status) = &self.status {
                let mut status = status.write().await;
                status.record(&result);
                if let Some(members) = members {
                    status.set_members(members);
                }
            }
        }

        info!("Node count driver stopped");
    }

    /// One reconcile, followed by a member listing when a status is
    /// attached and the cycle succeeded.
    async fn cycle(&self) -> (Result<ReconcileOutcome>, Option<Vec<String>>) {
        let result = self.reconciler.reconcile(self.desired).await;
        if result.is_err() || self.status.is_none() {
            return (result, None);
        }

        match self.reconciler.list_members().await {
            Ok(nodes) => {
                let names = nodes.iter().map(|n| node_name(n).to_string()).collect();
                (result, Some(names))
            }
            Err(e) => {
                warn!(error = %e, "Failed to list pool members");
                (result, None)
            }
        }
    }
}
