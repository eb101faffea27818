//! # Supervisor
//!
//! Process-level run loop. Each round connects a fresh client and runs a
//! watcher and a driver under one cancellation token. When the watch stream
//! ends the whole round is torn down and rebuilt; any other failure is
//! returned to the caller, which exits the process.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::client::NodeClient;
use crate::config::NodePoolConfig;
use crate::driver::Driver;
use crate::error::{ClusterError, Result};
use crate::health::SharedStatus;
use crate::reconciler::Reconciler;
use crate::watcher::{signal_channel, NodeWatcher};

/// Pause between a watch ending and the next round.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Run rounds until `shutdown` fires (`Ok`) or a non-restartable error
/// occurs (`Err`).
#[instrument(skip_all, fields(label = %config.label, desired = config.desired_count))]
pub async fn run_supervised<C, F, Fut>(
    config: Arc<NodePoolConfig>,
    mut connect: F,
    status: Option<SharedStatus>,
    shutdown: CancellationToken,
) -> Result<()>
where
    C: NodeClient + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Arc<C>, ClusterError>>,
{
    let mut round: u64 = 0;

    loop {
        round += 1;

        let client = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(()),
            client = connect() => client?,
        };
        info!(round, "Node manager started");

        match run_round(client, config.clone(), status.clone(), &shutdown).await {
            Ok(()) => {
                info!(round, "Node manager shut down");
                return Ok(());
            }
            Err(e) if e.is_restartable() => {
                info!(round, reason = %e, "Restarting node manager");
            }
            Err(e) => {
                error!(round, error = %e, "Node manager died");
                return Err(e);
            }
        }

        tokio::select! {
            biased;
            () = shutdown.cancelled() => return Ok(()),
            () = tokio::time::sleep(RESTART_DELAY) => {}
        }
    }
}

/// One watcher + driver pair sharing a child of `shutdown`.
async fn run_round<C>(
    client: Arc<C>,
    config: Arc<NodePoolConfig>,
    status: Option<SharedStatus>,
    shutdown: &CancellationToken,
) -> Result<()>
where
    C: NodeClient + 'static,
{
    let cancel = shutdown.child_token();
    let (tx, rx) = signal_channel();

    let watcher = NodeWatcher::new(client.clone(), tx);
    let mut driver = Driver::new(Reconciler::new(client, config), rx);
    if let Some(status) = status {
        driver = driver.with_status(status);
    }

    let driver_handle = tokio::spawn(driver.run(cancel.clone()));
    let result = watcher.watch(cancel.clone()).await;

    cancel.cancel();
    driver_handle.await?;
    result
}
