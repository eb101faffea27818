/*
 * 5D Labs Agent Platform - Node Pool Labeler
 * Copyright (C) 2025 5D Labs
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published
 * by the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 */

//! nodelabels - keeps a fixed number of Kubernetes nodes labeled
//!
//! Reads its configuration from flags or environment variables, then runs
//! the watch/reconcile loop until SIGINT or SIGTERM. Fatal errors exit with
//! status 1 so the supervising Deployment restarts the pod.

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use nodelabels::config::{DEFAULT_COUNT, DEFAULT_NODE_KEY, DEFAULT_NODE_VAL};
use nodelabels::{
    health, run_supervised, KubeNodeClient, LabelPredicate, NodePoolConfig, ReconcileStatus,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keep a fixed-size pool of labeled worker nodes.
#[derive(Parser, Debug)]
#[command(name = "nodelabels", version)]
#[command(about = "Label or unlabel nodes until the labeled pool matches the desired size")]
struct Cli {
    /// Label key that marks a node as a pool member.
    #[arg(long, env = "NODE_KEY", default_value = DEFAULT_NODE_KEY)]
    node_key: String,

    /// Label value that marks a node as a pool member.
    #[arg(long, env = "NODE_VAL", default_value = DEFAULT_NODE_VAL)]
    node_val: String,

    /// Desired number of member nodes.
    #[arg(long, env = "COUNT", default_value_t = DEFAULT_COUNT)]
    count: usize,

    /// Only consider nodes carrying this label key (requires --filter-val).
    #[arg(long, env = "FILTER_KEY", requires = "filter_val")]
    filter_key: Option<String>,

    /// Value for --filter-key.
    #[arg(long, env = "FILTER_VAL", requires = "filter_key")]
    filter_val: Option<String>,

    /// Seconds between periodic reconciles.
    #[arg(long, env = "CHECK_INTERVAL_SECS", default_value_t = 120)]
    check_interval_secs: u64,

    /// Address for the /health, /ready and /status endpoints.
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Do not start the health server.
    #[arg(long, default_value = "false")]
    no_health_server: bool,

    /// Emit logs as JSON.
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

impl Cli {
    fn into_config(self) -> NodePoolConfig {
        let filter = match (self.filter_key, self.filter_val) {
            (Some(key), Some(value)) => Some(LabelPredicate::new(key, value)),
            _ => None,
        };
        let health_addr = (!self.no_health_server).then_some(self.health_addr);

        let label = LabelPredicate::new(self.node_key, self.node_val);

        NodePoolConfig::new(label, self.count)
            .with_filter(filter)
            .with_check_interval(Duration::from_secs(self.check_interval_secs))
            .with_health_addr(health_addr)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("nodelabels died: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config();
    config.validate().context("invalid configuration")?;

    info!(
        label = %config.label,
        filter = ?config.filter,
        desired = config.desired_count,
        "Starting nodelabels v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let status = ReconcileStatus::shared(&config);
    let health_handle = config.health_addr.map(|addr| {
        let status = status.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = health::serve(addr, status, shutdown).await {
                error!("Health server error: {}", e);
            }
        })
    });

    let result = run_supervised(
        config,
        || async { KubeNodeClient::try_default().await.map(Arc::new) },
        Some(status),
        shutdown.clone(),
    )
    .await;

    shutdown.cancel();
    if let Some(handle) = health_handle {
        let _ = handle.await;
    }

    result.context("node manager failed")?;
    info!("nodelabels stopped");
    Ok(())
}

async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully");
        },
    }

    shutdown.cancel();
}
