//! Health and status endpoints
//!
//! - `GET /health`: liveness, always 200
//! - `GET /ready`: 200 once a reconcile cycle has succeeded, 503 before and
//!   after any cycle that failed to reach the cluster
//! - `GET /status`: last reconcile outcome, current members and counters as
//!   JSON

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::NodePoolConfig;
use crate::error::Error;
use crate::filter::LabelPredicate;
use crate::reconciler::ReconcileOutcome;

const SERVICE_NAME: &str = "nodelabels";

pub type SharedStatus = Arc<RwLock<ReconcileStatus>>;

/// Rolling view of reconcile cycles, written by the driver.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileStatus {
    pub label: LabelPredicate,
    pub filter: Option<LabelPredicate>,
    pub desired: usize,
    pub ready: bool,
    pub reconciles: u64,
    pub failures: u64,
    pub exhaustions: u64,
    pub member_count: Option<usize>,
    pub members: Vec<String>,
    pub last_outcome: Option<ReconcileOutcome>,
    pub last_error: Option<String>,
    pub last_reconcile_at: Option<DateTime<Utc>>,
}

impl ReconcileStatus {
    pub fn new(config: &NodePoolConfig) -> Self {
        Self {
            label: config.label.clone(),
            filter: config.filter.clone(),
            desired: config.desired_count,
            ready: false,
            reconciles: 0,
            failures: 0,
            exhaustions: 0,
            member_count: None,
            members: Vec::new(),
            last_outcome: None,
            last_error: None,
            last_reconcile_at: None,
        }
    }

    pub fn shared(config: &NodePoolConfig) -> SharedStatus {
        Arc::new(RwLock::new(Self::new(config)))
    }

    /// Record the result of one reconcile cycle.
    ///
    /// Exhaustion leaves readiness untouched: the cluster was reachable and
    /// the pool simply cannot converge. A cluster error clears it.
    pub fn record(&mut self, result: &Result<ReconcileOutcome, Error>) {
        self.reconciles += 1;
        self.last_reconcile_at = Some(Utc::now());
        match result {
            Ok(outcome) => {
                self.ready = true;
                self.member_count = Some(outcome.member_count());
                self.last_outcome = Some(outcome.clone());
                self.last_error = None;
            }
            Err(e) => {
                self.failures += 1;
                if e.is_exhausted() {
                    self.exhaustions += 1;
                }
                if matches!(e, Error::Cluster(_)) {
                    self.ready = false;
                }
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Publish the member names observed after a cycle.
    pub fn set_members(&mut self, members: Vec<String>) {
        self.member_count = Some(members.len());
        self.members = members;
    }
}

pub fn router(status: SharedStatus) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(status_report))
        .layer(TraceLayer::new_for_http())
        .with_state(status)
}

/// Serve the health endpoints until `shutdown` fires.
pub async fn serve(
    addr: SocketAddr,
    status: SharedStatus,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Health server listening on {}", addr);

    axum::serve(listener, router(status))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(status): State<SharedStatus>) -> (StatusCode, Json<Value>) {
    let ready = status.read().await.ready;
    let (code, state) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not_ready")
    };

    (
        code,
        Json(json!({
            "status": state,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

async fn status_report(State(status): State<SharedStatus>) -> Json<ReconcileStatus> {
    Json(status.read().await.clone())
}
