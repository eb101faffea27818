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

//! Node pool labeler
//!
//! Keeps a fixed number of Kubernetes worker nodes carrying a managed label.
//! The controller observes node state, compares the number of labeled nodes
//! against a desired count, and labels or unlabels one node per cycle until
//! the two converge.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────────┐  coalesced wake-up   ┌──────────────┐
//!  │ NodeWatcher  │ ───────────────────► │    Driver    │◄── interval timer
//!  └──────▲───────┘      (cap 1)         └──────┬───────┘
//!         │ watch                               │ reconcile
//!         │                                     ▼
//!  ┌──────┴─────────────────────────────────────────────┐
//!  │                NodeClient (kube Api<Node>)          │
//!  └─────────────────────────────────────────────────────┘
//! ```
//!
//! - [`filter`]: label predicates and the member/available node filters
//! - [`watcher`]: turns the node change stream into wake-up signals
//! - [`reconciler`]: one list-compare-mutate cycle
//! - [`driver`]: timer plus signal loop that serializes reconcile calls
//! - [`supervisor`]: restarts the whole subsystem when the watch ends

pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod health;
pub mod reconciler;
pub mod supervisor;
pub mod watcher;

pub use client::{KubeNodeClient, NodeClient, NodeEvent, NodeEventStream};
pub use config::NodePoolConfig;
pub use driver::Driver;
pub use error::{ClusterError, ConfigError, Error, Result};
pub use filter::LabelPredicate;
pub use health::{ReconcileStatus, SharedStatus};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use supervisor::run_supervised;
pub use watcher::NodeWatcher;
