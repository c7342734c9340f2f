//! Multi-cluster application controller
//!
//! Converges a MultiClusterApp (MCApp) onto one App per target project:
//!
//! - **Answer Resolver** ([`answers`]): scoped configuration with
//!   project > cluster > global precedence
//! - **Reconciler** ([`reconciler`]): creates and updates target Apps in
//!   bounded batches, tracks rollouts in tri-state conditions, snapshots
//!   revisions and cascades deletion
//! - **Rollout Scheduler** ([`rollout`]): per-MCApp interval timers that
//!   re-enqueue a rollout in progress
//! - **Status Reducer** ([`status`]): installing/deploying/active state
//! - **Access Propagator** ([`access`]): owner/member/read-only roles and
//!   bindings for MCApps and their revisions
//! - **Enqueue Bridges** ([`enqueue`]): App and RoleBinding changes mapped
//!   back to MCApp keys
//!
//! [`Controller`] runs all of it over a keyed [`WorkQueue`] that never hands
//! the same MCApp to two workers at once.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod access;
pub mod answers;
pub mod config;
pub mod controller;
pub mod enqueue;
pub mod error;
pub mod queue;
pub mod reconciler;
pub mod rollout;
pub mod status;
pub mod stores;

// Re-exports
pub use access::{AccessPropagator, AccessRequest};
pub use answers::{resolve, ResolvedAnswers, ScopeAnswers};
pub use config::ControllerConfig;
pub use controller::Controller;
pub use enqueue::{AppBridge, MultiClusterAppBridge, RoleBindingBridge, WatchHandler};
pub use error::{ControllerError, Result};
pub use queue::WorkQueue;
pub use reconciler::Reconciler;
pub use rollout::RolloutScheduler;
pub use status::{reduce, StatusSummary, StatusWriter};
pub use stores::{InMemoryStores, Stores};
