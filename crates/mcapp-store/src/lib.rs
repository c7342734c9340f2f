//! Object store for the multi-cluster application controller
//!
//! The controller never talks to a concrete backend. It consumes one generic
//! contract, [`ObjectStore<K>`], parameterised by resource kind:
//!
//! - **get / list**: point reads and label-indexed queries, optionally
//!   across every namespace
//! - **create / update / delete**: writes with optimistic concurrency;
//!   `update` fails with a conflict when the stored version has moved on
//! - **watch**: a change feed used by the enqueue bridges
//!
//! [`ConflictRetry`] wraps the fetch-merge-write loop every writer uses.
//! [`InMemoryStore`] is a complete implementation for tests and the
//! standalone daemon.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod memory;
pub mod retry;
pub mod selector;
pub mod store;

// Re-exports
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use retry::ConflictRetry;
pub use selector::LabelSelector;
pub use store::{ObjectStore, WatchEvent};
