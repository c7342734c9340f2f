//! MCApp daemon library
//!
//! Pieces of the `mcappd` binary that are worth testing on their own:
//! - Layered configuration
//! - Manifest seeding of the in-memory stores
//! - Daemon error type

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod config;
pub mod error;
pub mod manifest;

pub use config::{DaemonConfig, LoggingConfig};
pub use error::{DaemonError, DaemonResult};
pub use manifest::Manifest;
