//! Core types shared by every stage of a run.
//!
//! This module contains the ledger records, the version ordering used to
//! pick "latest" versions, the local filter predicates and the configuration.

mod config;
mod filter;
mod record;
mod version;

pub use config::{Config, FilterConfig, PathsConfig, RegistryConfig, ScannerConfig};
pub use filter::{FilterEngine, Rejection};
pub use record::{FindingKey, FindingRecord, PluginRecord};
pub use version::{compare_versions, latest_version};
