//! # Plugscan
//!
//! Batch downloader and static-analysis driver for plugin registries.
//!
//! Plugscan walks a plugin registry (the WordPress.org plugin directory by
//! default), keeps a SQLite ledger of every `(slug, version)` it has seen,
//! materializes plugin sources on disk and runs an external scanner over
//! them, recording findings so they can be triaged across repeated runs.
//!
//! ## Modes
//!
//! - **download**: query the registry, filter, record and materialize plugins
//! - **audit**: scan the latest materialized version of every plugin
//! - **both**: download, then audit
//!
//! ## Quick Start
//!
//! ```bash
//! plugscan run --mode both --author automattic -d ./work -o ./work/plugscan.db
//! plugscan findings -o ./work/plugscan.db --untriaged
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::uninlined_format_args)]

pub mod artifact;
pub mod core;
pub mod ledger;
pub mod orchestrator;
pub mod registry;
pub mod scanner;

pub use artifact::{ArchiveFetcher, ArtifactError, ArtifactStore, Materialized};
pub use core::{Config, FilterConfig, FilterEngine, FindingKey, FindingRecord, PluginRecord};
pub use ledger::{FindingQuery, FindingView, Ledger, LedgerError};
pub use orchestrator::{
    AuditOptions, AuditSummary, Auditor, DownloadPipeline, DownloadSummary, Drift, Interrupt,
    RunMode, VersionSource,
};
pub use registry::{PluginSource, RegistryClient, RegistryError, RegistryPage, RegistryQuery};
pub use scanner::{RawFinding, ScanError, ScanTarget, Scanner, SemgrepScanner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "plugscan";
