//! Run orchestration.
//!
//! A run is strictly sequential: one registry request, download, extraction
//! or scanner invocation at a time, plugins processed in registry (or disk)
//! order. Failures are per plugin; they are logged and the run moves on.

mod audit;
mod download;

pub use audit::{AuditOptions, AuditSummary, Auditor, Drift, VersionSource};
pub use download::{DownloadPipeline, DownloadSummary};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Operating mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Query the registry, record and materialize plugins
    Download,
    /// Scan materialized plugins
    Audit,
    /// Download, then audit
    Both,
}

impl RunMode {
    /// Check if the download stage runs in this mode.
    pub fn downloads(self) -> bool {
        matches!(self, Self::Download | Self::Both)
    }

    /// Check if the audit stage runs in this mode.
    pub fn audits(self) -> bool {
        matches!(self, Self::Audit | Self::Both)
    }
}

/// Stop request shared with the Ctrl-C handler.
///
/// Checked between plugins, never in the middle of one.
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Create a flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a Ctrl-C handler that sets this flag.
    pub fn install_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = Arc::clone(&self.0);
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
    }

    /// Request a stop at the next plugin boundary.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if a stop was requested.
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
