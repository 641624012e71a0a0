//! External static-analysis scanners.
//!
//! A scanner is a pure function of (artifact, rule set): every call scans
//! exactly one artifact from scratch and returns its findings unordered.

mod error;
mod semgrep;

pub use error::{ScanError, ScanResult};
pub use semgrep::SemgrepScanner;

use std::path::Path;

use serde::{Deserialize, Serialize};

/// The artifact handed to a scanner.
#[derive(Debug, Clone, Copy)]
pub struct ScanTarget<'a> {
    /// Plugin slug
    pub slug: &'a str,

    /// Version being scanned
    pub version: &'a str,

    /// Artifact directory
    pub path: &'a Path,

    /// Base path (without extension) for raw scanner output
    pub output_base: &'a Path,
}

/// A finding as reported by a scanner, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    /// Flagged file
    pub path: String,

    /// Rule identifier
    pub check_id: String,

    pub start_line: u32,

    pub end_line: u32,

    /// Matched source text
    pub lines: String,

    /// Rule message
    pub message: String,
}

/// Trait for static-analysis scanners.
pub trait Scanner {
    /// Get the name of this scanner.
    fn name(&self) -> &str;

    /// Scan one artifact with the given rule set.
    fn scan(&self, target: &ScanTarget<'_>, ruleset: &str) -> ScanResult<Vec<RawFinding>>;
}
