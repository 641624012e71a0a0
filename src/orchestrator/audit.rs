//! Audit stage.
//!
//! For every plugin: pick the version to scan, scan it, record findings
//! against the version that was actually scanned, then ask the registry for
//! the current version. A registry version different from the scanned one
//! is drift: it is reported as a warning and the newer record is stored
//! without findings, so the ledger shows it has not been scanned yet.

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::Interrupt;
use crate::artifact::ArtifactStore;
use crate::core::{FilterEngine, FindingRecord};
use crate::ledger::{FindingWrite, Ledger};
use crate::registry::PluginSource;
use crate::scanner::{ScanTarget, Scanner};

/// Where the version to scan comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum VersionSource {
    /// Latest version directory on disk, for every plugin on disk
    #[default]
    Disk,
    /// Latest ledger version of every plugin passing the filters
    Ledger,
}

/// Audit settings.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Rule set handed to the scanner
    pub ruleset: String,

    /// How plugins and versions are selected
    pub version_source: VersionSource,
}

/// A plugin whose registry version differs from the one scanned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Drift {
    pub slug: String,
    pub scanned_version: String,
    pub registry_version: String,
}

/// Counters reported at the end of an audit stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditSummary {
    /// Plugins selected for scanning
    pub selected: usize,

    /// Plugins scanned successfully
    pub scanned: usize,

    /// Plugins skipped (missing artifact, scanner failure)
    pub skipped: usize,

    /// Findings recorded for the first time
    pub new_findings: usize,

    /// Findings already known from a previous run
    pub known_findings: usize,

    /// Plugins with version drift
    pub drifted: Vec<Drift>,

    /// The stage stopped early on request
    pub interrupted: bool,
}

/// Runs the audit stage.
pub struct Auditor<'a> {
    ledger: &'a Ledger,
    store: &'a ArtifactStore,
    scanner: &'a dyn Scanner,
    filter: &'a FilterEngine,
    registry: Option<&'a dyn PluginSource>,
    options: AuditOptions,
    today: NaiveDate,
    interrupt: Interrupt,
}

impl<'a> Auditor<'a> {
    /// Create an auditor. Without a registry, drift detection is skipped.
    pub fn new(
        ledger: &'a Ledger,
        store: &'a ArtifactStore,
        scanner: &'a dyn Scanner,
        filter: &'a FilterEngine,
        options: AuditOptions,
    ) -> Self {
        Self {
            ledger,
            store,
            scanner,
            filter,
            registry: None,
            options,
            today: Utc::now().date_naive(),
            interrupt: Interrupt::new(),
        }
    }

    /// Check scanned plugins against the registry for version drift.
    #[must_use]
    pub fn with_registry(mut self, registry: &'a dyn PluginSource) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Override the date recorded on findings and scan timestamps.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// Stop at the next plugin boundary when `interrupt` is set.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Audit every selected plugin in order.
    pub fn run(&self) -> AuditSummary {
        let mut summary = AuditSummary::default();
        let targets = self.discover(&mut summary);
        summary.selected = targets.len();

        info!(
            plugins = targets.len(),
            scanner = self.scanner.name(),
            ruleset = %self.options.ruleset,
            "Starting audit"
        );

        for (slug, version) in &targets {
            if self.interrupt.is_set() {
                warn!("Interrupted, stopping before {}", slug);
                summary.interrupted = true;
                break;
            }
            self.audit_plugin(slug, version, &mut summary);
        }

        info!(
            scanned = summary.scanned,
            skipped = summary.skipped,
            new_findings = summary.new_findings,
            drifted = summary.drifted.len(),
            "Audit stage finished"
        );

        summary
    }

    /// Select `(slug, version)` pairs to scan.
    fn discover(&self, summary: &mut AuditSummary) -> Vec<(String, String)> {
        match self.options.version_source {
            VersionSource::Disk => self.discover_from_disk(),
            VersionSource::Ledger => self.discover_from_ledger(summary),
        }
    }

    fn discover_from_disk(&self) -> Vec<(String, String)> {
        let slugs = match self.store.slugs() {
            Ok(slugs) => slugs,
            Err(e) => {
                error!(error = %e, "Failed to list plugins on disk");
                return Vec::new();
            }
        };

        let mut targets = Vec::with_capacity(slugs.len());
        for slug in slugs {
            match self.store.latest_version(&slug) {
                Ok(Some(version)) => {
                    debug!(slug = %slug, version = %version, "Latest version found");
                    targets.push((slug, version));
                }
                Ok(None) => debug!(slug = %slug, "No versions on disk"),
                Err(e) => warn!(slug = %slug, error = %e, "Failed to list versions"),
            }
        }
        targets
    }

    fn discover_from_ledger(&self, summary: &mut AuditSummary) -> Vec<(String, String)> {
        let records = match self.ledger.query_plugins(self.filter) {
            Ok(records) => records,
            Err(e) => {
                error!(error = %e, "Failed to select plugins from the ledger");
                return Vec::new();
            }
        };

        let mut targets = Vec::with_capacity(records.len());
        for record in records {
            if let Ok(Some(on_disk)) = self.store.latest_version(&record.slug) {
                if on_disk != record.version {
                    warn!(
                        slug = %record.slug,
                        ledger = %record.version,
                        disk = %on_disk,
                        "Disk and ledger disagree on the latest version, scanning the ledger one"
                    );
                }
            }

            if self.store.contains(&record.slug, &record.version) {
                targets.push((record.slug, record.version));
            } else {
                warn!(
                    slug = %record.slug,
                    version = %record.version,
                    "Latest known version is not on disk, skipping"
                );
                summary.skipped += 1;
            }
        }
        targets
    }

    fn audit_plugin(&self, slug: &str, version: &str, summary: &mut AuditSummary) {
        let (path, output_base) = match (
            self.store.version_path(slug, version),
            self.store.raw_output_base(slug, version),
        ) {
            // Scanners see one spelling of the artifact path whatever the download dir was
            (Ok(path), Ok(output_base)) => (path.canonicalize().unwrap_or(path), output_base),
            (Err(e), _) | (_, Err(e)) => {
                error!(slug, version, error = %e, "Invalid artifact location");
                summary.skipped += 1;
                return;
            }
        };

        // A version only seen on disk still gets a ledger row
        match self.ledger.ensure_plugin(slug, version) {
            Ok(true) => debug!(slug, version, "Recorded version unknown to the ledger"),
            Ok(false) => {}
            Err(e) => error!(slug, version, error = %e, "Can't write the record"),
        }

        let target = ScanTarget { slug, version, path: &path, output_base: &output_base };
        let raw_findings = match self.scanner.scan(&target, &self.options.ruleset) {
            Ok(findings) => findings,
            Err(e) => {
                error!(slug, version, error = %e, "Scan failed");
                summary.skipped += 1;
                return;
            }
        };
        summary.scanned += 1;

        let total = raw_findings.len();
        for raw in raw_findings {
            let finding = FindingRecord::from_raw(slug, version, raw, self.today);
            match self.ledger.upsert_finding(&finding) {
                Ok(FindingWrite::Inserted) => summary.new_findings += 1,
                Ok(FindingWrite::Updated) => summary.known_findings += 1,
                Err(e) => error!(
                    slug,
                    version,
                    check_id = %finding.check_id,
                    error = %e,
                    "Can't write the finding"
                ),
            }
        }

        if let Err(e) = self.ledger.mark_scanned(slug, version, self.today) {
            error!(slug, version, error = %e, "Can't update the scan date");
        }

        info!(slug, version, findings = total, "Audit completed");

        self.check_drift(slug, version, summary);
    }

    fn check_drift(&self, slug: &str, scanned_version: &str, summary: &mut AuditSummary) {
        let Some(registry) = self.registry else {
            return;
        };

        match self.ledger.refresh_latest(registry, slug) {
            Ok(current) if current.version != scanned_version => {
                warn!(
                    slug,
                    scanned = scanned_version,
                    registry = %current.version,
                    "Registry reports a different version than the one scanned"
                );
                summary.drifted.push(Drift {
                    slug: slug.to_string(),
                    scanned_version: scanned_version.to_string(),
                    registry_version: current.version,
                });
            }
            Ok(_) => {}
            Err(e) => warn!(slug, error = %e, "Drift check failed"),
        }
    }
}
