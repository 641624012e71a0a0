//! Download stage: registry pages → filter → ledger → artifact store.

use tracing::{debug, error, info, warn};

use super::Interrupt;
use crate::artifact::{ArchiveFetcher, ArtifactStore};
use crate::core::{FilterEngine, PluginRecord};
use crate::ledger::Ledger;
use crate::registry::{PluginSource, RegistryPage, RegistryQuery};

/// Counters reported at the end of a download stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Pages processed
    pub pages: u32,

    /// Pages that could not be retrieved
    pub failed_pages: u32,

    /// Plugins returned by the registry
    pub candidates: usize,

    /// Plugins rejected by the local filters
    pub rejected: usize,

    /// Plugins written to the ledger
    pub recorded: usize,

    /// Plugins downloaded and extracted by this run
    pub extracted: usize,

    /// Plugins whose version directory already existed
    pub already_present: usize,

    /// Plugins that could not be materialized
    pub failed: usize,

    /// The stage stopped early on request
    pub interrupted: bool,
}

/// Runs the download stage.
pub struct DownloadPipeline<'a> {
    source: &'a dyn PluginSource,
    fetcher: &'a dyn ArchiveFetcher,
    store: &'a ArtifactStore,
    ledger: &'a Ledger,
    filter: &'a FilterEngine,
    query: RegistryQuery,
    interrupt: Interrupt,
}

impl<'a> DownloadPipeline<'a> {
    /// Create a pipeline.
    pub fn new(
        source: &'a dyn PluginSource,
        fetcher: &'a dyn ArchiveFetcher,
        store: &'a ArtifactStore,
        ledger: &'a Ledger,
        filter: &'a FilterEngine,
        query: RegistryQuery,
    ) -> Self {
        Self { source, fetcher, store, ledger, filter, query, interrupt: Interrupt::new() }
    }

    /// Stop at the next plugin boundary when `interrupt` is set.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Walk every registry page in order.
    pub fn run(&self) -> DownloadSummary {
        let mut summary = DownloadSummary::default();

        // The first page tells us how many pages there are
        let first = match self.source.query_page(&self.query, 1) {
            Ok(page) => page,
            Err(e) => {
                error!(error = %e, "Failed to retrieve plugins information");
                summary.failed_pages += 1;
                return summary;
            }
        };

        if first.results == 0 && first.plugins.is_empty() {
            info!("No plugins found");
            return summary;
        }

        let total_pages = first.pages.max(1);
        info!(total = first.results, pages = total_pages, "Registry query matched plugins");

        self.process_page(first, total_pages, &mut summary);

        for page in 2..=total_pages {
            if summary.interrupted {
                break;
            }

            match self.source.query_page(&self.query, page) {
                Ok(result) => self.process_page(result, total_pages, &mut summary),
                Err(e) => {
                    error!(page, error = %e, "Failed to retrieve page");
                    summary.failed_pages += 1;
                }
            }
        }

        info!(
            candidates = summary.candidates,
            rejected = summary.rejected,
            extracted = summary.extracted,
            already_present = summary.already_present,
            failed = summary.failed,
            "Download stage finished"
        );

        summary
    }

    fn process_page(&self, page: RegistryPage, total_pages: u32, summary: &mut DownloadSummary) {
        debug!(page = page.page, total_pages, plugins = page.plugins.len(), "Processing page");
        summary.pages += 1;

        for record in page.plugins {
            if self.interrupt.is_set() {
                warn!("Interrupted, stopping before {}", record.slug);
                summary.interrupted = true;
                return;
            }
            self.process_plugin(&record, summary);
        }
    }

    fn process_plugin(&self, record: &PluginRecord, summary: &mut DownloadSummary) {
        summary.candidates += 1;

        if let Err(reason) = self.filter.check(record) {
            debug!(slug = %record.slug, %reason, "Skipping plugin");
            summary.rejected += 1;
            return;
        }

        match self.ledger.upsert_plugin(record) {
            Ok(()) => {
                summary.recorded += 1;
                debug!(slug = %record.slug, version = %record.version, "Updated ledger record");
            }
            Err(e) => {
                error!(slug = %record.slug, version = %record.version, error = %e, "Can't write the record");
            }
        }

        match self.store.materialize(
            self.fetcher,
            &record.slug,
            &record.version,
            &record.download_link,
        ) {
            Ok(materialized) if materialized.extracted => summary.extracted += 1,
            Ok(_) => summary.already_present += 1,
            Err(e) => {
                error!(slug = %record.slug, version = %record.version, error = %e, "Failed to materialize plugin");
                summary.failed += 1;
            }
        }
    }
}
