//! On-disk artifact store.
//!
//! Every materialized plugin version lives at
//! `<download-dir>/plugins/<slug>/<version>/`. Raw scanner output is kept
//! apart from the sources, under `<download-dir>/scan-results/<slug>/`.

mod error;
mod extract;

pub use error::{ArtifactError, ArtifactResult};
pub use extract::{content_root, extract_zip};

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::core::latest_version;

/// Name of the folder holding extracted plugins.
pub const PLUGINS_DIR: &str = "plugins";

/// Name of the folder holding raw scanner output.
pub const RESULTS_DIR: &str = "scan-results";

/// Fetches plugin archives.
pub trait ArchiveFetcher {
    /// Download the archive at `url`.
    fn fetch(&self, url: &str) -> ArtifactResult<Vec<u8>>;
}

/// Outcome of a materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    /// Artifact directory
    pub path: PathBuf,

    /// Whether this call downloaded and extracted the archive
    pub extracted: bool,
}

/// Manages the on-disk layout of downloaded plugin sources.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at the download directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the download directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory containing one folder per plugin slug.
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join(PLUGINS_DIR)
    }

    /// Directory containing raw scanner output.
    pub fn results_dir(&self) -> PathBuf {
        self.root.join(RESULTS_DIR)
    }

    /// Deterministic path of an artifact.
    pub fn version_path(&self, slug: &str, version: &str) -> ArtifactResult<PathBuf> {
        validate_component(slug)?;
        validate_component(version)?;
        Ok(self.plugins_dir().join(slug).join(version))
    }

    /// Check if an artifact is already on disk.
    pub fn contains(&self, slug: &str, version: &str) -> bool {
        self.version_path(slug, version).map(|p| p.is_dir()).unwrap_or(false)
    }

    /// Fetch and extract an artifact unless it is already on disk.
    ///
    /// Extraction happens in a staging directory next to the final location
    /// and is renamed into place, so a failure never leaves a partial
    /// version directory behind.
    pub fn materialize(
        &self,
        fetcher: &dyn ArchiveFetcher,
        slug: &str,
        version: &str,
        download_link: &str,
    ) -> ArtifactResult<Materialized> {
        let path = self.version_path(slug, version)?;

        if path.exists() {
            debug!(path = %path.display(), "Plugin folder already exists, skipping download");
            return Ok(Materialized { path, extracted: false });
        }

        if download_link.is_empty() {
            return Err(ArtifactError::MissingDownloadLink {
                slug: slug.to_string(),
                version: version.to_string(),
            });
        }

        let data = fetcher.fetch(download_link)?;

        let slug_dir = self.plugins_dir().join(slug);
        fs::create_dir_all(&slug_dir)?;

        let staging = tempfile::Builder::new().prefix(".staging-").tempdir_in(&slug_dir)?;
        let payload = staging.path().join("payload");
        let files = extract_zip(&data, &payload)?;

        fs::rename(content_root(&payload)?, &path)?;

        info!(slug, version, files, "Downloaded and extracted plugin");
        Ok(Materialized { path, extracted: true })
    }

    /// List plugin slugs present on disk, sorted by name.
    pub fn slugs(&self) -> ArtifactResult<Vec<String>> {
        list_dirs(&self.plugins_dir())
    }

    /// List the versions of a plugin present on disk, sorted by name.
    pub fn versions(&self, slug: &str) -> ArtifactResult<Vec<String>> {
        validate_component(slug)?;
        list_dirs(&self.plugins_dir().join(slug))
    }

    /// Greatest version of a plugin present on disk.
    pub fn latest_version(&self, slug: &str) -> ArtifactResult<Option<String>> {
        let versions = self.versions(slug)?;
        Ok(latest_version(versions.iter().map(String::as_str)).map(str::to_string))
    }

    /// Base path (without extension) for raw scanner output of an artifact.
    pub fn raw_output_base(&self, slug: &str, version: &str) -> ArtifactResult<PathBuf> {
        validate_component(slug)?;
        validate_component(version)?;
        Ok(self.results_dir().join(slug).join(format!("{slug}.{version}")))
    }
}

/// Reject names that would escape or collapse the directory layout.
fn validate_component(name: &str) -> ArtifactResult<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.starts_with(".staging-");

    if invalid {
        Err(ArtifactError::InvalidPathComponent(name.to_string()))
    } else {
        Ok(())
    }
}

/// Immediate subdirectories of `dir`; a missing directory is empty.
fn list_dirs(dir: &Path) -> ArtifactResult<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| ArtifactError::Io(e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Leftovers of an interrupted extraction
        if name.starts_with(".staging-") {
            continue;
        }
        names.push(name);
    }

    Ok(names)
}
