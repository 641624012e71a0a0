//! Configuration management for Plugscan.
//!
//! Handles loading configuration from TOML files. Command-line flags are
//! applied on top of whatever is loaded here.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plugin registry settings
    pub registry: RegistryConfig,

    /// Local filter thresholds and registry-side string filters
    pub filter: FilterConfig,

    /// External scanner settings
    pub scanner: ScannerConfig,

    /// Working directories and the ledger database
    pub paths: PathsConfig,
}

/// Plugin registry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry API endpoint
    pub base_url: String,

    /// Plugins requested per page
    pub per_page: u32,

    /// Timeout for every registry and archive request
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: Option<String>,
}

/// Filter settings.
///
/// `max_months_since_update` and `min_active_installs` are applied locally;
/// `author`, `tag` and `search` are forwarded to the registry query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Max number of months since the last update
    pub max_months_since_update: u32,

    /// Min number of active installs
    pub min_active_installs: u64,

    /// Author username
    pub author: String,

    /// Registry tag
    pub tag: String,

    /// Free-text search term
    pub search: String,
}

/// External scanner settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Scanner executable
    pub program: String,

    /// Rule set passed to the scanner
    pub ruleset: String,

    /// Extra arguments appended before the scan target
    pub extra_args: Vec<String>,
}

/// Working directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory containing the `plugins/` folder
    pub download_dir: PathBuf,

    /// Ledger database (defaults to `<download_dir>/plugscan.db`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path must exist. Otherwise `./.plugscan.toml` is tried,
    /// then the global config file, then defaults.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(".plugscan.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(config_dir) = Self::config_dir() {
            let global_config = config_dir.join("config.toml");
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("plugscan"))
    }

    /// Resolve the ledger database path.
    pub fn database_path(&self) -> PathBuf {
        self.paths
            .database
            .clone()
            .unwrap_or_else(|| self.paths.download_dir.join("plugscan.db"))
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: crate::registry::DEFAULT_REGISTRY_URL.to_string(),
            per_page: 25,
            timeout_secs: 10,
            user_agent: None,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_months_since_update: 24,
            min_active_installs: 50,
            author: String::new(),
            tag: String::new(),
            search: String::new(),
        }
    }
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { program: "semgrep".to_string(), ruleset: "p/php".to_string(), extra_args: Vec::new() }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { download_dir: PathBuf::from("."), database: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.filter.max_months_since_update, 24);
        assert_eq!(config.filter.min_active_installs, 50);
        assert_eq!(config.scanner.ruleset, "p/php");
        assert_eq!(config.registry.per_page, 25);
        assert_eq!(config.database_path(), PathBuf::from("./plugscan.db"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [filter]
            min_active_installs = 1000

            [paths]
            download_dir = "/data/wp"
            "#,
        )
        .unwrap();

        assert_eq!(config.filter.min_active_installs, 1000);
        assert_eq!(config.filter.max_months_since_update, 24);
        assert_eq!(config.scanner.program, "semgrep");
        assert_eq!(config.database_path(), PathBuf::from("/data/wp/plugscan.db"));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("plugscan.toml");
        std::fs::write(&path, "[scanner]\nruleset = \"p/owasp-top-ten\"\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.scanner.ruleset, "p/owasp-top-ten");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&temp.path().join("missing.toml"))).is_err());
    }
}
