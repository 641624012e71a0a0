//! Ledger records.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::scanner::RawFinding;

/// One known `(slug, version)` pairing as last observed from the registry or disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginRecord {
    /// Stable plugin identifier
    pub slug: String,

    /// Plugin-declared version (not guaranteed to be semver)
    pub version: String,

    /// Author as reported by the registry
    #[serde(default)]
    pub author: String,

    /// Active installations
    #[serde(default)]
    pub active_installs: u64,

    /// Cumulative download count
    #[serde(default)]
    pub downloaded: u64,

    /// Last update timestamp (UTC)
    #[serde(default)]
    pub last_updated: Option<NaiveDateTime>,

    /// Date the plugin was first published
    #[serde(default)]
    pub added_date: Option<NaiveDate>,

    /// Archive URL
    #[serde(default)]
    pub download_link: String,

    /// Date of the last completed scan of this version
    #[serde(default)]
    pub last_time_scanned: Option<NaiveDate>,
}

impl PluginRecord {
    /// Create a record with no registry metadata, e.g. for a version only seen on disk.
    pub fn new(slug: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            version: version.into(),
            author: String::new(),
            active_installs: 0,
            downloaded: 0,
            last_updated: None,
            added_date: None,
            download_link: String::new(),
            last_time_scanned: None,
        }
    }
}

/// Natural key of a finding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindingKey {
    pub slug: String,
    pub version: String,
    pub file_path: String,
    pub check_id: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// One normalized static-analysis result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingRecord {
    /// Plugin slug
    pub slug: String,

    /// The version that was actually scanned
    pub version: String,

    /// Path of the flagged file, relative to the artifact root when possible
    pub file_path: String,

    /// Rule identifier
    pub check_id: String,

    pub start_line: u32,

    pub end_line: u32,

    /// Raw excerpt of the matched lines
    pub vuln_lines: String,

    /// Rule message
    pub message: String,

    /// Date the finding was first recorded
    pub date_discovered: NaiveDate,

    /// Manual review flag
    #[serde(default)]
    pub triaged: bool,
}

impl FindingRecord {
    /// Normalize a raw scanner finding against the version that was scanned.
    pub fn from_raw(
        slug: &str,
        version: &str,
        raw: RawFinding,
        date_discovered: NaiveDate,
    ) -> Self {
        Self {
            slug: slug.to_string(),
            version: version.to_string(),
            file_path: raw.path,
            check_id: raw.check_id,
            start_line: raw.start_line,
            end_line: raw.end_line,
            vuln_lines: raw.lines,
            message: raw.message,
            date_discovered,
            triaged: false,
        }
    }

    /// Get the natural key of this finding.
    pub fn key(&self) -> FindingKey {
        FindingKey {
            slug: self.slug.clone(),
            version: self.version.clone(),
            file_path: self.file_path.clone(),
            check_id: self.check_id.clone(),
            start_line: self.start_line,
            end_line: self.end_line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_raw_keeps_scanned_version() {
        let raw = RawFinding {
            path: "includes/ajax.php".to_string(),
            check_id: "php.lang.security.injection.tainted-sql-string".to_string(),
            start_line: 10,
            end_line: 12,
            lines: "$wpdb->query($sql);".to_string(),
            message: "Tainted SQL".to_string(),
        };
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        let finding = FindingRecord::from_raw("contact-form", "1.1", raw, date);

        assert_eq!(finding.version, "1.1");
        assert!(!finding.triaged);
        assert_eq!(finding.key().start_line, 10);
        assert_eq!(finding.key().file_path, "includes/ajax.php");
    }

    #[test]
    fn test_new_plugin_record_is_empty() {
        let record = PluginRecord::new("akismet", "5.3");
        assert_eq!(record.slug, "akismet");
        assert!(record.author.is_empty());
        assert!(record.last_updated.is_none());
    }
}
