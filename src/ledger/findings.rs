//! Finding ledger.
//!
//! Findings are keyed by `(slug, version, file_path, check_id, start_line,
//! end_line)`. The `triaged` flag only ever moves to `false` through an
//! explicit [`Ledger::set_triaged`] call or a full clear.

use std::collections::HashMap;

use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::Serialize;

use super::{Ledger, LedgerResult};
use crate::core::{FindingKey, FindingRecord};

const FINDING_COLUMNS: &str = "slug, version, file_path, check_id, start_line, end_line, \
                               vuln_lines, message, date_discovered, triaged";

/// Outcome of a finding upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingWrite {
    /// The finding was new.
    Inserted,
    /// The finding already existed; its triage flag was kept.
    Updated,
}

/// Filters for listing findings.
#[derive(Debug, Clone, Default)]
pub struct FindingQuery {
    /// Restrict to one plugin
    pub slug: Option<String>,

    /// Restrict to one version
    pub version: Option<String>,

    /// Only findings not yet triaged
    pub untriaged_only: bool,

    /// Only findings recorded against an outdated version
    pub outdated_only: bool,
}

/// A finding together with its currency relative to the metadata ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FindingView {
    #[serde(flatten)]
    pub finding: FindingRecord,

    /// Latest version of the plugin known to the ledger
    pub latest_version: Option<String>,

    /// The finding was recorded against an older version than the latest known one
    pub outdated: bool,
}

fn finding_from_row(row: &Row<'_>) -> rusqlite::Result<FindingRecord> {
    Ok(FindingRecord {
        slug: row.get(0)?,
        version: row.get(1)?,
        file_path: row.get(2)?,
        check_id: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        vuln_lines: row.get(6)?,
        message: row.get(7)?,
        date_discovered: row.get(8)?,
        triaged: row.get(9)?,
    })
}

impl Ledger {
    /// Record a finding, preserving an existing `triaged = true`.
    ///
    /// The first discovery date is kept; the excerpt and message are refreshed.
    pub fn upsert_finding(&self, finding: &FindingRecord) -> LedgerResult<FindingWrite> {
        let existed = self.finding(&finding.key())?.is_some();

        self.conn().execute(
            r#"
            INSERT INTO Audit (slug, version, file_path, check_id, start_line, end_line,
                               vuln_lines, message, date_discovered, triaged)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(slug, version, file_path, check_id, start_line, end_line) DO UPDATE SET
                vuln_lines = excluded.vuln_lines,
                message    = excluded.message,
                triaged    = (Audit.triaged OR excluded.triaged)
            "#,
            params![
                finding.slug,
                finding.version,
                finding.file_path,
                finding.check_id,
                finding.start_line,
                finding.end_line,
                finding.vuln_lines,
                finding.message,
                finding.date_discovered,
                finding.triaged,
            ],
        )?;

        Ok(if existed { FindingWrite::Updated } else { FindingWrite::Inserted })
    }

    /// Get a finding by its natural key.
    pub fn finding(&self, key: &FindingKey) -> LedgerResult<Option<FindingRecord>> {
        let sql = format!(
            "SELECT {FINDING_COLUMNS} FROM Audit WHERE slug = ?1 AND version = ?2 \
             AND file_path = ?3 AND check_id = ?4 AND start_line = ?5 AND end_line = ?6"
        );
        let finding = self
            .conn()
            .query_row(
                &sql,
                params![
                    key.slug,
                    key.version,
                    key.file_path,
                    key.check_id,
                    key.start_line,
                    key.end_line
                ],
                finding_from_row,
            )
            .optional()?;
        Ok(finding)
    }

    /// Delete every finding, regardless of plugin.
    ///
    /// Returns the number of findings removed.
    pub fn clear_findings(&self) -> LedgerResult<usize> {
        let removed = self.conn().execute("DELETE FROM Audit", [])?;
        Ok(removed)
    }

    /// Set or clear the triage flag of a finding.
    ///
    /// Returns `false` if no such finding exists.
    pub fn set_triaged(&self, key: &FindingKey, triaged: bool) -> LedgerResult<bool> {
        let updated = self.conn().execute(
            "UPDATE Audit SET triaged = ?7 WHERE slug = ?1 AND version = ?2 \
             AND file_path = ?3 AND check_id = ?4 AND start_line = ?5 AND end_line = ?6",
            params![
                key.slug,
                key.version,
                key.file_path,
                key.check_id,
                key.start_line,
                key.end_line,
                triaged
            ],
        )?;
        Ok(updated > 0)
    }

    /// List findings, flagging those recorded against an outdated version.
    pub fn findings(&self, query: &FindingQuery) -> LedgerResult<Vec<FindingView>> {
        let mut clauses = Vec::new();
        let mut values: Vec<&str> = Vec::new();

        if let Some(slug) = &query.slug {
            values.push(slug);
            clauses.push(format!("slug = ?{}", values.len()));
        }
        if let Some(version) = &query.version {
            values.push(version);
            clauses.push(format!("version = ?{}", values.len()));
        }
        if query.untriaged_only {
            clauses.push("triaged = 0".to_string());
        }

        let mut sql = format!("SELECT {FINDING_COLUMNS} FROM Audit");
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY slug, version, file_path, start_line, check_id");

        let mut stmt = self.conn().prepare(&sql)?;
        let findings = stmt
            .query_map(params_from_iter(values.iter()), finding_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        let mut latest: HashMap<String, Option<String>> = HashMap::new();
        let mut views = Vec::with_capacity(findings.len());
        for finding in findings {
            let latest_version = match latest.get(&finding.slug) {
                Some(known) => known.clone(),
                None => {
                    let known = self.latest_plugin(&finding.slug)?.map(|r| r.version);
                    latest.insert(finding.slug.clone(), known.clone());
                    known
                }
            };
            let outdated = latest_version.as_deref().is_some_and(|v| v != finding.version);

            if query.outdated_only && !outdated {
                continue;
            }
            views.push(FindingView { finding, latest_version, outdated });
        }

        Ok(views)
    }

    /// Number of findings.
    pub fn finding_count(&self) -> LedgerResult<usize> {
        let count: i64 = self.conn().query_row("SELECT COUNT(*) FROM Audit", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PluginRecord;
    use chrono::NaiveDate;

    fn finding(slug: &str, version: &str, check_id: &str, line: u32) -> FindingRecord {
        FindingRecord {
            slug: slug.to_string(),
            version: version.to_string(),
            file_path: "admin/settings.php".to_string(),
            check_id: check_id.to_string(),
            start_line: line,
            end_line: line + 2,
            vuln_lines: "echo $_GET['tab'];".to_string(),
            message: "Reflected XSS".to_string(),
            date_discovered: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            triaged: false,
        }
    }

    #[test]
    fn test_triaged_flag_is_sticky() {
        let ledger = Ledger::open_in_memory().unwrap();
        let xss = finding("forms", "1.1", "php.xss", 40);

        assert_eq!(ledger.upsert_finding(&xss).unwrap(), FindingWrite::Inserted);
        assert!(ledger.set_triaged(&xss.key(), true).unwrap());

        // Re-running the scan reproduces the same finding untriaged
        let mut rerun = xss.clone();
        rerun.date_discovered = NaiveDate::from_ymd_opt(2024, 7, 1).unwrap();
        assert_eq!(ledger.upsert_finding(&rerun).unwrap(), FindingWrite::Updated);

        let stored = ledger.finding(&xss.key()).unwrap().unwrap();
        assert!(stored.triaged);
        assert_eq!(stored.date_discovered, xss.date_discovered);
        assert_eq!(ledger.finding_count().unwrap(), 1);
    }

    #[test]
    fn test_explicit_untriage() {
        let ledger = Ledger::open_in_memory().unwrap();
        let xss = finding("forms", "1.1", "php.xss", 40);
        ledger.upsert_finding(&xss).unwrap();
        ledger.set_triaged(&xss.key(), true).unwrap();

        assert!(ledger.set_triaged(&xss.key(), false).unwrap());
        assert!(!ledger.finding(&xss.key()).unwrap().unwrap().triaged);
    }

    #[test]
    fn test_set_triaged_unknown_finding() {
        let ledger = Ledger::open_in_memory().unwrap();
        let key = finding("forms", "1.1", "php.xss", 40).key();
        assert!(!ledger.set_triaged(&key, true).unwrap());
    }

    #[test]
    fn test_line_range_is_part_of_the_key() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.upsert_finding(&finding("forms", "1.1", "php.xss", 40)).unwrap();
        ledger.upsert_finding(&finding("forms", "1.1", "php.xss", 80)).unwrap();
        ledger.upsert_finding(&finding("forms", "1.2", "php.xss", 40)).unwrap();

        assert_eq!(ledger.finding_count().unwrap(), 3);
    }

    #[test]
    fn test_clear_removes_everything() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.upsert_finding(&finding("forms", "1.1", "php.xss", 1)).unwrap();
        ledger.upsert_finding(&finding("gallery", "3.0", "php.sqli", 2)).unwrap();

        assert_eq!(ledger.clear_findings().unwrap(), 2);
        assert_eq!(ledger.finding_count().unwrap(), 0);
    }

    #[test]
    fn test_findings_flag_outdated_versions() {
        let ledger = Ledger::open_in_memory().unwrap();
        ledger.upsert_plugin(&PluginRecord::new("forms", "1.1")).unwrap();
        ledger.upsert_plugin(&PluginRecord::new("forms", "1.2")).unwrap();
        ledger.upsert_plugin(&PluginRecord::new("gallery", "3.0")).unwrap();
        ledger.upsert_finding(&finding("forms", "1.1", "php.xss", 1)).unwrap();
        ledger.upsert_finding(&finding("gallery", "3.0", "php.sqli", 2)).unwrap();
        ledger.upsert_finding(&finding("orphan", "0.1", "php.rce", 3)).unwrap();

        let all = ledger.findings(&FindingQuery::default()).unwrap();
        assert_eq!(all.len(), 3);

        let forms = all.iter().find(|v| v.finding.slug == "forms").unwrap();
        assert!(forms.outdated);
        assert_eq!(forms.latest_version.as_deref(), Some("1.2"));

        let gallery = all.iter().find(|v| v.finding.slug == "gallery").unwrap();
        assert!(!gallery.outdated);

        // No metadata at all is not treated as drift
        let orphan = all.iter().find(|v| v.finding.slug == "orphan").unwrap();
        assert!(!orphan.outdated);
        assert!(orphan.latest_version.is_none());

        let outdated =
            ledger.findings(&FindingQuery { outdated_only: true, ..FindingQuery::default() }).unwrap();
        assert_eq!(outdated.len(), 1);
    }

    #[test]
    fn test_findings_filters() {
        let ledger = Ledger::open_in_memory().unwrap();
        let a = finding("forms", "1.1", "php.xss", 1);
        ledger.upsert_finding(&a).unwrap();
        ledger.upsert_finding(&finding("forms", "1.1", "php.sqli", 5)).unwrap();
        ledger.upsert_finding(&finding("gallery", "3.0", "php.sqli", 2)).unwrap();
        ledger.set_triaged(&a.key(), true).unwrap();

        let forms = ledger
            .findings(&FindingQuery { slug: Some("forms".to_string()), ..FindingQuery::default() })
            .unwrap();
        assert_eq!(forms.len(), 2);

        let open = ledger
            .findings(&FindingQuery {
                slug: Some("forms".to_string()),
                version: Some("1.1".to_string()),
                untriaged_only: true,
                ..FindingQuery::default()
            })
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].finding.check_id, "php.sqli");
    }
}
