//! Metadata ledger: one row per `(slug, version)` ever observed.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{Ledger, LedgerResult};
use crate::core::{compare_versions, FilterEngine, PluginRecord};
use crate::registry::PluginSource;

const PLUGIN_COLUMNS: &str = "slug, version, author, active_installs, downloaded, last_updated, \
                              added_date, download_link, last_time_scanned";

fn plugin_from_row(row: &Row<'_>) -> rusqlite::Result<PluginRecord> {
    Ok(PluginRecord {
        slug: row.get(0)?,
        version: row.get(1)?,
        author: row.get(2)?,
        active_installs: row.get::<_, i64>(3)? as u64,
        downloaded: row.get::<_, i64>(4)? as u64,
        last_updated: row.get(5)?,
        added_date: row.get(6)?,
        download_link: row.get(7)?,
        last_time_scanned: row.get(8)?,
    })
}

impl Ledger {
    /// Insert a plugin record, or update the mutable fields of an existing one.
    ///
    /// Optional fields that are missing from `record` never erase stored values.
    pub fn upsert_plugin(&self, record: &PluginRecord) -> LedgerResult<()> {
        self.conn().execute(
            r#"
            INSERT INTO Plugins (slug, version, author, active_installs, downloaded,
                                 last_updated, added_date, download_link, last_time_scanned)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(slug, version) DO UPDATE SET
                author            = excluded.author,
                active_installs   = excluded.active_installs,
                downloaded        = excluded.downloaded,
                last_updated      = COALESCE(excluded.last_updated, Plugins.last_updated),
                added_date        = COALESCE(excluded.added_date, Plugins.added_date),
                download_link     = excluded.download_link,
                last_time_scanned = COALESCE(excluded.last_time_scanned, Plugins.last_time_scanned)
            "#,
            params![
                record.slug,
                record.version,
                record.author,
                record.active_installs as i64,
                record.downloaded as i64,
                record.last_updated,
                record.added_date,
                record.download_link,
                record.last_time_scanned,
            ],
        )?;
        Ok(())
    }

    /// Record a version seen only on disk, leaving any existing row untouched.
    ///
    /// Returns `true` if a new row was created.
    pub fn ensure_plugin(&self, slug: &str, version: &str) -> LedgerResult<bool> {
        let inserted = self.conn().execute(
            "INSERT OR IGNORE INTO Plugins (slug, version) VALUES (?1, ?2)",
            params![slug, version],
        )?;
        Ok(inserted > 0)
    }

    /// Get a single plugin version.
    pub fn plugin(&self, slug: &str, version: &str) -> LedgerResult<Option<PluginRecord>> {
        let sql = format!("SELECT {PLUGIN_COLUMNS} FROM Plugins WHERE slug = ?1 AND version = ?2");
        let record =
            self.conn().query_row(&sql, params![slug, version], plugin_from_row).optional()?;
        Ok(record)
    }

    /// All known versions of a plugin, oldest first.
    pub fn plugin_versions(&self, slug: &str) -> LedgerResult<Vec<PluginRecord>> {
        let sql = format!("SELECT {PLUGIN_COLUMNS} FROM Plugins WHERE slug = ?1");
        let mut stmt = self.conn().prepare(&sql)?;
        let mut records =
            stmt.query_map(params![slug], plugin_from_row)?.collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| compare_versions(&a.version, &b.version));
        Ok(records)
    }

    /// Latest known version of a plugin.
    pub fn latest_plugin(&self, slug: &str) -> LedgerResult<Option<PluginRecord>> {
        Ok(self.plugin_versions(slug)?.pop())
    }

    /// List plugin rows, optionally restricted to one slug, ordered by slug.
    pub fn plugins(&self, slug: Option<&str>) -> LedgerResult<Vec<PluginRecord>> {
        let mut records = match slug {
            Some(slug) => self.plugin_versions(slug)?,
            None => {
                let sql = format!("SELECT {PLUGIN_COLUMNS} FROM Plugins ORDER BY slug");
                let mut stmt = self.conn().prepare(&sql)?;
                let rows = stmt.query_map([], plugin_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        records.sort_by(|a, b| {
            a.slug.cmp(&b.slug).then_with(|| compare_versions(&a.version, &b.version))
        });
        Ok(records)
    }

    /// Select plugins from stored data using the local filter predicates.
    ///
    /// The latest version of each slug that carries registry metadata is
    /// checked. Rows only ever seen on disk have no update date or install
    /// count, so they are used only for slugs the registry never described.
    /// Results are ordered like the registry orders them, by active installs
    /// descending.
    pub fn query_plugins(&self, filter: &FilterEngine) -> LedgerResult<Vec<PluginRecord>> {
        let mut latest: BTreeMap<String, PluginRecord> = BTreeMap::new();
        for record in self.plugins(None)? {
            // `plugins` sorts versions ascending, so a later row replaces an
            // earlier one unless it would hide registry metadata
            let keep_current = latest.get(&record.slug).is_some_and(|current| {
                current.last_updated.is_some() && record.last_updated.is_none()
            });
            if !keep_current {
                latest.insert(record.slug.clone(), record);
            }
        }

        let mut admitted: Vec<PluginRecord> = latest
            .into_values()
            .filter(|record| match filter.check(record) {
                Ok(()) => true,
                Err(reason) => {
                    tracing::debug!(slug = %record.slug, %reason, "Skipping stored plugin");
                    false
                }
            })
            .collect();

        admitted.sort_by(|a, b| {
            b.active_installs.cmp(&a.active_installs).then_with(|| a.slug.cmp(&b.slug))
        });
        Ok(admitted)
    }

    /// Re-query the registry for the current record of a plugin and store it.
    pub fn refresh_latest(
        &self,
        source: &dyn PluginSource,
        slug: &str,
    ) -> LedgerResult<PluginRecord> {
        let current = source.plugin_info(slug)?;
        self.upsert_plugin(&current)?;
        Ok(current)
    }

    /// Set the last scan date of a plugin version.
    pub fn mark_scanned(&self, slug: &str, version: &str, date: NaiveDate) -> LedgerResult<bool> {
        let updated = self.conn().execute(
            "UPDATE Plugins SET last_time_scanned = ?3 WHERE slug = ?1 AND version = ?2",
            params![slug, version, date],
        )?;
        Ok(updated > 0)
    }

    /// Number of plugin rows.
    pub fn plugin_count(&self) -> LedgerResult<usize> {
        let count: i64 = self.conn().query_row("SELECT COUNT(*) FROM Plugins", [], |r| r.get(0))?;
        Ok(count as usize)
    }
}
