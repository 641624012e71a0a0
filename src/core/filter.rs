//! Local admission predicates for candidate plugins.
//!
//! The registry API cannot filter on recency or popularity, so those two
//! predicates run here. String filters (author, tag, search) are forwarded
//! to the registry instead.

use std::fmt;

use chrono::{Months, NaiveDateTime, Utc};

use super::{FilterConfig, PluginRecord};

/// Why a candidate was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Last update is older than the configured window.
    Stale { last_updated: NaiveDateTime, max_months: u32 },

    /// Not enough active installs.
    NotEnoughInstalls { actual: u64, required: u64 },

    /// The registry did not provide a usable last update timestamp.
    UnknownLastUpdated,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stale { last_updated, max_months } => write!(
                f,
                "updated last time on {}, more than {} months ago",
                last_updated.format("%Y-%m-%d"),
                max_months
            ),
            Self::NotEnoughInstalls { actual, required } => {
                write!(f, "not enough active installs: {actual}/{required}")
            }
            Self::UnknownLastUpdated => write!(f, "unparseable last_updated"),
        }
    }
}

/// Applies the recency and popularity predicates.
#[derive(Debug, Clone)]
pub struct FilterEngine {
    config: FilterConfig,
    now: NaiveDateTime,
}

impl FilterEngine {
    /// Create a filter evaluated against the current UTC time.
    pub fn new(config: FilterConfig) -> Self {
        Self::with_now(config, Utc::now().naive_utc())
    }

    /// Create a filter evaluated against a fixed point in time.
    pub fn with_now(config: FilterConfig, now: NaiveDateTime) -> Self {
        Self { config, now }
    }

    /// Get the filter configuration.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Decide whether a candidate is admitted.
    pub fn check(&self, record: &PluginRecord) -> Result<(), Rejection> {
        let last_updated = record.last_updated.ok_or(Rejection::UnknownLastUpdated)?;

        let max_months = self.config.max_months_since_update;
        // Overflowing the calendar means the window is effectively unbounded
        if let Some(deadline) = last_updated.checked_add_months(Months::new(max_months)) {
            if deadline < self.now {
                return Err(Rejection::Stale { last_updated, max_months });
            }
        }

        let required = self.config.min_active_installs;
        if record.active_installs < required {
            return Err(Rejection::NotEnoughInstalls { actual: record.active_installs, required });
        }

        Ok(())
    }

    /// Check if a candidate is admitted.
    pub fn admits(&self, record: &PluginRecord) -> bool {
        self.check(record).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 15).unwrap().and_hms_opt(12, 0, 0).unwrap()
    }

    fn months_ago(months: u32) -> NaiveDateTime {
        now().checked_sub_months(Months::new(months)).unwrap()
    }

    fn candidate(slug: &str, installs: u64, last_updated: NaiveDateTime) -> PluginRecord {
        let mut record = PluginRecord::new(slug, "1.0");
        record.active_installs = installs;
        record.last_updated = Some(last_updated);
        record
    }

    fn engine(max_months: u32, min_installs: u64) -> FilterEngine {
        FilterEngine::with_now(
            FilterConfig {
                max_months_since_update: max_months,
                min_active_installs: min_installs,
                ..FilterConfig::default()
            },
            now(),
        )
    }

    #[test]
    fn test_scenario_installs_and_recency() {
        let filter = engine(12, 500);

        let unpopular = candidate("tiny-widget", 30, months_ago(1));
        let rejection = filter.check(&unpopular).unwrap_err();
        assert_eq!(rejection, Rejection::NotEnoughInstalls { actual: 30, required: 500 });
        assert_eq!(rejection.to_string(), "not enough active installs: 30/500");

        let popular = candidate("seo-tools", 2000, months_ago(3));
        assert!(filter.admits(&popular));
    }

    #[test]
    fn test_recency_boundary() {
        let filter = engine(12, 0);

        assert!(filter.admits(&candidate("edge", 0, months_ago(12))));

        let stale = candidate("old", 0, months_ago(12) - chrono::Duration::minutes(1));
        assert!(matches!(filter.check(&stale), Err(Rejection::Stale { max_months: 12, .. })));
    }

    #[test]
    fn test_predicates_are_conjunctive() {
        let filter = engine(24, 50);

        for (installs, age, expected) in
            [(50, 0, true), (49, 0, false), (5000, 25, false), (5000, 24, true), (0, 30, false)]
        {
            let record = candidate("p", installs, months_ago(age));
            assert_eq!(filter.admits(&record), expected, "installs={installs} age={age}");
        }
    }

    #[test]
    fn test_missing_last_updated_is_rejected() {
        let filter = engine(24, 0);
        let record = PluginRecord::new("no-date", "1.0");
        assert_eq!(filter.check(&record), Err(Rejection::UnknownLastUpdated));
    }

    #[test]
    fn test_defaults() {
        let filter = FilterEngine::new(FilterConfig::default());
        assert_eq!(filter.config().max_months_since_update, 24);
        assert_eq!(filter.config().min_active_installs, 50);
    }
}
