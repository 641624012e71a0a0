//! Registry API payloads and their conversion into ledger records.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::core::PluginRecord;

/// Version recorded when the registry omits one.
const UNKNOWN_VERSION: &str = "NA";

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Response of the `query_plugins` action.
#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    pub info: QueryInfo,

    #[serde(default)]
    pub plugins: Vec<ApiPlugin>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryInfo {
    #[serde(default)]
    pub page: u32,

    #[serde(default)]
    pub pages: u32,

    #[serde(default, deserialize_with = "lenient_count")]
    pub results: u64,
}

/// Error body returned by the `plugin_information` action.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiError {
    pub error: String,
}

/// A plugin as returned by the registry.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiPlugin {
    pub slug: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub author: String,

    #[serde(default, deserialize_with = "lenient_count")]
    pub active_installs: u64,

    #[serde(default, deserialize_with = "lenient_count")]
    pub downloaded: u64,

    #[serde(default)]
    pub last_updated: Option<String>,

    #[serde(default)]
    pub added: Option<String>,

    #[serde(default)]
    pub download_link: String,
}

impl From<ApiPlugin> for PluginRecord {
    fn from(plugin: ApiPlugin) -> Self {
        let last_updated = plugin.last_updated.as_deref().and_then(parse_last_updated);
        if last_updated.is_none() {
            tracing::debug!(
                slug = %plugin.slug,
                raw = ?plugin.last_updated,
                "Invalid last_updated format"
            );
        }

        Self {
            version: plugin
                .version
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            author: HTML_TAG.replace_all(&plugin.author, "").trim().to_string(),
            active_installs: plugin.active_installs,
            downloaded: plugin.downloaded,
            last_updated,
            added_date: plugin.added.as_deref().and_then(parse_added_date),
            download_link: plugin.download_link,
            last_time_scanned: None,
            slug: plugin.slug,
        }
    }
}

/// Counts arrive as numbers, numeric strings or null depending on the endpoint.
fn lenient_count<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Parse a registry `last_updated` value such as `2024-05-28 2:14pm GMT`.
///
/// Timestamps are treated as UTC. RFC 3339 and `%Y-%m-%d %H:%M:%S` are
/// accepted as well.
pub fn parse_last_updated(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    let without_zone = trimmed.strip_suffix("GMT").or_else(|| trimmed.strip_suffix("UTC"));
    let candidate = without_zone.unwrap_or(trimmed).trim();

    NaiveDateTime::parse_from_str(candidate, "%Y-%m-%d %I:%M%p")
        .or_else(|_| NaiveDateTime::parse_from_str(candidate, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(trimmed).ok().map(|dt| dt.naive_utc()))
}

/// Parse a registry `added` date (`YYYY-MM-DD`).
pub fn parse_added_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_parse_registry_timestamp() {
        let parsed = parse_last_updated("2024-05-28 2:14pm GMT").unwrap();
        assert_eq!(parsed.date(), NaiveDate::from_ymd_opt(2024, 5, 28).unwrap());
        assert_eq!(parsed.hour(), 14);
        assert_eq!(parsed.minute(), 14);

        let morning = parse_last_updated("2023-01-02 09:05am GMT").unwrap();
        assert_eq!(morning.hour(), 9);
    }

    #[test]
    fn test_parse_alternative_timestamps() {
        assert!(parse_last_updated("2024-05-28 14:14:00").is_some());
        assert!(parse_last_updated("2024-05-28T14:14:00Z").is_some());
        assert!(parse_last_updated("yesterday").is_none());
    }

    #[test]
    fn test_query_response_conversion() {
        let body = r#"{
            "info": {"page": 1, "pages": 3, "results": 61},
            "plugins": [{
                "slug": "contact-form-7",
                "version": "5.9.6",
                "author": "<a href=\"https://ideasilo.wordpress.com/\">Takayuki Miyoshi</a>",
                "active_installs": 10000000,
                "downloaded": "312345678",
                "last_updated": "2024-06-18 5:02am GMT",
                "added": "2007-08-02",
                "download_link": "https://downloads.wordpress.org/plugin/contact-form-7.5.9.6.zip"
            }]
        }"#;

        let response: QueryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.info.pages, 3);
        assert_eq!(response.info.results, 61);

        let record: PluginRecord = response.plugins.into_iter().next().unwrap().into();
        assert_eq!(record.slug, "contact-form-7");
        assert_eq!(record.version, "5.9.6");
        assert_eq!(record.author, "Takayuki Miyoshi");
        assert_eq!(record.active_installs, 10_000_000);
        assert_eq!(record.downloaded, 312_345_678);
        assert!(record.last_updated.is_some());
        assert_eq!(record.added_date, NaiveDate::from_ymd_opt(2007, 8, 2));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let plugin: ApiPlugin = serde_json::from_str(r#"{"slug": "bare", "active_installs": null}"#).unwrap();
        let record = PluginRecord::from(plugin);
        assert_eq!(record.version, "NA");
        assert_eq!(record.active_installs, 0);
        assert!(record.last_updated.is_none());
    }
}
