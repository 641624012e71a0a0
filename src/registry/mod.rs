//! Plugin registry access.
//!
//! The registry is queried page by page with the string filters applied
//! server-side. A second endpoint returns the current metadata of a single
//! plugin, which is what drift detection compares against.

mod client;
mod error;
mod types;

pub use client::{RegistryClient, DEFAULT_REGISTRY_URL};
pub use error::{RegistryError, RegistryResult};
pub use types::{parse_added_date, parse_last_updated};

use crate::core::{FilterConfig, PluginRecord};

/// Server-side query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryQuery {
    /// Free-text search term
    pub search: String,

    /// Author username
    pub author: String,

    /// Tag
    pub tag: String,

    /// Results per page
    pub per_page: u32,
}

impl RegistryQuery {
    /// Build a query from the string filters of a filter configuration.
    pub fn from_filter(filter: &FilterConfig, per_page: u32) -> Self {
        Self {
            search: filter.search.clone(),
            author: filter.author.clone(),
            tag: filter.tag.clone(),
            per_page,
        }
    }
}

/// One page of registry results, in registry order.
#[derive(Debug, Clone, Default)]
pub struct RegistryPage {
    /// Current page (1-based)
    pub page: u32,

    /// Total number of pages
    pub pages: u32,

    /// Total number of matching plugins
    pub results: u64,

    /// Plugins on this page
    pub plugins: Vec<PluginRecord>,
}

/// A source of registry data.
pub trait PluginSource {
    /// Fetch one page of plugins matching the query.
    fn query_page(&self, query: &RegistryQuery, page: u32) -> RegistryResult<RegistryPage>;

    /// Fetch the current record of a single plugin.
    fn plugin_info(&self, slug: &str) -> RegistryResult<PluginRecord>;
}
