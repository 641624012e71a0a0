//! Blocking HTTP client for the WordPress.org plugin API.
//!
//! API reference: <https://developer.wordpress.org/reference/functions/plugins_api/>.
//! Plugins are returned ordered by active installs, descending.

use std::time::Duration;

use tracing::debug;

use super::types::{ApiError, ApiPlugin, QueryResponse};
use super::{PluginSource, RegistryError, RegistryPage, RegistryQuery, RegistryResult};
use crate::artifact::{ArchiveFetcher, ArtifactError, ArtifactResult};
use crate::core::{PluginRecord, RegistryConfig};

/// Default registry endpoint.
pub const DEFAULT_REGISTRY_URL: &str = "https://api.wordpress.org/plugins/info/1.2/";

/// Registry client used for queries and archive downloads.
pub struct RegistryClient {
    /// Registry URL
    base_url: String,

    /// HTTP client
    client: reqwest::blocking::Client,
}

impl RegistryClient {
    /// Create a new registry client.
    pub fn new(config: &RegistryConfig) -> RegistryResult<Self> {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| format!("plugscan/{}", env!("CARGO_PKG_VERSION")));

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(user_agent)
            .build()
            .map_err(|e| RegistryError::Network(e.to_string()))?;

        Ok(Self { base_url: config.base_url.clone(), client })
    }

    /// Get the registry URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl PluginSource for RegistryClient {
    fn query_page(&self, query: &RegistryQuery, page: u32) -> RegistryResult<RegistryPage> {
        let page_param = page.to_string();
        let per_page_param = query.per_page.to_string();
        let params: [(&str, &str); 6] = [
            ("action", "query_plugins"),
            ("request[page]", &page_param),
            ("request[per_page]", &per_page_param),
            ("request[search]", &query.search),
            ("request[author]", &query.author),
            ("request[tag]", &query.tag),
        ];

        debug!(page, url = %self.base_url, "Querying registry");

        let response = self.client.get(&self.base_url).query(&params).send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegistryError::Http {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }

        let body: QueryResponse = response.json()?;

        Ok(RegistryPage {
            page: if body.info.page == 0 { page } else { body.info.page },
            pages: body.info.pages,
            results: body.info.results,
            plugins: body.plugins.into_iter().map(PluginRecord::from).collect(),
        })
    }

    fn plugin_info(&self, slug: &str) -> RegistryResult<PluginRecord> {
        let params = [("action", "plugin_information"), ("request[slug]", slug)];

        debug!(slug, "Fetching current plugin information");

        let response = self.client.get(&self.base_url).query(&params).send()?;

        let status = response.status();
        let body: serde_json::Value = match response.json() {
            Ok(body) => body,
            Err(_) if !status.is_success() => {
                return Err(RegistryError::Http {
                    status: status.as_u16(),
                    url: self.base_url.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        // The API answers unknown slugs with `{"error": "..."}`
        if let Ok(ApiError { error }) = serde_json::from_value::<ApiError>(body.clone()) {
            return Err(RegistryError::NotFound { slug: slug.to_string(), reason: error });
        }

        if !status.is_success() {
            return Err(RegistryError::Http { status: status.as_u16(), url: self.base_url.clone() });
        }

        let plugin: ApiPlugin = serde_json::from_value(body)
            .map_err(|e| RegistryError::InvalidResponse(format!("{slug}: {e}")))?;

        Ok(plugin.into())
    }
}

impl ArchiveFetcher for RegistryClient {
    fn fetch(&self, url: &str) -> ArtifactResult<Vec<u8>> {
        let response =
            self.client.get(url).send().map_err(|e| ArtifactError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ArtifactError::Download(format!(
                "Failed to download {url}: HTTP {}",
                response.status()
            )));
        }

        let bytes = response.bytes().map_err(|e| ArtifactError::Download(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
