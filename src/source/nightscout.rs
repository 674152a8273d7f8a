//! Nightscout Source
//!
//! REST client for a Nightscout server:
//! - `GET {root}/entries.json?count=N&find[date][$lte]=T` for pages of entries
//! - `GET {root}/status.json` for display units and thresholds
//!
//! Page fetches use a longer timeout than single-entry lookups.

use super::*;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Nightscout HTTP source
pub struct NightscoutSource {
    client: Client,
    config: NightscoutConfig,
}

/// Configuration for the Nightscout source
#[derive(Debug, Clone)]
pub struct NightscoutConfig {
    /// Entries endpoint, e.g. "https://example.herokuapp.com/api/v1/entries.json"
    pub entries_url: String,
    /// Timeout for full-page fetches
    pub page_timeout: Duration,
    /// Timeout for single-entry and status lookups
    pub lookup_timeout: Duration,
}

impl Default for NightscoutConfig {
    fn default() -> Self {
        Self {
            entries_url: String::new(),
            page_timeout: Duration::from_secs(30),
            lookup_timeout: Duration::from_secs(10),
        }
    }
}

impl NightscoutConfig {
    /// Create a config for an entries endpoint with default timeouts
    pub fn new(entries_url: impl Into<String>) -> Self {
        Self {
            entries_url: entries_url.into(),
            ..Default::default()
        }
    }

    /// API root derived from the entries URL
    pub fn api_root(&self) -> String {
        self.entries_url
            .replace("/entries.json", "")
            .trim_end_matches('/')
            .to_string()
    }

    /// Status endpoint URL
    pub fn status_url(&self) -> String {
        format!("{}/status.json", self.api_root())
    }
}

impl NightscoutSource {
    /// Create a new Nightscout source
    pub fn new(config: NightscoutConfig) -> Result<Self, SourceError> {
        if config.entries_url.trim().is_empty() {
            return Err(SourceError::NotConfigured(
                "Nightscout URL is not set (NIGHTSCOUT_URL or [source].url)".into(),
            ));
        }

        let client = Client::builder()
            .user_agent(concat!("glucoscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &NightscoutConfig {
        &self.config
    }

    /// GET `url` with query parameters and decode the JSON body
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        timeout: Duration,
    ) -> Result<T, SourceError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_request_error)?;

        if !response.status().is_success() {
            return Err(SourceError::ApiError {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await.map_err(map_request_error)?;
        serde_json::from_str(&body).map_err(|e| SourceError::ParseError(e.to_string()))
    }
}

fn map_request_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Timeout
    } else if e.is_connect() {
        SourceError::Unavailable(e.to_string())
    } else {
        SourceError::Request(e)
    }
}

/// Query parameters for an entries page
fn page_query(count: usize, before: Option<i64>) -> Vec<(&'static str, String)> {
    let mut query = vec![("count", count.to_string())];
    if let Some(before) = before {
        query.push(("find[date][$lte]", before.to_string()));
    }
    query
}

#[async_trait]
impl RemoteSource for NightscoutSource {
    fn name(&self) -> &str {
        "nightscout"
    }

    async fn fetch_entries(
        &self,
        count: usize,
        before: Option<i64>,
    ) -> Result<Vec<RemoteEntry>, SourceError> {
        tracing::debug!(count, before = ?before, "Fetching Nightscout entries page");
        self.get_json(
            &self.config.entries_url,
            &page_query(count, before),
            self.config.page_timeout,
        )
        .await
    }

    async fn fetch_latest(&self) -> Result<Option<RemoteEntry>, SourceError> {
        let entries: Vec<RemoteEntry> = self
            .get_json(
                &self.config.entries_url,
                &page_query(1, None),
                self.config.lookup_timeout,
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn fetch_status(&self) -> Result<ServerStatus, SourceError> {
        self.get_json(&self.config.status_url(), &[], self.config.lookup_timeout)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_root_and_status_url() {
        let config = NightscoutConfig::new("https://cgm.example.com/api/v1/entries.json");
        assert_eq!(config.api_root(), "https://cgm.example.com/api/v1");
        assert_eq!(config.status_url(), "https://cgm.example.com/api/v1/status.json");

        let config = NightscoutConfig::new("https://cgm.example.com/api/v1/");
        assert_eq!(config.api_root(), "https://cgm.example.com/api/v1");
    }

    #[test]
    fn test_default_timeouts() {
        let config = NightscoutConfig::default();
        assert!(config.page_timeout > config.lookup_timeout);
    }

    #[test]
    fn test_page_query() {
        assert_eq!(page_query(10000, None), vec![("count", "10000".to_string())]);
        assert_eq!(
            page_query(5, Some(1705314599999)),
            vec![
                ("count", "5".to_string()),
                ("find[date][$lte]", "1705314599999".to_string())
            ]
        );
    }

    #[test]
    fn test_missing_url_is_rejected() {
        let err = NightscoutSource::new(NightscoutConfig::default()).err().unwrap();
        assert!(matches!(err, SourceError::NotConfigured(_)));
    }
}
