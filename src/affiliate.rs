use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::comment::AffiliateLink;
use crate::config::AffiliateConfig;

/// One match from the link-search service.
#[derive(Debug, Clone, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "shortURL", default)]
    pub short_url: Option<String>,
}

/// A searchable catalogue of affiliate links.
#[async_trait]
pub trait LinkSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<LinkRecord>>;
}

/// short.io REST client, `GET /links?search=...`
pub struct ShortIoClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ShortIoClient {
    pub fn new(config: &AffiliateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build link-search HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl LinkSearch for ShortIoClient {
    async fn search(&self, query: &str) -> Result<Vec<LinkRecord>> {
        let url = format!("{}/links", self.base_url);
        debug!("Searching links at {} for '{}'", url, query);

        let response = self
            .client
            .get(&url)
            .query(&[("search", query)])
            .header("authorization", &self.api_key)
            .send()
            .await
            .context("Failed to send link search request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Link search error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse link search response")
    }
}

/// Turns a product query into a link, degrading to a fixed fallback.
pub struct AffiliateResolver {
    search: Arc<dyn LinkSearch>,
    fallback_url: String,
}

impl AffiliateResolver {
    pub fn new(search: Arc<dyn LinkSearch>, fallback_url: impl Into<String>) -> Self {
        Self {
            search,
            fallback_url: fallback_url.into(),
        }
    }

    /// Never fails: no match, an upstream error or a bad payload all yield
    /// the fallback URL.
    pub async fn resolve(&self, query: &str) -> AffiliateLink {
        match self.search.search(query).await {
            Ok(records) => {
                let first = records
                    .into_iter()
                    .next()
                    .and_then(|r| r.short_url)
                    .filter(|u| !u.is_empty());
                match first {
                    Some(url) => {
                        info!("Resolved affiliate link for '{}': {}", query, url);
                        AffiliateLink { url }
                    }
                    None => {
                        info!("No affiliate link for '{}', using fallback", query);
                        self.fallback()
                    }
                }
            }
            Err(e) => {
                warn!("Link search for '{}' failed, using fallback: {:#}", query, e);
                self.fallback()
            }
        }
    }

    fn fallback(&self) -> AffiliateLink {
        AffiliateLink {
            url: self.fallback_url.clone(),
        }
    }
}
