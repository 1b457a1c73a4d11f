use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::settings::{SettingsProvider, PRODUCTS_FULL_FEED_URL, PRODUCTS_PARTIAL_FEED_URL};

pub mod parser;

/// Bulk feed downloads are slow; allow minutes rather than seconds.
const FEED_TIMEOUT: Duration = Duration::from_secs(180);

/// Seam for the XML feed downloads, so the engine and the job worker can
/// be driven with canned documents in tests.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch_full(&self) -> Result<String>;

    /// `Ok(None)` when the partial feed is not configured.
    async fn fetch_partial(&self) -> Result<Option<String>>;
}

pub struct FeedClient {
    http: Client,
    full_url: String,
    partial_url: Option<String>,
}

impl fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedClient")
            .field("full_url", &self.full_url)
            .field("partial_url", &self.partial_url)
            .finish()
    }
}

impl FeedClient {
    pub fn from_settings(settings: &dyn SettingsProvider) -> Result<Self> {
        let full_url = settings
            .get(PRODUCTS_FULL_FEED_URL)
            .ok_or_else(|| anyhow!("full product feed URL missing from settings"))?;
        let partial_url = settings.get(PRODUCTS_PARTIAL_FEED_URL);
        let http = Client::builder()
            .user_agent("storesync/0.1")
            .timeout(FEED_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            full_url,
            partial_url,
        })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let res = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to download feed from {url}"))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(anyhow!("feed download error {status} from {url}: {body}"));
        }
        let body = res.text().await.context("failed to read feed body")?;
        info!(url, bytes = body.len(), "downloaded product feed");
        Ok(body)
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_full(&self) -> Result<String> {
        self.fetch(&self.full_url).await
    }

    async fn fetch_partial(&self) -> Result<Option<String>> {
        match &self.partial_url {
            Some(url) => Ok(Some(self.fetch(url).await?)),
            None => {
                warn!("partial product feed URL is not configured; skipping");
                Ok(None)
            }
        }
    }
}
