use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

use crate::settings::{
    SettingsProvider, PLATFORM_API_BASE_URL, PLATFORM_API_KEY, PLATFORM_API_LOGIN,
};
use model::{OrdersPage, ProductsPage, StockBatchRequest, StockBatchResponse};

pub mod model;

const API_TIMEOUT: Duration = Duration::from_secs(30);

/// Seam between the sync engine and the storefront platform. Tests swap
/// in recording fakes; production uses [`PlatformClient`].
#[async_trait]
pub trait PlatformApi: Send + Sync {
    async fn get_orders(
        &self,
        page: i64,
        creation_time_from: Option<&str>,
        status_ids: Option<&str>,
    ) -> Result<OrdersPage>;

    async fn get_products_simple(&self, page: i64, codes: Option<&str>) -> Result<ProductsPage>;

    async fn put_product_stocks(&self, batch: &StockBatchRequest) -> Result<StockBatchResponse>;
}

#[derive(Clone)]
pub struct PlatformClient {
    http: Client,
    base_url: Url,
    api_login: String,
    api_key: String,
}

impl fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl PlatformClient {
    /// Construct from the settings provider. Missing base URL or
    /// credentials are a fatal configuration error; nothing is attempted
    /// without them.
    pub fn from_settings(settings: &dyn SettingsProvider) -> Result<Self> {
        let base_url = settings
            .get(PLATFORM_API_BASE_URL)
            .ok_or_else(|| anyhow!("platform API base URL missing from settings"))?;
        let api_login = settings
            .get(PLATFORM_API_LOGIN)
            .ok_or_else(|| anyhow!("platform API login missing from settings"))?;
        let api_key = settings
            .get(PLATFORM_API_KEY)
            .ok_or_else(|| anyhow!("platform API key missing from settings"))?;

        // Url::join treats a base without a trailing slash as a file path
        // and would drop its last segment.
        let base_url = if base_url.ends_with('/') {
            base_url
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&base_url).context("invalid platform API base URL")?;
        let http = Client::builder()
            .user_agent("storesync/0.1")
            .timeout(API_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_login,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let res = self
            .http
            .get(url.clone())
            .basic_auth(&self.api_login, Some(&self.api_key))
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("failed to reach platform API at {url}"))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%url, %status, "platform API error: {}", body);
            return Err(anyhow!("platform API error {status}: {body}"));
        }
        res.json::<T>()
            .await
            .context("invalid platform API response JSON")
    }

    /// Number of items per response page is dictated by the server; we
    /// only carry the page cursor and filters.
    pub async fn get_orders(
        &self,
        page: i64,
        creation_time_from: Option<&str>,
        status_ids: Option<&str>,
    ) -> Result<OrdersPage> {
        let mut url = self.endpoint("orders")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            if let Some(from) = creation_time_from {
                query.append_pair("creation_time_from", from);
            }
            if let Some(ids) = status_ids {
                query.append_pair("status_ids", ids);
            }
        }
        self.get_json(url).await
    }

    pub async fn get_products_simple(&self, page: i64, codes: Option<&str>) -> Result<ProductsPage> {
        let mut url = self.endpoint("products/simple")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            if let Some(codes) = codes {
                query.append_pair("codes", codes);
            }
        }
        self.get_json(url).await
    }

    pub async fn put_product_stocks(
        &self,
        batch: &StockBatchRequest,
    ) -> Result<StockBatchResponse> {
        let url = self.endpoint("products")?;
        info!(%url, "sending batch stock update");
        let res = self
            .http
            .put(url.clone())
            .basic_auth(&self.api_login, Some(&self.api_key))
            .json(batch)
            .send()
            .await
            .with_context(|| format!("failed to reach platform API at {url}"))?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!(%url, %status, "batch stock update rejected: {}", body);
            return Err(anyhow!("platform API error {status}: {body}"));
        }
        res.json::<StockBatchResponse>()
            .await
            .context("invalid batch stock update response JSON")
    }
}

#[async_trait]
impl PlatformApi for PlatformClient {
    async fn get_orders(
        &self,
        page: i64,
        creation_time_from: Option<&str>,
        status_ids: Option<&str>,
    ) -> Result<OrdersPage> {
        PlatformClient::get_orders(self, page, creation_time_from, status_ids).await
    }

    async fn get_products_simple(&self, page: i64, codes: Option<&str>) -> Result<ProductsPage> {
        PlatformClient::get_products_simple(self, page, codes).await
    }

    async fn put_product_stocks(&self, batch: &StockBatchRequest) -> Result<StockBatchResponse> {
        PlatformClient::put_product_stocks(self, batch).await
    }
}
