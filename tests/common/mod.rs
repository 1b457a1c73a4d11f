#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::Mutex;

use storesync::feed::FeedSource;
use storesync::platform::model::{
    OrdersPage, ProductsPage, StockBatchRequest, StockBatchResponse,
};
use storesync::platform::PlatformApi;

pub async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn orders_page(v: serde_json::Value) -> Result<OrdersPage> {
    Ok(serde_json::from_value(v)?)
}

pub fn products_page(v: serde_json::Value) -> Result<ProductsPage> {
    Ok(serde_json::from_value(v)?)
}

pub fn stock_response(v: serde_json::Value) -> Result<StockBatchResponse> {
    Ok(serde_json::from_value(v)?)
}

/// Platform fake fed with scripted responses, recording every call.
/// Exhausted scripts serve empty pages so pagination terminates.
#[derive(Default)]
pub struct ScriptedPlatform {
    pub orders_pages: Mutex<VecDeque<Result<OrdersPage>>>,
    pub orders_calls: Mutex<Vec<(i64, Option<String>, Option<String>)>>,
    pub products_pages: Mutex<VecDeque<Result<ProductsPage>>>,
    pub products_calls: Mutex<Vec<(i64, Option<String>)>>,
    pub stock_requests: Mutex<Vec<StockBatchRequest>>,
    pub stock_responses: Mutex<VecDeque<Result<StockBatchResponse>>>,
}

impl ScriptedPlatform {
    pub async fn push_orders_page(&self, page: Result<OrdersPage>) {
        self.orders_pages.lock().await.push_back(page);
    }

    pub async fn push_products_page(&self, page: Result<ProductsPage>) {
        self.products_pages.lock().await.push_back(page);
    }

    pub async fn push_stock_response(&self, response: Result<StockBatchResponse>) {
        self.stock_responses.lock().await.push_back(response);
    }

    pub async fn stock_requests(&self) -> Vec<StockBatchRequest> {
        self.stock_requests.lock().await.clone()
    }

    pub async fn products_calls(&self) -> Vec<(i64, Option<String>)> {
        self.products_calls.lock().await.clone()
    }
}

#[async_trait]
impl PlatformApi for ScriptedPlatform {
    async fn get_orders(
        &self,
        page: i64,
        creation_time_from: Option<&str>,
        status_ids: Option<&str>,
    ) -> Result<OrdersPage> {
        self.orders_calls.lock().await.push((
            page,
            creation_time_from.map(String::from),
            status_ids.map(String::from),
        ));
        self.orders_pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| orders_page(serde_json::json!({})))
    }

    async fn get_products_simple(&self, page: i64, codes: Option<&str>) -> Result<ProductsPage> {
        self.products_calls
            .lock()
            .await
            .push((page, codes.map(String::from)));
        self.products_pages
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| products_page(serde_json::json!({})))
    }

    async fn put_product_stocks(&self, batch: &StockBatchRequest) -> Result<StockBatchResponse> {
        self.stock_requests.lock().await.push(batch.clone());
        self.stock_responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| stock_response(serde_json::json!({})))
    }
}

/// Feed fake serving canned XML documents.
pub struct CannedFeed {
    pub full: String,
    pub partial: Option<String>,
}

impl CannedFeed {
    pub fn full_only(full: &str) -> Self {
        Self {
            full: full.to_string(),
            partial: None,
        }
    }

    pub fn with_partial(full: &str, partial: &str) -> Self {
        Self {
            full: full.to_string(),
            partial: Some(partial.to_string()),
        }
    }
}

#[async_trait]
impl FeedSource for CannedFeed {
    async fn fetch_full(&self) -> Result<String> {
        Ok(self.full.clone())
    }

    async fn fetch_partial(&self) -> Result<Option<String>> {
        Ok(self.partial.clone())
    }
}
