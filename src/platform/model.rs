//! Wire types for the storefront platform's JSON API.
use serde::{Deserialize, Serialize};

fn one() -> i64 {
    1
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub orders: Vec<ApiOrder>,
    #[serde(default = "one")]
    pub number_of_pages: i64,
}

/// An order as the platform serves it. `order_number` is the natural key;
/// records without one are skipped by the synchronizer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiOrder {
    pub order_number: Option<String>,
    pub order_id: Option<i64>,
    pub case_number: Option<String>,
    pub external_order_number: Option<String>,
    pub uuid: Option<String>,
    pub language_id: Option<String>,
    pub currency_id: Option<String>,
    pub status_id: Option<i64>,
    pub status: Option<String>,
    pub paid_date: Option<String>,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
    pub internal_note: Option<String>,
    pub creation_time: Option<String>,
    pub last_update_time: Option<String>,
    pub order_total: Option<f64>,
    pub invoice_number: Option<String>,
    pub admin_url: Option<String>,
    pub customer: Option<serde_json::Value>,
    pub shipment: Option<serde_json::Value>,
    pub payment: Option<serde_json::Value>,
    #[serde(default)]
    pub products: Vec<ApiOrderItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiOrderItem {
    pub uuid: Option<String>,
    pub product_id: Option<i64>,
    pub code: Option<String>,
    pub ean: Option<String>,
    pub title: Option<String>,
    pub quantity: Option<f64>,
    pub price_per_unit: Option<f64>,
    pub price: Option<f64>,
    pub vat: Option<f64>,
    pub weight: Option<f64>,
    pub availability: Option<String>,
    pub stock_position: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProductsPage {
    #[serde(default)]
    pub products: Vec<ApiSimpleProduct>,
    #[serde(default = "one")]
    pub number_of_pages: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSimpleProduct {
    pub code: Option<String>,
    pub product_id: Option<i64>,
    pub availability: Option<String>,
    pub stock: Option<i64>,
    #[serde(default)]
    pub variants: Vec<ApiSimpleVariant>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiSimpleVariant {
    pub code: Option<String>,
    pub variant_id: Option<i64>,
    pub availability: Option<String>,
    pub stock: Option<i64>,
}

/// Body for the batch stock update. Empty sections are serialized as
/// `null`, matching the platform contract.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StockBatchRequest {
    pub products: Option<Vec<StockBatchItem>>,
    pub variants: Option<Vec<StockBatchItem>>,
}

/// One batch entry: absolute target stock for a code.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StockBatchItem {
    pub code: String,
    pub stock: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StockBatchResponse {
    #[serde(default)]
    pub products: Vec<BatchResultItem>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BatchResultItem {
    pub code: Option<String>,
    #[serde(default)]
    pub updated_yn: bool,
    #[serde(default)]
    pub variants: Vec<BatchResultItem>,
}
