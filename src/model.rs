use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a stock adjustment. `Pending` rows may be coalesced,
/// cancelled or deleted; once a run claims a row (`Processing`) it only
/// moves to a terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AdjustmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl AdjustmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentStatus::Pending => "pending",
            AdjustmentStatus::Processing => "processing",
            AdjustmentStatus::Completed => "completed",
            AdjustmentStatus::Failed => "failed",
            AdjustmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(AdjustmentStatus::Pending),
            "processing" => Some(AdjustmentStatus::Processing),
            "completed" => Some(AdjustmentStatus::Completed),
            "failed" => Some(AdjustmentStatus::Failed),
            "cancelled" => Some(AdjustmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AdjustmentStatus::Completed | AdjustmentStatus::Failed | AdjustmentStatus::Cancelled
        )
    }
}

/// Internal fulfillment state of an order. Owned by the warehouse flow,
/// never written by the synchronizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FulfillmentStatus {
    Processing,
    Packed,
    Completed,
    Cancelled,
    Error,
}

impl FulfillmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentStatus::Processing => "processing",
            FulfillmentStatus::Packed => "packed",
            FulfillmentStatus::Completed => "completed",
            FulfillmentStatus::Cancelled => "cancelled",
            FulfillmentStatus::Error => "error",
        }
    }
}

/// Catalog product mirrored from the external platform. `code` is the
/// natural key; everything else is mutable attribute data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub code: String,
    pub product_id: Option<i64>,
    pub title: Option<String>,
    pub manufacturer: Option<String>,
    pub ean: Option<String>,
    pub supplier_code: Option<String>,
    pub availability: Option<String>,
    pub stock: i64,
    pub stock_position: Option<String>,
    pub weight: Option<f64>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub active: bool,
    pub last_synced_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductVariant {
    pub id: i64,
    pub code: String,
    /// Row id of the parent product.
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub supplier_code: Option<String>,
    pub ean: Option<String>,
    pub availability: Option<String>,
    pub stock: i64,
    pub stock_position: Option<String>,
    pub weight: Option<f64>,
    pub image_url: Option<String>,
    pub price_original: Option<f64>,
    pub price_with_vat: Option<f64>,
    pub price_without_vat: Option<f64>,
    pub price_purchase: Option<f64>,
    pub currency: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub active: bool,
    pub last_synced_at: DateTime<Utc>,
}

/// Denormalized order snapshot. External status lives in `status` /
/// `status_id`; the internal pick/pack state is `fulfillment_status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_number: String,
    pub order_id: Option<i64>,
    pub case_number: Option<String>,
    pub external_order_number: Option<String>,
    pub uuid: Option<String>,
    pub language_id: Option<String>,
    pub currency_id: Option<String>,
    pub status_id: Option<i64>,
    pub status: Option<String>,
    pub paid_date: Option<DateTime<Utc>>,
    pub tracking_code: Option<String>,
    pub tracking_url: Option<String>,
    pub internal_note: Option<String>,
    pub creation_time: Option<DateTime<Utc>>,
    pub last_update_time: Option<DateTime<Utc>>,
    pub order_total: Option<f64>,
    pub invoice_number: Option<String>,
    pub admin_url: Option<String>,
    pub customer: Option<serde_json::Value>,
    pub shipment: Option<serde_json::Value>,
    pub payment: Option<serde_json::Value>,
    pub fulfillment_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: i64,
    /// Row id of the owning order.
    pub order_id: i64,
    pub uuid: String,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Target of a stock adjustment: exactly one of product or variant,
/// referenced by natural key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdjustmentTarget {
    Product(String),
    Variant(String),
}

impl AdjustmentTarget {
    pub fn code(&self) -> &str {
        match self {
            AdjustmentTarget::Product(code) | AdjustmentTarget::Variant(code) => code,
        }
    }
}

/// A locally-originated stock correction awaiting push to the platform.
#[derive(Debug, Clone)]
pub struct StockAdjustment {
    pub id: i64,
    pub product_code: Option<String>,
    pub variant_code: Option<String>,
    pub adjustment_quantity: i64,
    pub status: AdjustmentStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub api_response_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
}

impl StockAdjustment {
    /// Resolve the target, upholding the exactly-one invariant recorded
    /// in the schema CHECK constraint.
    pub fn target(&self) -> Option<AdjustmentTarget> {
        match (&self.product_code, &self.variant_code) {
            (Some(code), None) => Some(AdjustmentTarget::Product(code.clone())),
            (None, Some(code)) => Some(AdjustmentTarget::Variant(code.clone())),
            _ => None,
        }
    }
}
