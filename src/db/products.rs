use super::Pool;
use crate::model::{Product, ProductVariant};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};
use std::collections::HashSet;
use tracing::instrument;

/// Incoming product attributes keyed by `code`, as the full feed carries
/// them. Every field except `code` is optional.
#[derive(Debug, Clone, Default)]
pub struct ProductRecord {
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
}

#[derive(Debug, Clone, Default)]
pub struct VariantRecord {
    pub code: String,
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
}

/// Sparse update payload: only fields present here overwrite stored
/// values, everything else is left untouched.
#[derive(Debug, Clone, Default)]
pub struct PartialRecord {
    pub stock: Option<i64>,
    pub availability: Option<String>,
}

/// Sparse upsert payload from the simple products API: creates the row
/// when absent, touches only the carried fields when present.
#[derive(Debug, Clone, Default)]
pub struct SimpleProductRecord {
    pub code: String,
    pub product_id: Option<i64>,
    pub stock: Option<i64>,
    pub availability: Option<String>,
    pub variants: Vec<SimpleVariantRecord>,
}

#[derive(Debug, Clone, Default)]
pub struct SimpleVariantRecord {
    pub code: String,
    pub variant_id: Option<i64>,
    pub stock: Option<i64>,
    pub availability: Option<String>,
}

/// Apply one full-feed product entry: upsert the product, upsert its
/// variants, then deactivate variants of this product whose code was not
/// part of the entry. One transaction, so a crash never leaves a product
/// half-applied. Returns the product row id.
#[instrument(skip_all, fields(code = %rec.code))]
pub async fn apply_full_product(
    pool: &Pool,
    rec: &ProductRecord,
    variants: &[VariantRecord],
) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;
    let product_row_id = upsert_product_conn(&mut tx, rec, now).await?;

    let mut seen: HashSet<&str> = HashSet::new();
    for variant in variants {
        upsert_variant_conn(&mut tx, product_row_id, variant, now).await?;
        seen.insert(variant.code.as_str());
    }

    let active: Vec<String> =
        sqlx::query_scalar("SELECT code FROM product_variants WHERE product_id = ? AND active = 1")
            .bind(product_row_id)
            .fetch_all(&mut *tx)
            .await?;
    for code in active.iter().filter(|c| !seen.contains(c.as_str())) {
        sqlx::query("UPDATE product_variants SET active = 0 WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(product_row_id)
}

async fn upsert_product_conn(
    conn: &mut SqliteConnection,
    rec: &ProductRecord,
    now: DateTime<Utc>,
) -> Result<i64> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE code = ?")
        .bind(&rec.code)
        .fetch_optional(&mut *conn)
        .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE products SET product_id = ?, title = ?, manufacturer = ?, ean = ?, \
                 supplier_code = ?, availability = ?, stock = ?, stock_position = ?, weight = ?, \
                 unit = ?, image_url = ?, active = 1, last_synced_at = ? WHERE id = ?",
            )
            .bind(rec.product_id)
            .bind(&rec.title)
            .bind(&rec.manufacturer)
            .bind(&rec.ean)
            .bind(&rec.supplier_code)
            .bind(&rec.availability)
            .bind(rec.stock)
            .bind(&rec.stock_position)
            .bind(rec.weight)
            .bind(&rec.unit)
            .bind(&rec.image_url)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            id
        }
        None => sqlx::query(
            "INSERT INTO products (code, product_id, title, manufacturer, ean, supplier_code, \
             availability, stock, stock_position, weight, unit, image_url, active, last_synced_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(&rec.code)
        .bind(rec.product_id)
        .bind(&rec.title)
        .bind(&rec.manufacturer)
        .bind(&rec.ean)
        .bind(&rec.supplier_code)
        .bind(&rec.availability)
        .bind(rec.stock)
        .bind(&rec.stock_position)
        .bind(rec.weight)
        .bind(&rec.unit)
        .bind(&rec.image_url)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?
        .get("id"),
    };
    Ok(id)
}

async fn upsert_variant_conn(
    conn: &mut SqliteConnection,
    product_row_id: i64,
    rec: &VariantRecord,
    now: DateTime<Utc>,
) -> Result<i64> {
    let parameters = rec
        .parameters
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM product_variants WHERE code = ?")
        .bind(&rec.code)
        .fetch_optional(&mut *conn)
        .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE product_variants SET product_id = ?, variant_id = ?, supplier_code = ?, \
                 ean = ?, availability = ?, stock = ?, stock_position = ?, weight = ?, \
                 image_url = ?, price_original = ?, price_with_vat = ?, price_without_vat = ?, \
                 price_purchase = ?, currency = ?, parameters = ?, active = 1, last_synced_at = ? \
                 WHERE id = ?",
            )
            .bind(product_row_id)
            .bind(rec.variant_id)
            .bind(&rec.supplier_code)
            .bind(&rec.ean)
            .bind(&rec.availability)
            .bind(rec.stock)
            .bind(&rec.stock_position)
            .bind(rec.weight)
            .bind(&rec.image_url)
            .bind(rec.price_original)
            .bind(rec.price_with_vat)
            .bind(rec.price_without_vat)
            .bind(rec.price_purchase)
            .bind(&rec.currency)
            .bind(&parameters)
            .bind(now)
            .bind(id)
            .execute(&mut *conn)
            .await?;
            id
        }
        None => sqlx::query(
            "INSERT INTO product_variants (code, product_id, variant_id, supplier_code, ean, \
             availability, stock, stock_position, weight, image_url, price_original, \
             price_with_vat, price_without_vat, price_purchase, currency, parameters, active, \
             last_synced_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?) \
             RETURNING id",
        )
        .bind(&rec.code)
        .bind(product_row_id)
        .bind(rec.variant_id)
        .bind(&rec.supplier_code)
        .bind(&rec.ean)
        .bind(&rec.availability)
        .bind(rec.stock)
        .bind(&rec.stock_position)
        .bind(rec.weight)
        .bind(&rec.image_url)
        .bind(rec.price_original)
        .bind(rec.price_with_vat)
        .bind(rec.price_without_vat)
        .bind(rec.price_purchase)
        .bind(&rec.currency)
        .bind(&parameters)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?
        .get("id"),
    };
    Ok(id)
}

/// Sparse upsert from the simple products API, one transaction per
/// product. Creates missing rows (simple sync may introduce products) but
/// only overwrites the fields the API carries.
#[instrument(skip_all, fields(code = %rec.code))]
pub async fn apply_simple_product(pool: &Pool, rec: &SimpleProductRecord) -> Result<i64> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM products WHERE code = ?")
        .bind(&rec.code)
        .fetch_optional(&mut *tx)
        .await?;
    let product_row_id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE products SET product_id = COALESCE(?, product_id), \
                 stock = COALESCE(?, stock), availability = COALESCE(?, availability), \
                 last_synced_at = ? WHERE id = ?",
            )
            .bind(rec.product_id)
            .bind(rec.stock)
            .bind(&rec.availability)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => sqlx::query(
            "INSERT INTO products (code, product_id, stock, availability, active, last_synced_at) \
             VALUES (?, ?, ?, ?, 1, ?) RETURNING id",
        )
        .bind(&rec.code)
        .bind(rec.product_id)
        .bind(rec.stock.unwrap_or(0))
        .bind(&rec.availability)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .get("id"),
    };

    for variant in &rec.variants {
        let existing =
            sqlx::query_scalar::<_, i64>("SELECT id FROM product_variants WHERE code = ?")
                .bind(&variant.code)
                .fetch_optional(&mut *tx)
                .await?;
        match existing {
            Some(id) => {
                sqlx::query(
                    "UPDATE product_variants SET variant_id = COALESCE(?, variant_id), \
                     stock = COALESCE(?, stock), availability = COALESCE(?, availability), \
                     last_synced_at = ? WHERE id = ?",
                )
                .bind(variant.variant_id)
                .bind(variant.stock)
                .bind(&variant.availability)
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            }
            None => {
                sqlx::query(
                    "INSERT INTO product_variants (code, product_id, variant_id, stock, \
                     availability, active, last_synced_at) VALUES (?, ?, ?, ?, ?, 1, ?)",
                )
                .bind(&variant.code)
                .bind(product_row_id)
                .bind(variant.variant_id)
                .bind(variant.stock.unwrap_or(0))
                .bind(&variant.availability)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            }
        }
    }

    tx.commit().await?;
    Ok(product_row_id)
}

/// Sparse merge onto an existing product. Returns false when no row with
/// that code exists (partial sync never creates rows).
#[instrument(skip_all, fields(code = %code))]
pub async fn apply_partial_product(pool: &Pool, code: &str, rec: &PartialRecord) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE products SET stock = COALESCE(?, stock), \
         availability = COALESCE(?, availability), last_synced_at = ? WHERE code = ?",
    )
    .bind(rec.stock)
    .bind(&rec.availability)
    .bind(Utc::now())
    .bind(code)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

#[instrument(skip_all, fields(code = %code))]
pub async fn apply_partial_variant(pool: &Pool, code: &str, rec: &PartialRecord) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE product_variants SET stock = COALESCE(?, stock), \
         availability = COALESCE(?, availability), last_synced_at = ? WHERE code = ?",
    )
    .bind(rec.stock)
    .bind(&rec.availability)
    .bind(Utc::now())
    .bind(code)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Soft-deactivate every active product whose code was not seen in the
/// latest full feed. Returns the number of rows flipped.
#[instrument(skip_all)]
pub async fn deactivate_products_not_in(pool: &Pool, seen: &HashSet<String>) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let active: Vec<String> = sqlx::query_scalar("SELECT code FROM products WHERE active = 1")
        .fetch_all(&mut *tx)
        .await?;
    let mut flipped = 0;
    for code in active.iter().filter(|c| !seen.contains(*c)) {
        let res = sqlx::query("UPDATE products SET active = 0 WHERE code = ?")
            .bind(code)
            .execute(&mut *tx)
            .await?;
        flipped += res.rows_affected();
    }
    tx.commit().await?;
    Ok(flipped)
}

pub async fn get_product_by_code(pool: &Pool, code: &str) -> Result<Option<Product>> {
    let row = sqlx::query("SELECT * FROM products WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    row.map(product_from_row).transpose()
}

pub async fn get_variant_by_code(pool: &Pool, code: &str) -> Result<Option<ProductVariant>> {
    let row = sqlx::query("SELECT * FROM product_variants WHERE code = ?")
        .bind(code)
        .fetch_optional(pool)
        .await?;
    row.map(variant_from_row).transpose()
}

pub async fn set_product_stock(pool: &Pool, code: &str, stock: i64) -> Result<()> {
    sqlx::query("UPDATE products SET stock = ? WHERE code = ?")
        .bind(stock)
        .bind(code)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_variant_stock(pool: &Pool, code: &str, stock: i64) -> Result<()> {
    sqlx::query("UPDATE product_variants SET stock = ? WHERE code = ?")
        .bind(stock)
        .bind(code)
        .execute(pool)
        .await?;
    Ok(())
}

fn product_from_row(row: SqliteRow) -> Result<Product> {
    Ok(Product {
        id: row.get("id"),
        code: row.get("code"),
        product_id: row.get("product_id"),
        title: row.get("title"),
        manufacturer: row.get("manufacturer"),
        ean: row.get("ean"),
        supplier_code: row.get("supplier_code"),
        availability: row.get("availability"),
        stock: row.get("stock"),
        stock_position: row.get("stock_position"),
        weight: row.get("weight"),
        unit: row.get("unit"),
        image_url: row.get("image_url"),
        active: row.get::<i64, _>("active") != 0,
        last_synced_at: row.get::<DateTime<Utc>, _>("last_synced_at"),
    })
}

fn variant_from_row(row: SqliteRow) -> Result<ProductVariant> {
    let parameters: Option<String> = row.get("parameters");
    Ok(ProductVariant {
        id: row.get("id"),
        code: row.get("code"),
        product_id: row.get("product_id"),
        variant_id: row.get("variant_id"),
        supplier_code: row.get("supplier_code"),
        ean: row.get("ean"),
        availability: row.get("availability"),
        stock: row.get("stock"),
        stock_position: row.get("stock_position"),
        weight: row.get("weight"),
        image_url: row.get("image_url"),
        price_original: row.get("price_original"),
        price_with_vat: row.get("price_with_vat"),
        price_without_vat: row.get("price_without_vat"),
        price_purchase: row.get("price_purchase"),
        currency: row.get("currency"),
        parameters: parameters.map(|p| serde_json::from_str(&p)).transpose()?,
        active: row.get::<i64, _>("active") != 0,
        last_synced_at: row.get::<DateTime<Utc>, _>("last_synced_at"),
    })
}
