//! Catalog synchronization: the full XML feed (authoritative, drives
//! deactivation), the partial feed (sparse merge, never creates or
//! deactivates), and the simple products API (sparse upsert, used both
//! standalone and as the baseline refresh for stock adjustments).

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, instrument, warn};

use super::pages::Paginator;
use super::SyncStats;
use crate::db::products::{
    apply_full_product, apply_partial_product, apply_partial_variant, apply_simple_product,
    deactivate_products_not_in, PartialRecord, ProductRecord, SimpleProductRecord,
    SimpleVariantRecord, VariantRecord,
};
use crate::db::Pool;
use crate::feed::parser::{parse_partial_products, parse_products, FeedProduct, FeedVariant};
use crate::feed::FeedSource;
use crate::platform::model::ApiSimpleProduct;
use crate::platform::PlatformApi;

fn product_record(product: &FeedProduct, code: &str) -> ProductRecord {
    ProductRecord {
        code: code.to_string(),
        product_id: product.product_id,
        title: product.title.clone(),
        manufacturer: product.manufacturer.clone(),
        ean: product.ean.clone(),
        supplier_code: product.supplier_code.clone(),
        availability: product.availability.clone(),
        stock: product.stock,
        stock_position: product.stock_position.clone(),
        weight: product.weight,
        unit: product.unit.clone(),
        image_url: product.image_url.clone(),
    }
}

fn variant_records(product: &FeedProduct, product_code: &str) -> Vec<VariantRecord> {
    product
        .variants
        .iter()
        .filter_map(|variant| match &variant.code {
            Some(code) => Some(variant_record(variant, code)),
            None => {
                warn!(product_code, "variant without code in feed, skipping");
                None
            }
        })
        .collect()
}

fn variant_record(variant: &FeedVariant, code: &str) -> VariantRecord {
    let parameters = (!variant.parameters.is_empty())
        .then(|| serde_json::to_value(&variant.parameters))
        .transpose()
        .unwrap_or_default();
    VariantRecord {
        code: code.to_string(),
        variant_id: variant.variant_id,
        supplier_code: variant.supplier_code.clone(),
        ean: variant.ean.clone(),
        availability: variant.availability.clone(),
        stock: variant.stock,
        stock_position: variant.stock_position.clone(),
        weight: variant.weight,
        image_url: variant.image_url.clone(),
        price_original: variant.price_original,
        price_with_vat: variant.price_with_vat,
        price_without_vat: variant.price_without_vat,
        price_purchase: variant.price_purchase,
        currency: variant.currency.clone(),
        parameters,
    }
}

/// Full catalog sync. Downloads and parses the whole feed before touching
/// the database, so a malformed document fails the run with the catalog
/// untouched. Products absent from the feed are soft-deactivated at the
/// end; the partial path never does that.
#[instrument(skip_all)]
pub async fn sync_products_full(pool: &Pool, feeds: &dyn FeedSource) -> Result<SyncStats> {
    let xml = feeds.fetch_full().await.context("full feed download failed")?;
    let parsed = parse_products(&xml).context("full feed parse failed")?;

    let mut stats = SyncStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    for product in &parsed {
        let Some(code) = product.code.as_deref() else {
            warn!("product without code in feed, skipping");
            stats.skipped += 1;
            continue;
        };
        // A feed entry counts as seen even when storing it fails, so a
        // transient write error cannot deactivate a live product.
        seen.insert(code.to_string());
        let rec = product_record(product, code);
        let variants = variant_records(product, code);
        match apply_full_product(pool, &rec, &variants).await {
            Ok(_) => stats.synced += 1,
            Err(e) => {
                warn!(code, error = %e, "failed to store product");
                stats.failed += 1;
            }
        }
    }

    let deactivated = deactivate_products_not_in(pool, &seen).await?;
    info!(
        synced = stats.synced,
        skipped = stats.skipped,
        failed = stats.failed,
        deactivated,
        "full product sync finished"
    );
    Ok(stats)
}

/// Partial catalog sync: sparse stock/availability merge onto existing
/// rows. Codes not stored locally are skipped, nothing is created and
/// nothing is deactivated. An unconfigured partial feed is a no-op
/// success.
#[instrument(skip_all)]
pub async fn sync_products_partial(pool: &Pool, feeds: &dyn FeedSource) -> Result<SyncStats> {
    let Some(xml) = feeds.fetch_partial().await? else {
        return Ok(SyncStats::default());
    };
    let parsed = parse_partial_products(&xml).context("partial feed parse failed")?;

    let mut stats = SyncStats::default();
    for product in &parsed {
        let Some(code) = product.code.as_deref() else {
            warn!("product without code in partial feed, skipping");
            stats.skipped += 1;
            continue;
        };
        let rec = PartialRecord {
            stock: product.stock,
            availability: product.availability.clone(),
        };
        match apply_partial_product(pool, code, &rec).await {
            Ok(true) => stats.synced += 1,
            Ok(false) => {
                debug!(code, "partial feed code not stored locally, skipping");
                stats.skipped += 1;
            }
            Err(e) => {
                warn!(code, error = %e, "failed to merge partial product");
                stats.failed += 1;
            }
        }
        for variant in &product.variants {
            let Some(vcode) = variant.code.as_deref() else {
                warn!(code, "variant without code in partial feed, skipping");
                stats.skipped += 1;
                continue;
            };
            let rec = PartialRecord {
                stock: variant.stock,
                availability: variant.availability.clone(),
            };
            match apply_partial_variant(pool, vcode, &rec).await {
                Ok(true) => stats.synced += 1,
                Ok(false) => {
                    debug!(code = vcode, "partial feed variant not stored locally, skipping");
                    stats.skipped += 1;
                }
                Err(e) => {
                    warn!(code = vcode, error = %e, "failed to merge partial variant");
                    stats.failed += 1;
                }
            }
        }
    }

    info!(
        synced = stats.synced,
        skipped = stats.skipped,
        failed = stats.failed,
        "partial product sync finished"
    );
    Ok(stats)
}

fn simple_record(product: &ApiSimpleProduct, code: &str) -> SimpleProductRecord {
    SimpleProductRecord {
        code: code.to_string(),
        product_id: product.product_id,
        stock: product.stock,
        availability: product.availability.clone(),
        variants: product
            .variants
            .iter()
            .filter_map(|variant| match &variant.code {
                Some(vcode) => Some(SimpleVariantRecord {
                    code: vcode.clone(),
                    variant_id: variant.variant_id,
                    stock: variant.stock,
                    availability: variant.availability.clone(),
                }),
                None => {
                    warn!(product_code = code, "variant without code in API payload, skipping");
                    None
                }
            })
            .collect(),
    }
}

/// Paginated pull from the simple products API, optionally restricted to
/// a semicolon-separated code list. Sparse upsert per product, same loop
/// rules as the order sync.
#[instrument(skip_all)]
pub async fn sync_products_simple(
    pool: &Pool,
    api: &dyn PlatformApi,
    codes: Option<&str>,
) -> Result<SyncStats> {
    let mut stats = SyncStats::default();
    let mut pager = Paginator::new();
    while let Some(page) = pager.current() {
        let batch = match api.get_products_simple(page, codes).await {
            Ok(batch) => batch,
            Err(e) => {
                pager.abort();
                return Err(e).with_context(|| format!("simple products page {page} fetch failed"));
            }
        };
        let count = batch.products.len();
        for product in &batch.products {
            let Some(code) = product.code.as_deref() else {
                warn!(product_id = ?product.product_id, "product without code in API payload, skipping");
                stats.skipped += 1;
                continue;
            };
            match apply_simple_product(pool, &simple_record(product, code)).await {
                Ok(_) => stats.synced += 1,
                Err(e) => {
                    warn!(code, error = %e, "failed to store simple product");
                    stats.failed += 1;
                }
            }
        }
        pager.advance(batch.number_of_pages, count);
    }

    info!(
        synced = stats.synced,
        skipped = stats.skipped,
        failed = stats.failed,
        "simple product sync finished"
    );
    Ok(stats)
}
