//! Stock adjustment batch processor.
//!
//! One run drains the pending queue: refresh the stock baseline for the
//! affected codes, claim each row, compute the absolute target stock,
//! push a single batch update, then settle every claimed row from the
//! response. Claimed rows only ever move to a terminal state; rows left
//! in `processing` by a crashed run are reclaimed at the start of the
//! next one.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use std::collections::HashMap;
use tracing::{info, instrument, warn};

use super::catalog::sync_products_simple;
use crate::db::adjustments::{
    claim_adjustment, complete_adjustment, fail_adjustment, fail_if_pending, pending_adjustments,
    reclaim_stale_processing,
};
use crate::db::products::{
    get_product_by_code, get_variant_by_code, set_product_stock, set_variant_stock,
};
use crate::db::Pool;
use crate::model::AdjustmentTarget;
use crate::platform::model::{BatchResultItem, StockBatchItem, StockBatchRequest};
use crate::platform::PlatformApi;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdjustmentRunStats {
    pub reclaimed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// A claimed row with its computed absolute target stock.
struct ClaimedAdjustment {
    id: i64,
    target: AdjustmentTarget,
    new_stock: i64,
}

/// Flatten the batch response into a code-keyed lookup. Variant results
/// arrive nested under their product entry; both levels are matched by
/// code alone.
fn response_by_code(items: &[BatchResultItem]) -> HashMap<String, BatchResultItem> {
    let mut map = HashMap::new();
    for item in items {
        if let Some(code) = &item.code {
            map.insert(code.clone(), item.clone());
        }
        for variant in &item.variants {
            if let Some(code) = &variant.code {
                map.insert(code.clone(), variant.clone());
            }
        }
    }
    map
}

/// Process the pending stock adjustments in one batch. `stale_after`
/// bounds how long a `processing` row may sit before a later run takes it
/// back. An empty queue is a successful no-op.
#[instrument(skip_all)]
pub async fn process_stock_adjustments(
    pool: &Pool,
    api: &dyn PlatformApi,
    stale_after: Duration,
) -> Result<AdjustmentRunStats> {
    let mut stats = AdjustmentRunStats::default();

    stats.reclaimed = reclaim_stale_processing(pool, stale_after).await?;
    if stats.reclaimed > 0 {
        warn!(reclaimed = stats.reclaimed, "reclaimed stale processing adjustments");
    }

    let candidates = pending_adjustments(pool).await?;
    if candidates.is_empty() {
        info!("no pending stock adjustments");
        return Ok(stats);
    }

    // Refresh the local stock baseline for exactly the affected codes
    // before computing targets. Without a fresh baseline the absolute
    // stock values we send would be built on stale numbers.
    let code_list: Vec<String> = candidates
        .iter()
        .filter_map(|a| a.target().map(|t| t.code().to_string()))
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    let joined = code_list.join(";");
    if let Err(e) = sync_products_simple(pool, api, Some(&joined)).await {
        for candidate in &candidates {
            fail_if_pending(
                pool,
                candidate.id,
                &format!("stock baseline refresh failed: {e:#}"),
            )
            .await?;
        }
        return Err(e).context("stock baseline refresh failed");
    }

    let now = Utc::now();
    let mut claimed: Vec<ClaimedAdjustment> = Vec::new();
    for candidate in &candidates {
        let Some(target) = candidate.target() else {
            // Unreachable while the schema CHECK holds.
            fail_if_pending(pool, candidate.id, "adjustment has no target code").await?;
            stats.failed += 1;
            continue;
        };
        if !claim_adjustment(pool, candidate.id, now).await? {
            // Another run got there first.
            continue;
        }
        let current = match &target {
            AdjustmentTarget::Product(code) => {
                get_product_by_code(pool, code).await?.map(|p| p.stock)
            }
            AdjustmentTarget::Variant(code) => {
                get_variant_by_code(pool, code).await?.map(|v| v.stock)
            }
        };
        let Some(current) = current else {
            warn!(id = candidate.id, code = target.code(), "adjustment target not in catalog");
            fail_adjustment(pool, candidate.id, "target code not found in catalog", None).await?;
            stats.failed += 1;
            continue;
        };
        claimed.push(ClaimedAdjustment {
            id: candidate.id,
            target,
            new_stock: current + candidate.adjustment_quantity,
        });
    }

    if claimed.is_empty() {
        info!("no adjustments claimed, nothing to send");
        return Ok(stats);
    }

    let mut products = Vec::new();
    let mut variants = Vec::new();
    for adj in &claimed {
        let item = StockBatchItem {
            code: adj.target.code().to_string(),
            stock: adj.new_stock,
        };
        match adj.target {
            AdjustmentTarget::Product(_) => products.push(item),
            AdjustmentTarget::Variant(_) => variants.push(item),
        }
    }
    let request = StockBatchRequest {
        products: (!products.is_empty()).then_some(products),
        variants: (!variants.is_empty()).then_some(variants),
    };

    let response = match api.put_product_stocks(&request).await {
        Ok(response) => response,
        Err(e) => {
            for adj in &claimed {
                fail_adjustment(
                    pool,
                    adj.id,
                    &format!("stock batch request failed: {e:#}"),
                    None,
                )
                .await?;
            }
            stats.failed += claimed.len() as u64;
            return Err(e).context("stock batch request failed");
        }
    };

    let by_code = response_by_code(&response.products);
    for adj in &claimed {
        let code = adj.target.code();
        let Some(fragment) = by_code.get(code) else {
            warn!(id = adj.id, code, "no corresponding item in batch response");
            fail_adjustment(pool, adj.id, "no corresponding item in response", None).await?;
            stats.failed += 1;
            continue;
        };
        let fragment_json = serde_json::to_value(fragment)?;
        if fragment.updated_yn {
            match &adj.target {
                AdjustmentTarget::Product(code) => {
                    set_product_stock(pool, code, adj.new_stock).await?
                }
                AdjustmentTarget::Variant(code) => {
                    set_variant_stock(pool, code, adj.new_stock).await?
                }
            }
            complete_adjustment(pool, adj.id, &fragment_json).await?;
            stats.completed += 1;
        } else {
            warn!(id = adj.id, code, "platform rejected stock update");
            fail_adjustment(pool, adj.id, "platform rejected stock update", Some(&fragment_json))
                .await?;
            stats.failed += 1;
        }
    }

    info!(
        reclaimed = stats.reclaimed,
        completed = stats.completed,
        failed = stats.failed,
        "stock adjustment run finished"
    );
    Ok(stats)
}
