use super::Pool;
use crate::model::{AdjustmentStatus, AdjustmentTarget, StockAdjustment};
use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{info, instrument};

/// Create a stock adjustment, or coalesce into an existing pending row
/// for the same target by summing quantities. Coalescing happens here, at
/// creation time, inside one transaction, so concurrent creators serialize
/// instead of producing duplicate pending rows.
#[instrument(skip_all, fields(code = %target.code(), quantity))]
pub async fn create_adjustment(
    pool: &Pool,
    target: &AdjustmentTarget,
    quantity: i64,
) -> Result<i64> {
    if quantity == 0 {
        return Err(anyhow!("adjustment quantity must be non-zero"));
    }
    let (product_code, variant_code) = match target {
        AdjustmentTarget::Product(code) => (Some(code.as_str()), None),
        AdjustmentTarget::Variant(code) => (None, Some(code.as_str())),
    };

    let mut tx = pool.begin().await?;
    let column = if product_code.is_some() {
        "product_code"
    } else {
        "variant_code"
    };
    let existing: Option<i64> = sqlx::query_scalar(&format!(
        "SELECT id FROM stock_adjustments WHERE {column} = ? AND status = 'pending'"
    ))
    .bind(target.code())
    .fetch_optional(&mut *tx)
    .await?;

    let id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE stock_adjustments SET adjustment_quantity = adjustment_quantity + ? \
                 WHERE id = ?",
            )
            .bind(quantity)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            info!(id, "coalesced into existing pending adjustment");
            id
        }
        None => sqlx::query(
            "INSERT INTO stock_adjustments (product_code, variant_code, adjustment_quantity, \
             status, created_at) VALUES (?, ?, ?, 'pending', ?) RETURNING id",
        )
        .bind(product_code)
        .bind(variant_code)
        .bind(quantity)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?
        .get("id"),
    };
    tx.commit().await?;
    Ok(id)
}

/// All pending rows, oldest first.
pub async fn pending_adjustments(pool: &Pool) -> Result<Vec<StockAdjustment>> {
    let rows = sqlx::query(
        "SELECT * FROM stock_adjustments WHERE status = 'pending' \
         ORDER BY datetime(created_at) ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(adjustment_from_row).collect()
}

pub async fn adjustment_by_id(pool: &Pool, id: i64) -> Result<Option<StockAdjustment>> {
    let row = sqlx::query("SELECT * FROM stock_adjustments WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(adjustment_from_row).transpose()
}

/// Claim a pending row for processing. The conditional update is the
/// whole claim: it only succeeds if the row is still pending, so a
/// concurrent run's claim set naturally shrinks to zero for rows already
/// taken.
#[instrument(skip_all, fields(id))]
pub async fn claim_adjustment(pool: &Pool, id: i64, now: DateTime<Utc>) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE stock_adjustments SET status = 'processing', processed_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Terminal success: store the matched response fragment.
pub async fn complete_adjustment(
    pool: &Pool,
    id: i64,
    response_fragment: &serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "UPDATE stock_adjustments SET status = 'completed', api_response_data = ?, \
         error_message = NULL WHERE id = ?",
    )
    .bind(serde_json::to_string(response_fragment)?)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal failure, optionally retaining the response fragment for
/// operator inspection.
pub async fn fail_adjustment(
    pool: &Pool,
    id: i64,
    error: &str,
    response_fragment: Option<&serde_json::Value>,
) -> Result<()> {
    let response = response_fragment.map(serde_json::to_string).transpose()?;
    sqlx::query(
        "UPDATE stock_adjustments SET status = 'failed', error_message = ?, \
         api_response_data = COALESCE(?, api_response_data), processed_at = COALESCE(processed_at, ?) \
         WHERE id = ?",
    )
    .bind(error)
    .bind(response)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a candidate failed only if no other run has claimed it meanwhile.
pub async fn fail_if_pending(pool: &Pool, id: i64, error: &str) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE stock_adjustments SET status = 'failed', error_message = ?, processed_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Out-of-band manual transition, allowed from `pending` only.
pub async fn cancel_adjustment(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query(
        "UPDATE stock_adjustments SET status = 'cancelled', processed_at = ? \
         WHERE id = ? AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

/// Operators may delete pending rows only; claimed and terminal rows stay
/// for the audit trail.
pub async fn delete_adjustment(pool: &Pool, id: i64) -> Result<bool> {
    let res = sqlx::query("DELETE FROM stock_adjustments WHERE id = ? AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// Revert `processing` rows left behind by a crashed run back to
/// `pending`. The upstream batch update is an absolute-stock upsert, so a
/// re-send of a reclaimed row is idempotent.
#[instrument(skip_all)]
pub async fn reclaim_stale_processing(pool: &Pool, older_than: Duration) -> Result<u64> {
    let cutoff = Utc::now() - older_than;
    let res = sqlx::query(
        "UPDATE stock_adjustments SET status = 'pending', processed_at = NULL \
         WHERE status = 'processing' AND datetime(processed_at) <= datetime(?)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

fn adjustment_from_row(row: SqliteRow) -> Result<StockAdjustment> {
    let status: String = row.get("status");
    let api_response_data: Option<String> = row.get("api_response_data");
    Ok(StockAdjustment {
        id: row.get("id"),
        product_code: row.get("product_code"),
        variant_code: row.get("variant_code"),
        adjustment_quantity: row.get("adjustment_quantity"),
        status: AdjustmentStatus::parse(&status)
            .ok_or_else(|| anyhow!("unknown adjustment status '{status}'"))?,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        processed_at: row.get("processed_at"),
        api_response_data: api_response_data
            .map(|s| serde_json::from_str(&s))
            .transpose()?,
        error_message: row.get("error_message"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[tokio::test]
    async fn pending_adjustments_coalesce_by_target() {
        let pool = test_pool().await;
        let target = AdjustmentTarget::Product("P1".into());
        let id1 = create_adjustment(&pool, &target, -2).await.unwrap();
        let id2 = create_adjustment(&pool, &target, 5).await.unwrap();
        assert_eq!(id1, id2);

        let pending = pending_adjustments(&pool).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].adjustment_quantity, 3);
    }

    #[tokio::test]
    async fn product_and_variant_targets_do_not_coalesce() {
        let pool = test_pool().await;
        create_adjustment(&pool, &AdjustmentTarget::Product("X".into()), 1)
            .await
            .unwrap();
        create_adjustment(&pool, &AdjustmentTarget::Variant("X".into()), 1)
            .await
            .unwrap();
        assert_eq!(pending_adjustments(&pool).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn coalescing_skips_non_pending_rows() {
        let pool = test_pool().await;
        let target = AdjustmentTarget::Product("P1".into());
        let id1 = create_adjustment(&pool, &target, -2).await.unwrap();
        assert!(claim_adjustment(&pool, id1, Utc::now()).await.unwrap());

        let id2 = create_adjustment(&pool, &target, 4).await.unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let pool = test_pool().await;
        assert!(
            create_adjustment(&pool, &AdjustmentTarget::Product("P1".into()), 0)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn claim_is_single_shot() {
        let pool = test_pool().await;
        let id = create_adjustment(&pool, &AdjustmentTarget::Product("P1".into()), 1)
            .await
            .unwrap();
        assert!(claim_adjustment(&pool, id, Utc::now()).await.unwrap());
        // Second claim (e.g. a concurrent run) must lose.
        assert!(!claim_adjustment(&pool, id, Utc::now()).await.unwrap());

        let adj = adjustment_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(adj.status, AdjustmentStatus::Processing);
        assert!(adj.processed_at.is_some());
    }

    #[tokio::test]
    async fn cancel_and_delete_apply_to_pending_only() {
        let pool = test_pool().await;
        let id = create_adjustment(&pool, &AdjustmentTarget::Variant("V1".into()), 2)
            .await
            .unwrap();
        assert!(claim_adjustment(&pool, id, Utc::now()).await.unwrap());
        assert!(!cancel_adjustment(&pool, id).await.unwrap());
        assert!(!delete_adjustment(&pool, id).await.unwrap());

        let id2 = create_adjustment(&pool, &AdjustmentTarget::Variant("V2".into()), 2)
            .await
            .unwrap();
        assert!(cancel_adjustment(&pool, id2).await.unwrap());
        let adj = adjustment_by_id(&pool, id2).await.unwrap().unwrap();
        assert_eq!(adj.status, AdjustmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn stale_processing_rows_are_reclaimed() {
        let pool = test_pool().await;
        let id = create_adjustment(&pool, &AdjustmentTarget::Product("P1".into()), 1)
            .await
            .unwrap();
        let long_ago = Utc::now() - Duration::hours(2);
        assert!(claim_adjustment(&pool, id, long_ago).await.unwrap());

        let reclaimed = reclaim_stale_processing(&pool, Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(reclaimed, 1);
        let adj = adjustment_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(adj.status, AdjustmentStatus::Pending);
        assert!(adj.processed_at.is_none());
    }

    #[tokio::test]
    async fn fresh_processing_rows_are_not_reclaimed() {
        let pool = test_pool().await;
        let id = create_adjustment(&pool, &AdjustmentTarget::Product("P1".into()), 1)
            .await
            .unwrap();
        assert!(claim_adjustment(&pool, id, Utc::now()).await.unwrap());
        let reclaimed = reclaim_stale_processing(&pool, Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(reclaimed, 0);
    }

    #[tokio::test]
    async fn completion_stores_response_fragment() {
        let pool = test_pool().await;
        let id = create_adjustment(&pool, &AdjustmentTarget::Product("P1".into()), 1)
            .await
            .unwrap();
        claim_adjustment(&pool, id, Utc::now()).await.unwrap();
        complete_adjustment(&pool, id, &serde_json::json!({"code": "P1", "updated_yn": true}))
            .await
            .unwrap();

        let adj = adjustment_by_id(&pool, id).await.unwrap().unwrap();
        assert_eq!(adj.status, AdjustmentStatus::Completed);
        assert_eq!(adj.api_response_data.unwrap()["updated_yn"], true);
    }
}
