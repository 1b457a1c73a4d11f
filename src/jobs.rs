//! Durable job queue driving the sync engine. CLI commands enqueue a
//! row; the worker drains the queue, retrying failed runs with
//! exponential backoff and dead-lettering after too many attempts.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::{error, info, instrument, warn};

use crate::db::Pool;
use crate::feed::FeedSource;
use crate::platform::PlatformApi;
use crate::sync;

const MAX_ATTEMPTS: i64 = 8;
const BASE_BACKOFF_SECONDS: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    SyncOrders,
    SyncProductsFull,
    SyncProductsPartial,
    SyncProductsSimple,
    ProcessStockAdjustments,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SyncOrders => "sync_orders",
            JobKind::SyncProductsFull => "sync_products_full",
            JobKind::SyncProductsPartial => "sync_products_partial",
            JobKind::SyncProductsSimple => "sync_products_simple",
            JobKind::ProcessStockAdjustments => "process_stock_adjustments",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sync_orders" => Some(JobKind::SyncOrders),
            "sync_products_full" => Some(JobKind::SyncProductsFull),
            "sync_products_partial" => Some(JobKind::SyncProductsPartial),
            "sync_products_simple" => Some(JobKind::SyncProductsSimple),
            "process_stock_adjustments" => Some(JobKind::ProcessStockAdjustments),
            _ => None,
        }
    }
}

/// Optional parameters carried alongside a job row.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct JobParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: i64,
    pub kind: JobKind,
    pub params: JobParams,
    pub attempt: i64,
    pub due_at: DateTime<Utc>,
}

pub async fn enqueue_job(pool: &Pool, kind: JobKind, params: &JobParams) -> Result<i64> {
    let payload = serde_json::to_string(params)?;
    let id = sqlx::query(
        "INSERT INTO jobs (kind, payload, attempt, due_at, created_at) \
         VALUES (?, ?, 0, ?, ?) RETURNING id",
    )
    .bind(kind.as_str())
    .bind(payload)
    .bind(Utc::now())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?
    .get("id");
    info!(id, kind = kind.as_str(), "job enqueued");
    Ok(id)
}

/// Oldest due job, if any.
pub async fn next_due_job(pool: &Pool, now: DateTime<Utc>) -> Result<Option<Job>> {
    let row = sqlx::query(
        "SELECT * FROM jobs WHERE datetime(due_at) <= datetime(?) \
         ORDER BY datetime(due_at) ASC, id ASC LIMIT 1",
    )
    .bind(now)
    .fetch_optional(pool)
    .await?;
    row.map(job_from_row).transpose()
}

fn job_from_row(row: SqliteRow) -> Result<Job> {
    let kind: String = row.get("kind");
    let payload: Option<String> = row.get("payload");
    Ok(Job {
        id: row.get("id"),
        kind: JobKind::parse(&kind).ok_or_else(|| anyhow!("unknown job kind: {kind}"))?,
        params: payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?
            .unwrap_or_default(),
        attempt: row.get("attempt"),
        due_at: row.get::<DateTime<Utc>, _>("due_at"),
    })
}

/// Retry delay before attempt `attempt + 1`, capped.
fn backoff_delay(attempt: i64, max_backoff_seconds: u64) -> Duration {
    let exp = attempt.clamp(0, 32) as u32;
    let seconds = BASE_BACKOFF_SECONDS
        .saturating_mul(2u64.saturating_pow(exp))
        .min(max_backoff_seconds);
    Duration::seconds(seconds as i64)
}

/// Dispatches due jobs to the sync engine.
pub struct JobRunner<'a> {
    pool: &'a Pool,
    api: &'a dyn PlatformApi,
    feeds: &'a dyn FeedSource,
    stale_after: Duration,
    max_backoff_seconds: u64,
}

impl<'a> JobRunner<'a> {
    pub fn new(
        pool: &'a Pool,
        api: &'a dyn PlatformApi,
        feeds: &'a dyn FeedSource,
        stale_after: Duration,
        max_backoff_seconds: u64,
    ) -> Self {
        Self {
            pool,
            api,
            feeds,
            stale_after,
            max_backoff_seconds,
        }
    }

    /// Run the oldest due job. Returns `false` when nothing was due. A
    /// failed run is rescheduled with backoff until `MAX_ATTEMPTS`, then
    /// dropped with an error log.
    #[instrument(skip_all)]
    pub async fn process_next(&self) -> Result<bool> {
        let Some(job) = next_due_job(self.pool, Utc::now()).await? else {
            return Ok(false);
        };
        info!(id = job.id, kind = job.kind.as_str(), attempt = job.attempt, "running job");

        let outcome = self.run(&job).await;
        match outcome {
            Ok(()) => {
                sqlx::query("DELETE FROM jobs WHERE id = ?")
                    .bind(job.id)
                    .execute(self.pool)
                    .await?;
            }
            Err(e) => {
                let attempt = job.attempt + 1;
                if attempt >= MAX_ATTEMPTS {
                    error!(
                        id = job.id,
                        kind = job.kind.as_str(),
                        error = %e,
                        "job failed {attempt} times, dropping"
                    );
                    sqlx::query("DELETE FROM jobs WHERE id = ?")
                        .bind(job.id)
                        .execute(self.pool)
                        .await?;
                } else {
                    let delay = backoff_delay(job.attempt, self.max_backoff_seconds);
                    warn!(
                        id = job.id,
                        kind = job.kind.as_str(),
                        error = %e,
                        retry_in_seconds = delay.num_seconds(),
                        "job failed, rescheduling"
                    );
                    sqlx::query("UPDATE jobs SET attempt = ?, due_at = ? WHERE id = ?")
                        .bind(attempt)
                        .bind(Utc::now() + delay)
                        .bind(job.id)
                        .execute(self.pool)
                        .await?;
                }
            }
        }
        Ok(true)
    }

    async fn run(&self, job: &Job) -> Result<()> {
        match job.kind {
            JobKind::SyncOrders => {
                sync::orders::sync_orders(
                    self.pool,
                    self.api,
                    job.params.from.as_deref(),
                    job.params.status_ids.as_deref(),
                )
                .await?;
            }
            JobKind::SyncProductsFull => {
                sync::catalog::sync_products_full(self.pool, self.feeds).await?;
            }
            JobKind::SyncProductsPartial => {
                sync::catalog::sync_products_partial(self.pool, self.feeds).await?;
            }
            JobKind::SyncProductsSimple => {
                sync::catalog::sync_products_simple(
                    self.pool,
                    self.api,
                    job.params.codes.as_deref(),
                )
                .await?;
            }
            JobKind::ProcessStockAdjustments => {
                sync::adjustments::process_stock_adjustments(self.pool, self.api, self.stale_after)
                    .await?;
            }
        }
        Ok(())
    }
}
