//! The synchronization engine: paginated ingestion of orders and simple
//! products, feed-driven catalog merges, and the stock adjustment batch.

pub mod adjustments;
pub mod catalog;
pub mod orders;
pub mod pages;

/// Per-run bookkeeping shared by the ingestion loops. A run that returns
/// `Ok` may still have skipped or failed individual items; those are
/// logged and counted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub synced: u64,
    pub skipped: u64,
    pub failed: u64,
}
