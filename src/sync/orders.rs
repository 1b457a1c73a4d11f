//! Paginated order ingestion. Each order is mirrored as a snapshot; the
//! item list in the payload is authoritative and replaces what is stored.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::{info, instrument, warn};

use super::pages::Paginator;
use super::SyncStats;
use crate::db::orders::{replace_order_snapshot, OrderItemRecord, OrderRecord};
use crate::db::Pool;
use crate::platform::model::ApiOrder;
use crate::platform::PlatformApi;

/// Timestamps in API payloads come either with an offset or as bare
/// local-less datetimes. Unparseable values are logged and dropped; a bad
/// date never blocks an order.
fn parse_api_datetime(field: &str, raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    warn!(field, raw, "unparseable timestamp in order payload");
    None
}

fn order_record(order: &ApiOrder, order_number: &str) -> OrderRecord {
    let date = |field: &str, raw: &Option<String>| {
        raw.as_deref().and_then(|r| parse_api_datetime(field, r))
    };
    OrderRecord {
        order_number: order_number.to_string(),
        order_id: order.order_id,
        case_number: order.case_number.clone(),
        external_order_number: order.external_order_number.clone(),
        uuid: order.uuid.clone(),
        language_id: order.language_id.clone(),
        currency_id: order.currency_id.clone(),
        status_id: order.status_id,
        status: order.status.clone(),
        paid_date: date("paid_date", &order.paid_date),
        tracking_code: order.tracking_code.clone(),
        tracking_url: order.tracking_url.clone(),
        internal_note: order.internal_note.clone(),
        creation_time: date("creation_time", &order.creation_time),
        last_update_time: date("last_update_time", &order.last_update_time),
        order_total: order.order_total,
        invoice_number: order.invoice_number.clone(),
        admin_url: order.admin_url.clone(),
        customer: order.customer.clone(),
        shipment: order.shipment.clone(),
        payment: order.payment.clone(),
    }
}

fn item_records(order: &ApiOrder, order_number: &str) -> Vec<OrderItemRecord> {
    order
        .products
        .iter()
        .filter_map(|item| match &item.uuid {
            Some(uuid) => Some(OrderItemRecord {
                uuid: uuid.clone(),
                product_id: item.product_id,
                code: item.code.clone(),
                ean: item.ean.clone(),
                title: item.title.clone(),
                quantity: item.quantity,
                price_per_unit: item.price_per_unit,
                price: item.price,
                vat: item.vat,
                weight: item.weight,
                availability: item.availability.clone(),
                stock_position: item.stock_position.clone(),
                parameters: item.parameters.clone(),
                image_url: item.image_url.clone(),
            }),
            None => {
                warn!(order_number, code = ?item.code, "order item without uuid, skipping");
                None
            }
        })
        .collect()
}

/// Pull orders page by page and mirror them locally. Without an explicit
/// `creation_time_from` the window defaults to the last day. A failed
/// page fetch fails the whole run; a failure on a single order is logged
/// and the loop moves on.
#[instrument(skip_all)]
pub async fn sync_orders(
    pool: &Pool,
    api: &dyn PlatformApi,
    creation_time_from: Option<&str>,
    status_ids: Option<&str>,
) -> Result<SyncStats> {
    let from = match creation_time_from {
        Some(raw) => raw.to_string(),
        None => (Utc::now() - Duration::days(1))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string(),
    };

    let mut stats = SyncStats::default();
    let mut pager = Paginator::new();
    while let Some(page) = pager.current() {
        let batch = match api.get_orders(page, Some(&from), status_ids).await {
            Ok(batch) => batch,
            Err(e) => {
                pager.abort();
                return Err(e).with_context(|| format!("order page {page} fetch failed"));
            }
        };
        let count = batch.orders.len();
        for order in &batch.orders {
            let Some(order_number) = order.order_number.as_deref() else {
                warn!(order_id = ?order.order_id, "order without order_number, skipping");
                stats.skipped += 1;
                continue;
            };
            let rec = order_record(order, order_number);
            let items = item_records(order, order_number);
            match replace_order_snapshot(pool, &rec, &items).await {
                Ok(_) => stats.synced += 1,
                Err(e) => {
                    warn!(order_number, error = %e, "failed to store order");
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
        "order sync finished"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_and_bare_datetimes_parse() {
        let dt = parse_api_datetime("paid_date", "2026-03-01T10:20:30+01:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T09:20:30+00:00");

        let dt = parse_api_datetime("paid_date", "2026-03-01T10:20:30").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-03-01T10:20:30+00:00");

        assert!(parse_api_datetime("paid_date", "yesterday").is_none());
    }

    #[test]
    fn items_without_uuid_are_dropped() {
        let order = ApiOrder {
            order_number: Some("O1".into()),
            products: vec![
                crate::platform::model::ApiOrderItem {
                    uuid: Some("a".into()),
                    ..Default::default()
                },
                crate::platform::model::ApiOrderItem {
                    uuid: None,
                    code: Some("P1".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let items = item_records(&order, "O1");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uuid, "a");
    }
}
