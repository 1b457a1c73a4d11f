use super::Pool;
use crate::model::{Order, OrderItem};
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::instrument;

/// Order snapshot from the platform API. `fulfillment_status` is owned
/// locally and is deliberately absent here.
#[derive(Debug, Clone, Default)]
pub struct OrderRecord {
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
}

#[derive(Debug, Clone, Default)]
pub struct OrderItemRecord {
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
}

/// Write one order and its authoritative item list in a single
/// transaction: upsert the order row, delete items whose uuid is absent
/// from the payload, upsert the rest. Returns the order row id.
#[instrument(skip_all, fields(order_number = %rec.order_number))]
pub async fn replace_order_snapshot(
    pool: &Pool,
    rec: &OrderRecord,
    items: &[OrderItemRecord],
) -> Result<i64> {
    let now = Utc::now();
    let customer = rec.customer.as_ref().map(serde_json::to_string).transpose()?;
    let shipment = rec.shipment.as_ref().map(serde_json::to_string).transpose()?;
    let payment = rec.payment.as_ref().map(serde_json::to_string).transpose()?;

    let mut tx = pool.begin().await?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT id FROM orders WHERE order_number = ?")
        .bind(&rec.order_number)
        .fetch_optional(&mut *tx)
        .await?;
    let order_row_id = match existing {
        Some(id) => {
            sqlx::query(
                "UPDATE orders SET order_id = ?, case_number = ?, external_order_number = ?, \
                 uuid = ?, language_id = ?, currency_id = ?, status_id = ?, status = ?, \
                 paid_date = ?, tracking_code = ?, tracking_url = ?, internal_note = ?, \
                 creation_time = ?, last_update_time = ?, order_total = ?, invoice_number = ?, \
                 admin_url = ?, customer = ?, shipment = ?, payment = ?, updated_at = ? \
                 WHERE id = ?",
            )
            .bind(rec.order_id)
            .bind(&rec.case_number)
            .bind(&rec.external_order_number)
            .bind(&rec.uuid)
            .bind(&rec.language_id)
            .bind(&rec.currency_id)
            .bind(rec.status_id)
            .bind(&rec.status)
            .bind(rec.paid_date)
            .bind(&rec.tracking_code)
            .bind(&rec.tracking_url)
            .bind(&rec.internal_note)
            .bind(rec.creation_time)
            .bind(rec.last_update_time)
            .bind(rec.order_total)
            .bind(&rec.invoice_number)
            .bind(&rec.admin_url)
            .bind(&customer)
            .bind(&shipment)
            .bind(&payment)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            id
        }
        None => sqlx::query(
            "INSERT INTO orders (order_number, order_id, case_number, external_order_number, \
             uuid, language_id, currency_id, status_id, status, paid_date, tracking_code, \
             tracking_url, internal_note, creation_time, last_update_time, order_total, \
             invoice_number, admin_url, customer, shipment, payment, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             RETURNING id",
        )
        .bind(&rec.order_number)
        .bind(rec.order_id)
        .bind(&rec.case_number)
        .bind(&rec.external_order_number)
        .bind(&rec.uuid)
        .bind(&rec.language_id)
        .bind(&rec.currency_id)
        .bind(rec.status_id)
        .bind(&rec.status)
        .bind(rec.paid_date)
        .bind(&rec.tracking_code)
        .bind(&rec.tracking_url)
        .bind(&rec.internal_note)
        .bind(rec.creation_time)
        .bind(rec.last_update_time)
        .bind(rec.order_total)
        .bind(&rec.invoice_number)
        .bind(&rec.admin_url)
        .bind(&customer)
        .bind(&shipment)
        .bind(&payment)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?
        .get("id"),
    };

    // The payload is the authoritative item list: anything stored under
    // this order with a uuid not in it is gone upstream.
    let stored: Vec<String> = sqlx::query_scalar("SELECT uuid FROM order_items WHERE order_id = ?")
        .bind(order_row_id)
        .fetch_all(&mut *tx)
        .await?;
    for uuid in stored
        .iter()
        .filter(|u| !items.iter().any(|i| &i.uuid == *u))
    {
        sqlx::query("DELETE FROM order_items WHERE order_id = ? AND uuid = ?")
            .bind(order_row_id)
            .bind(uuid)
            .execute(&mut *tx)
            .await?;
    }

    for item in items {
        let parameters = item
            .parameters
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let res = sqlx::query(
            "UPDATE order_items SET product_id = ?, code = ?, ean = ?, title = ?, quantity = ?, \
             price_per_unit = ?, price = ?, vat = ?, weight = ?, availability = ?, \
             stock_position = ?, parameters = ?, image_url = ?, updated_at = ? \
             WHERE order_id = ? AND uuid = ?",
        )
        .bind(item.product_id)
        .bind(&item.code)
        .bind(&item.ean)
        .bind(&item.title)
        .bind(item.quantity)
        .bind(item.price_per_unit)
        .bind(item.price)
        .bind(item.vat)
        .bind(item.weight)
        .bind(&item.availability)
        .bind(&item.stock_position)
        .bind(&parameters)
        .bind(&item.image_url)
        .bind(now)
        .bind(order_row_id)
        .bind(&item.uuid)
        .execute(&mut *tx)
        .await?;
        if res.rows_affected() == 0 {
            sqlx::query(
                "INSERT INTO order_items (order_id, uuid, product_id, code, ean, title, quantity, \
                 price_per_unit, price, vat, weight, availability, stock_position, parameters, \
                 image_url, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(order_row_id)
            .bind(&item.uuid)
            .bind(item.product_id)
            .bind(&item.code)
            .bind(&item.ean)
            .bind(&item.title)
            .bind(item.quantity)
            .bind(item.price_per_unit)
            .bind(item.price)
            .bind(item.vat)
            .bind(item.weight)
            .bind(&item.availability)
            .bind(&item.stock_position)
            .bind(&parameters)
            .bind(&item.image_url)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(order_row_id)
}

pub async fn get_order_by_number(pool: &Pool, order_number: &str) -> Result<Option<Order>> {
    let row = sqlx::query("SELECT * FROM orders WHERE order_number = ?")
        .bind(order_number)
        .fetch_optional(pool)
        .await?;
    row.map(order_from_row).transpose()
}

pub async fn items_for_order(pool: &Pool, order_row_id: i64) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query("SELECT * FROM order_items WHERE order_id = ? ORDER BY id ASC")
        .bind(order_row_id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(item_from_row).collect()
}

fn order_from_row(row: SqliteRow) -> Result<Order> {
    let json = |col: &str| -> Result<Option<serde_json::Value>> {
        let raw: Option<String> = row.get(col);
        Ok(raw.map(|r| serde_json::from_str(&r)).transpose()?)
    };
    Ok(Order {
        id: row.get("id"),
        order_number: row.get("order_number"),
        order_id: row.get("order_id"),
        case_number: row.get("case_number"),
        external_order_number: row.get("external_order_number"),
        uuid: row.get("uuid"),
        language_id: row.get("language_id"),
        currency_id: row.get("currency_id"),
        status_id: row.get("status_id"),
        status: row.get("status"),
        paid_date: row.get("paid_date"),
        tracking_code: row.get("tracking_code"),
        tracking_url: row.get("tracking_url"),
        internal_note: row.get("internal_note"),
        creation_time: row.get("creation_time"),
        last_update_time: row.get("last_update_time"),
        order_total: row.get("order_total"),
        invoice_number: row.get("invoice_number"),
        admin_url: row.get("admin_url"),
        customer: json("customer")?,
        shipment: json("shipment")?,
        payment: json("payment")?,
        fulfillment_status: row.get("fulfillment_status"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

fn item_from_row(row: SqliteRow) -> Result<OrderItem> {
    let parameters: Option<String> = row.get("parameters");
    Ok(OrderItem {
        id: row.get("id"),
        order_id: row.get("order_id"),
        uuid: row.get("uuid"),
        product_id: row.get("product_id"),
        code: row.get("code"),
        ean: row.get("ean"),
        title: row.get("title"),
        quantity: row.get("quantity"),
        price_per_unit: row.get("price_per_unit"),
        price: row.get("price"),
        vat: row.get("vat"),
        weight: row.get("weight"),
        availability: row.get("availability"),
        stock_position: row.get("stock_position"),
        parameters: parameters.map(|p| serde_json::from_str(&p)).transpose()?,
        image_url: row.get("image_url"),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    fn order(number: &str) -> OrderRecord {
        OrderRecord {
            order_number: number.into(),
            status: Some("New".into()),
            order_total: Some(125.5),
            ..Default::default()
        }
    }

    fn item(uuid: &str, quantity: f64) -> OrderItemRecord {
        OrderItemRecord {
            uuid: uuid.into(),
            code: Some("P1".into()),
            quantity: Some(quantity),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn snapshot_creates_then_updates() {
        let pool = test_pool().await;
        let id = replace_order_snapshot(&pool, &order("O1"), &[item("a", 1.0)])
            .await
            .unwrap();

        let mut rec = order("O1");
        rec.status = Some("Shipped".into());
        let id2 = replace_order_snapshot(&pool, &rec, &[item("a", 2.0)])
            .await
            .unwrap();
        assert_eq!(id, id2);

        let stored = get_order_by_number(&pool, "O1").await.unwrap().unwrap();
        assert_eq!(stored.status.as_deref(), Some("Shipped"));
        let items = items_for_order(&pool, id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, Some(2.0));
    }

    #[tokio::test]
    async fn snapshot_preserves_fulfillment_status() {
        let pool = test_pool().await;
        let id = replace_order_snapshot(&pool, &order("O1"), &[])
            .await
            .unwrap();
        sqlx::query("UPDATE orders SET fulfillment_status = 'completed' WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await
            .unwrap();

        replace_order_snapshot(&pool, &order("O1"), &[])
            .await
            .unwrap();
        let stored = get_order_by_number(&pool, "O1").await.unwrap().unwrap();
        assert_eq!(stored.fulfillment_status, "completed");
    }

    #[tokio::test]
    async fn items_absent_from_payload_are_deleted() {
        let pool = test_pool().await;
        let id = replace_order_snapshot(&pool, &order("O1"), &[item("a", 1.0), item("b", 1.0)])
            .await
            .unwrap();

        replace_order_snapshot(&pool, &order("O1"), &[item("b", 3.0)])
            .await
            .unwrap();
        let items = items_for_order(&pool, id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].uuid, "b");
        assert_eq!(items[0].quantity, Some(3.0));
    }

    #[tokio::test]
    async fn customer_json_round_trips() {
        let pool = test_pool().await;
        let mut rec = order("O1");
        rec.customer = Some(serde_json::json!({"name": "Jana", "city": "Brno"}));
        replace_order_snapshot(&pool, &rec, &[]).await.unwrap();

        let stored = get_order_by_number(&pool, "O1").await.unwrap().unwrap();
        assert_eq!(stored.customer.unwrap()["city"], "Brno");
    }
}
