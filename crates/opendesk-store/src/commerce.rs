//! Read-only access to commerce records.
//!
//! Orders, deliveries, invoices, and refunds are owned by an external
//! system; the chat core only queries them through the responder tools and
//! never mutates them (the seed fixtures are the one exception, for demos
//! and tests).

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// An order placed by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub user_id: String,
    pub order_number: String,
    pub status: String,
    pub total: f64,
    /// Line items as stored (JSON array).
    pub items: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Shipping record for an order. Each order has at most one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub order_id: String,
    pub status: String,
    pub tracking_id: Option<String>,
    pub carrier: Option<String>,
    pub estimated_delivery: Option<i64>,
    pub delivered_at: Option<i64>,
}

/// An invoice, optionally tied to an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub user_id: String,
    pub order_id: Option<String>,
    pub invoice_number: String,
    pub amount: f64,
    pub status: String,
    pub items: serde_json::Value,
    pub due_date: Option<i64>,
    pub paid_at: Option<i64>,
    pub created_at: i64,
}

/// A refund against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub invoice_id: String,
    pub amount: f64,
    pub status: String,
    pub reason: Option<String>,
    pub processed_at: Option<i64>,
    pub created_at: i64,
}

// ═══════════════════════════════════════════════════════════════════════
//  CommerceStore
// ═══════════════════════════════════════════════════════════════════════

/// Lookup queries over the commerce tables.
#[derive(Clone)]
pub struct CommerceStore {
    db: Database,
}

impl CommerceStore {
    /// Create a new commerce store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Fetch an order by its order number, with its delivery if one exists.
    ///
    /// Returns `None` when the order number is unknown — absence is a data
    /// condition here, not an error.
    #[instrument(skip(self))]
    pub async fn order_by_number(
        &self,
        order_number: &str,
    ) -> StoreResult<Option<(Order, Option<Delivery>)>> {
        let order_number = order_number.to_string();
        self.db
            .execute(move |conn| {
                let order = conn
                    .query_row(
                        "SELECT id, user_id, order_number, status, total, items, created_at, updated_at \
                         FROM orders WHERE order_number = ?1",
                        rusqlite::params![order_number],
                        map_order_row,
                    )
                    .map(Some)
                    .or_else(none_on_no_rows)?;

                let Some(order) = order.transpose()? else {
                    return Ok(None);
                };

                let delivery = conn
                    .query_row(
                        "SELECT id, order_id, status, tracking_id, carrier, estimated_delivery, delivered_at \
                         FROM deliveries WHERE order_id = ?1",
                        rusqlite::params![order.id],
                        map_delivery_row,
                    )
                    .map(Some)
                    .or_else(none_on_no_rows)?;

                Ok(Some((order, delivery)))
            })
            .await
    }

    /// Fetch a delivery by tracking id, along with its order's number.
    #[instrument(skip(self))]
    pub async fn delivery_by_tracking(
        &self,
        tracking_id: &str,
    ) -> StoreResult<Option<(Delivery, String)>> {
        let tracking_id = tracking_id.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT d.id, d.order_id, d.status, d.tracking_id, d.carrier, \
                            d.estimated_delivery, d.delivered_at, o.order_number \
                     FROM deliveries d JOIN orders o ON o.id = d.order_id \
                     WHERE d.tracking_id = ?1",
                    rusqlite::params![tracking_id],
                    |row| {
                        let delivery = map_delivery_row(row)?;
                        let order_number: String = row.get(7)?;
                        Ok((delivery, order_number))
                    },
                );
                match result {
                    Ok(pair) => Ok(Some(pair)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Fetch an invoice by its invoice number, with its refunds.
    ///
    /// When `refund_id` is given, the refund list is filtered to that single
    /// refund; otherwise all refunds for the invoice are returned.
    #[instrument(skip(self))]
    pub async fn invoice_by_number(
        &self,
        invoice_number: &str,
        refund_id: Option<&str>,
    ) -> StoreResult<Option<(Invoice, Vec<Refund>)>> {
        let invoice_number = invoice_number.to_string();
        let refund_id = refund_id.map(|r| r.to_string());
        self.db
            .execute(move |conn| {
                let invoice = conn
                    .query_row(
                        "SELECT id, user_id, order_id, invoice_number, amount, status, items, \
                                due_date, paid_at, created_at \
                         FROM invoices WHERE invoice_number = ?1",
                        rusqlite::params![invoice_number],
                        map_invoice_row,
                    )
                    .map(Some)
                    .or_else(none_on_no_rows)?;

                let Some(invoice) = invoice.transpose()? else {
                    return Ok(None);
                };

                let refunds = match &refund_id {
                    Some(rid) => {
                        let mut stmt = conn.prepare(
                            "SELECT id, invoice_id, amount, status, reason, processed_at, created_at \
                             FROM refunds WHERE invoice_id = ?1 AND id = ?2 ORDER BY created_at ASC",
                        )?;
                        stmt.query_map(rusqlite::params![invoice.id, rid], map_refund_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT id, invoice_id, amount, status, reason, processed_at, created_at \
                             FROM refunds WHERE invoice_id = ?1 ORDER BY created_at ASC",
                        )?;
                        stmt.query_map(rusqlite::params![invoice.id], map_refund_row)?
                            .collect::<Result<Vec<_>, _>>()?
                    }
                };

                Ok(Some((invoice, refunds)))
            })
            .await
    }
}

// ── row mapping ──────────────────────────────────────────────────────

fn none_on_no_rows<T>(e: rusqlite::Error) -> StoreResult<Option<T>> {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Ok(None),
        other => Err(StoreError::Sqlite(other)),
    }
}

fn map_order_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<Order>> {
    let items: String = row.get(5)?;
    let order = Order {
        id: row.get(0)?,
        user_id: row.get(1)?,
        order_number: row.get(2)?,
        status: row.get(3)?,
        total: row.get(4)?,
        items: serde_json::Value::Null,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    };
    Ok(match serde_json::from_str(&items) {
        Ok(parsed) => Ok(Order {
            items: parsed,
            ..order
        }),
        Err(e) => Err(StoreError::Json(e)),
    })
}

fn map_delivery_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Delivery> {
    Ok(Delivery {
        id: row.get(0)?,
        order_id: row.get(1)?,
        status: row.get(2)?,
        tracking_id: row.get(3)?,
        carrier: row.get(4)?,
        estimated_delivery: row.get(5)?,
        delivered_at: row.get(6)?,
    })
}

fn map_invoice_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoreResult<Invoice>> {
    let items: String = row.get(6)?;
    let invoice = Invoice {
        id: row.get(0)?,
        user_id: row.get(1)?,
        order_id: row.get(2)?,
        invoice_number: row.get(3)?,
        amount: row.get(4)?,
        status: row.get(5)?,
        items: serde_json::Value::Null,
        due_date: row.get(7)?,
        paid_at: row.get(8)?,
        created_at: row.get(9)?,
    };
    Ok(match serde_json::from_str(&items) {
        Ok(parsed) => Ok(Invoice {
            items: parsed,
            ..invoice
        }),
        Err(e) => Err(StoreError::Json(e)),
    })
}

fn map_refund_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Refund> {
    Ok(Refund {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        amount: row.get(2)?,
        status: row.get(3)?,
        reason: row.get(4)?,
        processed_at: row.get(5)?,
        created_at: row.get(6)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    async fn seeded_store() -> CommerceStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        seed::seed_demo_data(&db).await.unwrap();
        CommerceStore::new(db)
    }

    #[tokio::test]
    async fn shipped_order_carries_delivery_details() {
        let store = seeded_store().await;

        let (order, delivery) = store.order_by_number("ORD-002").await.unwrap().unwrap();
        assert_eq!(order.status, "SHIPPED");
        assert_eq!(order.total, 149.50);

        let delivery = delivery.unwrap();
        assert_eq!(delivery.tracking_id.as_deref(), Some("TRACK-67890"));
        assert_eq!(delivery.carrier.as_deref(), Some("FedEx"));
        assert_eq!(delivery.status, "IN_TRANSIT");
    }

    #[tokio::test]
    async fn order_without_delivery_returns_none_delivery() {
        let store = seeded_store().await;

        let (order, delivery) = store.order_by_number("ORD-003").await.unwrap().unwrap();
        assert_eq!(order.status, "PROCESSING");
        assert!(delivery.is_none());
    }

    #[tokio::test]
    async fn unknown_order_is_none_not_error() {
        let store = seeded_store().await;
        assert!(store.order_by_number("ORD-999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delivery_lookup_by_tracking_id() {
        let store = seeded_store().await;

        let (delivery, order_number) = store
            .delivery_by_tracking("TRACK-12345")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivery.carrier.as_deref(), Some("UPS"));
        assert_eq!(order_number, "ORD-001");
    }

    #[tokio::test]
    async fn invoice_includes_all_refunds_by_default() {
        let store = seeded_store().await;

        let (invoice, refunds) = store
            .invoice_by_number("INV-002", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(invoice.amount, 149.50);
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].status, "COMPLETED");
    }

    #[tokio::test]
    async fn refund_filter_narrows_to_one() {
        let store = seeded_store().await;

        let (_, refunds) = store
            .invoice_by_number("INV-001", Some("refund-2"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(refunds.len(), 1);
        assert_eq!(refunds[0].id, "refund-2");
        assert_eq!(refunds[0].status, "PROCESSING");

        let (_, filtered_out) = store
            .invoice_by_number("INV-001", Some("refund-1"))
            .await
            .unwrap()
            .unwrap();
        assert!(filtered_out.is_empty());
    }

    #[tokio::test]
    async fn unknown_invoice_is_none_not_error() {
        let store = seeded_store().await;
        assert!(
            store
                .invoice_by_number("INV-999", None)
                .await
                .unwrap()
                .is_none()
        );
    }
}
