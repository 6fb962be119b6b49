//! Demo seed fixtures.
//!
//! A small deterministic dataset used on first run and by tests: two users,
//! four orders (two with deliveries), three invoices, two refunds, and two
//! prior conversations. Seeding is idempotent — it is skipped when any user
//! already exists.

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::db::Database;
use crate::error::StoreResult;

// Fixture timestamps (UTC midnight, unix seconds).
const JAN_10_2024: i64 = 1_704_844_800;
const JAN_15_2024: i64 = 1_705_276_800;
const JAN_18_2024: i64 = 1_705_536_000;
const JAN_20_2024: i64 = 1_705_708_800;
const JAN_25_2024: i64 = 1_706_140_800;
const FEB_01_2024: i64 = 1_706_745_600;

/// Seed the demo dataset. Returns `true` when data was written, `false`
/// when the database already had users and seeding was skipped.
pub async fn seed_demo_data(db: &Database) -> StoreResult<bool> {
    let seeded = db
        .execute_mut(|conn| {
            let user_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
            if user_count > 0 {
                return Ok(false);
            }

            let now = Utc::now().timestamp();
            let tx = conn.transaction()?;

            // Users.
            let john = Uuid::now_v7().to_string();
            let jane = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![john, "john.doe@example.com", "John Doe", now],
            )?;
            tx.execute(
                "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![jane, "jane.smith@example.com", "Jane Smith", now],
            )?;

            // Orders and deliveries.
            let order1 = Uuid::now_v7().to_string();
            let order2 = Uuid::now_v7().to_string();
            let order3 = Uuid::now_v7().to_string();
            let order4 = Uuid::now_v7().to_string();

            tx.execute(
                "INSERT INTO orders (id, user_id, order_number, status, total, items, created_at, updated_at) \
                 VALUES (?1, ?2, 'ORD-001', 'DELIVERED', 299.99, ?3, ?4, ?4)",
                rusqlite::params![
                    order1,
                    john,
                    r#"[{"name":"Product A","quantity":2,"price":149.99}]"#,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO deliveries (id, order_id, status, tracking_id, carrier, delivered_at) \
                 VALUES (?1, ?2, 'DELIVERED', 'TRACK-12345', 'UPS', ?3)",
                rusqlite::params![Uuid::now_v7().to_string(), order1, JAN_15_2024],
            )?;

            tx.execute(
                "INSERT INTO orders (id, user_id, order_number, status, total, items, created_at, updated_at) \
                 VALUES (?1, ?2, 'ORD-002', 'SHIPPED', 149.50, ?3, ?4, ?4)",
                rusqlite::params![
                    order2,
                    john,
                    r#"[{"name":"Product B","quantity":1,"price":149.50}]"#,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO deliveries (id, order_id, status, tracking_id, carrier, estimated_delivery) \
                 VALUES (?1, ?2, 'IN_TRANSIT', 'TRACK-67890', 'FedEx', ?3)",
                rusqlite::params![Uuid::now_v7().to_string(), order2, JAN_25_2024],
            )?;

            tx.execute(
                "INSERT INTO orders (id, user_id, order_number, status, total, items, created_at, updated_at) \
                 VALUES (?1, ?2, 'ORD-003', 'PROCESSING', 79.99, ?3, ?4, ?4)",
                rusqlite::params![
                    order3,
                    jane,
                    r#"[{"name":"Product C","quantity":1,"price":79.99}]"#,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO orders (id, user_id, order_number, status, total, items, created_at, updated_at) \
                 VALUES (?1, ?2, 'ORD-004', 'CANCELLED', 199.99, ?3, ?4, ?4)",
                rusqlite::params![
                    order4,
                    jane,
                    r#"[{"name":"Product D","quantity":1,"price":199.99}]"#,
                    now
                ],
            )?;

            // Invoices.
            let invoice1 = Uuid::now_v7().to_string();
            let invoice2 = Uuid::now_v7().to_string();
            let invoice3 = Uuid::now_v7().to_string();

            tx.execute(
                "INSERT INTO invoices (id, user_id, order_id, invoice_number, amount, status, items, paid_at, created_at) \
                 VALUES (?1, ?2, ?3, 'INV-001', 299.99, 'PAID', ?4, ?5, ?6)",
                rusqlite::params![
                    invoice1,
                    john,
                    order1,
                    r#"[{"name":"Product A","quantity":2,"price":149.99}]"#,
                    JAN_10_2024,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO invoices (id, user_id, order_id, invoice_number, amount, status, items, paid_at, created_at) \
                 VALUES (?1, ?2, ?3, 'INV-002', 149.50, 'PAID', ?4, ?5, ?6)",
                rusqlite::params![
                    invoice2,
                    john,
                    order2,
                    r#"[{"name":"Product B","quantity":1,"price":149.50}]"#,
                    JAN_18_2024,
                    now
                ],
            )?;
            tx.execute(
                "INSERT INTO invoices (id, user_id, order_id, invoice_number, amount, status, items, due_date, created_at) \
                 VALUES (?1, ?2, ?3, 'INV-003', 79.99, 'PENDING', ?4, ?5, ?6)",
                rusqlite::params![
                    invoice3,
                    jane,
                    order3,
                    r#"[{"name":"Product C","quantity":1,"price":79.99}]"#,
                    FEB_01_2024,
                    now
                ],
            )?;

            // Refunds (fixed ids so demos can reference them).
            tx.execute(
                "INSERT INTO refunds (id, invoice_id, amount, status, reason, processed_at, created_at) \
                 VALUES ('refund-1', ?1, 149.50, 'COMPLETED', 'Customer request', ?2, ?3)",
                rusqlite::params![invoice2, JAN_20_2024, now],
            )?;
            tx.execute(
                "INSERT INTO refunds (id, invoice_id, amount, status, reason, created_at) \
                 VALUES ('refund-2', ?1, 100.00, 'PROCESSING', 'Partial refund for damaged item', ?2)",
                rusqlite::params![invoice1, now],
            )?;

            // Prior conversations for john.
            let conv1 = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
                 VALUES (?1, ?2, 'Order tracking inquiry', ?3, ?3)",
                rusqlite::params![conv1, john, now],
            )?;
            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, created_at) \
                 VALUES (?1, 'user', 'Where is my order ORD-002?', ?2)",
                rusqlite::params![conv1, now],
            )?;
            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, agent_type, created_at) \
                 VALUES (?1, 'assistant', 'Your order ORD-002 is currently in transit with FedEx. Tracking ID: TRACK-67890. Estimated delivery: January 25, 2024.', 'order', ?2)",
                rusqlite::params![conv1, now],
            )?;

            let conv2 = Uuid::now_v7().to_string();
            tx.execute(
                "INSERT INTO conversations (id, user_id, title, created_at, updated_at) \
                 VALUES (?1, ?2, 'Billing question', ?3, ?3)",
                rusqlite::params![conv2, john, now],
            )?;
            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, created_at) \
                 VALUES (?1, 'user', 'I need a refund for invoice INV-002', ?2)",
                rusqlite::params![conv2, now],
            )?;
            tx.execute(
                "INSERT INTO messages (conversation_id, role, content, agent_type, created_at) \
                 VALUES (?1, 'assistant', 'I can see that you have a refund request for invoice INV-002 in the amount of $149.50. The refund status is COMPLETED and was processed on January 20, 2024.', 'billing', ?2)",
                rusqlite::params![conv2, now],
            )?;

            tx.commit()?;
            Ok(true)
        })
        .await?;

    if seeded {
        info!("demo dataset seeded");
    }
    Ok(seeded)
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();

        assert!(seed_demo_data(&db).await.unwrap());
        assert!(!seed_demo_data(&db).await.unwrap());

        let users: i64 = db
            .execute(|conn| {
                let c: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(users, 2);
    }

    #[tokio::test]
    async fn seeded_dataset_shape() {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        seed_demo_data(&db).await.unwrap();

        let (orders, deliveries, invoices, refunds, conversations): (i64, i64, i64, i64, i64) = db
            .execute(|conn| {
                let q = |sql: &str| conn.query_row(sql, [], |row| row.get(0));
                Ok((
                    q("SELECT COUNT(*) FROM orders")?,
                    q("SELECT COUNT(*) FROM deliveries")?,
                    q("SELECT COUNT(*) FROM invoices")?,
                    q("SELECT COUNT(*) FROM refunds")?,
                    q("SELECT COUNT(*) FROM conversations")?,
                ))
            })
            .await
            .unwrap();

        assert_eq!(orders, 4);
        assert_eq!(deliveries, 2);
        assert_eq!(invoices, 3);
        assert_eq!(refunds, 2);
        assert_eq!(conversations, 2);
    }
}
