//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The current version is tracked in a `_migrations` table so migrations
//! are idempotent and only run once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "chat schema — users, conversations, messages",
        sql: r#"
            CREATE TABLE users (
                id         TEXT PRIMARY KEY,
                email      TEXT NOT NULL UNIQUE,
                name       TEXT,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE conversations (
                id         TEXT PRIMARY KEY,
                user_id    TEXT NOT NULL REFERENCES users(id),
                title      TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX idx_conversations_user ON conversations(user_id);

            CREATE TABLE messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL CHECK(role IN ('user','assistant','system')),
                content         TEXT NOT NULL,
                agent_type      TEXT CHECK(agent_type IN ('router','support','order','billing')),
                metadata        TEXT,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX idx_messages_conversation ON messages(conversation_id);
        "#,
    },
    Migration {
        version: 2,
        description: "commerce schema — orders, deliveries, invoices, refunds",
        sql: r#"
            CREATE TABLE orders (
                id           TEXT PRIMARY KEY,
                user_id      TEXT NOT NULL REFERENCES users(id),
                order_number TEXT NOT NULL UNIQUE,
                status       TEXT NOT NULL CHECK(status IN ('PENDING','PROCESSING','SHIPPED','DELIVERED','CANCELLED','REFUNDED')),
                total        REAL NOT NULL,
                items        TEXT NOT NULL,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_orders_user ON orders(user_id);

            CREATE TABLE deliveries (
                id                 TEXT PRIMARY KEY,
                order_id           TEXT NOT NULL UNIQUE REFERENCES orders(id) ON DELETE CASCADE,
                status             TEXT NOT NULL CHECK(status IN ('PENDING','IN_TRANSIT','OUT_FOR_DELIVERY','DELIVERED','FAILED')),
                tracking_id        TEXT UNIQUE,
                carrier            TEXT,
                estimated_delivery INTEGER,
                delivered_at       INTEGER
            );

            CREATE TABLE invoices (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL REFERENCES users(id),
                order_id       TEXT REFERENCES orders(id),
                invoice_number TEXT NOT NULL UNIQUE,
                amount         REAL NOT NULL,
                status         TEXT NOT NULL CHECK(status IN ('PENDING','PAID','OVERDUE','CANCELLED')),
                items          TEXT NOT NULL,
                due_date       INTEGER,
                paid_at        INTEGER,
                created_at     INTEGER NOT NULL
            );
            CREATE INDEX idx_invoices_user ON invoices(user_id);

            CREATE TABLE refunds (
                id           TEXT PRIMARY KEY,
                invoice_id   TEXT NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
                amount       REAL NOT NULL,
                status       TEXT NOT NULL CHECK(status IN ('PENDING','PROCESSING','COMPLETED','REJECTED')),
                reason       TEXT,
                processed_at INTEGER,
                created_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_refunds_invoice ON refunds(invoice_id);
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

// ── internals ────────────────────────────────────────────────────────

/// Create the `_migrations` bookkeeping table if it does not exist.
fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })?;
    Ok(())
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to begin transaction: {e}"),
        })?;

    let result = (|| -> StoreResult<()> {
        conn.execute_batch(migration.sql)
            .map_err(|e| StoreError::Migration {
                version: migration.version,
                message: format!("SQL execution failed: {e}"),
            })?;

        let now = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.description, now],
        )
        .map_err(|e| StoreError::Migration {
            version: migration.version,
            message: format!("failed to record migration: {e}"),
        })?;

        Ok(())
    })();

    match &result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| StoreError::Migration {
                    version: migration.version,
                    message: format!("failed to commit: {e}"),
                })?;
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
        }
    }

    result
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// The expected latest migration version (update when adding migrations).
    const LATEST_VERSION: u32 = 2;

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "foreign_keys", "ON").unwrap();
        conn
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[1].version > window[0].version,
                "migration versions must be strictly increasing: {} >= {}",
                window[0].version,
                window[1].version,
            );
        }
    }

    #[test]
    fn run_all_on_fresh_db() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        let version = current_version(&conn).unwrap();
        assert_eq!(version, LATEST_VERSION);
    }

    #[test]
    fn run_all_is_idempotent() {
        let conn = setup_conn();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let version = current_version(&conn).unwrap();
        assert_eq!(version, LATEST_VERSION);
    }

    #[test]
    fn message_role_check_constraint_enforced() {
        let conn = setup_conn();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO users (id, email, created_at) VALUES ('u1', 'a@b.c', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO conversations (id, user_id, created_at, updated_at) VALUES ('c1', 'u1', 0, 0)",
            [],
        )
        .unwrap();

        let err = conn.execute(
            "INSERT INTO messages (conversation_id, role, content, created_at) VALUES ('c1', 'robot', 'x', 0)",
            [],
        );
        assert!(err.is_err());
    }
}
