//! Integration tests for the opendesk-store crate.
//!
//! These tests exercise the full database lifecycle — migrations, chat CRUD,
//! and the seeded commerce fixtures — against a real SQLite database on disk
//! (via tempfile).

use opendesk_store::{
    AgentType, CommerceStore, ConversationStore, Database, MessageRole, UserStore, seed,
};

// ═══════════════════════════════════════════════════════════════════════
//  Database lifecycle
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn database_open_and_migrate_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");

    let db = Database::open_and_migrate(db_path.clone()).await.unwrap();

    // Verify core tables exist by querying them.
    for table in ["users", "conversations", "messages", "orders", "invoices"] {
        let sql = format!("SELECT count(*) FROM {table}");
        let count: i64 = db
            .execute(move |conn| {
                let c: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
                Ok(c)
            })
            .await
            .unwrap();
        assert_eq!(count, 0, "{table} should start empty");
    }

    assert!(db_path.exists());
}

#[tokio::test]
async fn database_open_and_migrate_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test_idempotent.db");

    let db1 = Database::open_and_migrate(db_path.clone()).await.unwrap();
    drop(db1);

    let db2 = Database::open_and_migrate(db_path).await.unwrap();
    db2.ping().await.unwrap();
}

// ═══════════════════════════════════════════════════════════════════════
//  Conversation full lifecycle (on-disk database)
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn conversation_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("test.db"))
        .await
        .unwrap();
    let users = UserStore::new(db.clone());
    let convs = ConversationStore::new(db);

    let user = users
        .get_or_create_by_email("lifecycle@example.com")
        .await
        .unwrap();

    // Create with the opening user message.
    let conv = convs
        .create(&user.id, Some("Where is my order ORD-002?"), "Where is my order ORD-002?")
        .await
        .unwrap();
    assert_eq!(convs.message_count(&conv.id).await.unwrap(), 1);

    // Append the assistant turn.
    convs
        .append_message(
            &conv.id,
            MessageRole::Assistant,
            "It shipped yesterday.",
            Some(AgentType::Order),
            None,
        )
        .await
        .unwrap();

    let messages = convs.messages(&conv.id, None).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, MessageRole::User);
    assert_eq!(messages[1].role, MessageRole::Assistant);
    assert_eq!(messages[1].agent_type, Some(AgentType::Order));

    // Listing shows the preview.
    let previews = convs.list_for_user(&user.id).await.unwrap();
    assert_eq!(previews.len(), 1);
    assert_eq!(previews[0].message_count, 2);

    // Delete cascades.
    convs.delete(&conv.id).await.unwrap();
    assert!(convs.get(&conv.id).await.is_err());
}

// ═══════════════════════════════════════════════════════════════════════
//  Seeded fixtures end to end
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn seeded_commerce_records_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_and_migrate(dir.path().join("seeded.db"))
        .await
        .unwrap();
    seed::seed_demo_data(&db).await.unwrap();

    let users = UserStore::new(db.clone());
    let commerce = CommerceStore::new(db.clone());
    let convs = ConversationStore::new(db);

    let john = users
        .find_by_email("john.doe@example.com")
        .await
        .unwrap()
        .unwrap();

    // Orders belong to the seeded user.
    let (order, delivery) = commerce.order_by_number("ORD-002").await.unwrap().unwrap();
    assert_eq!(order.user_id, john.id);
    assert_eq!(
        delivery.unwrap().tracking_id.as_deref(),
        Some("TRACK-67890")
    );

    // John has two seeded conversations, newest first.
    let previews = convs.list_for_user(&john.id).await.unwrap();
    assert_eq!(previews.len(), 2);

    // The support tool's history query returns both with messages in
    // chronological order.
    let history = convs.recent_history(&john.id, 10).await.unwrap();
    assert_eq!(history.len(), 2);
    for (_, messages) in &history {
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
    }
}
