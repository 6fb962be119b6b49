//! User persistence.
//!
//! Users are the root of identity: conversations are keyed by canonical
//! user id only. Email is unique; ids are immutable once assigned.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// A chat user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (UUID v7). Immutable once assigned.
    pub id: String,
    /// Unique email address.
    pub email: String,
    /// Display name (derived from the email local part on lazy creation).
    pub name: Option<String>,
    /// Unix timestamp when the user was created.
    pub created_at: i64,
}

/// CRUD operations on users.
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    /// Create a new user store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new user with the given email and optional display name.
    #[instrument(skip(self))]
    pub async fn create(&self, email: &str, name: Option<&str>) -> StoreResult<User> {
        let user = User {
            id: Uuid::now_v7().to_string(),
            email: email.to_string(),
            name: name.map(|n| n.to_string()),
            created_at: Utc::now().timestamp(),
        };

        let row = user.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO users (id, email, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![row.id, row.email, row.name, row.created_at],
                )?;
                Ok(())
            })
            .await?;

        debug!(user_id = %user.id, "user created");
        Ok(user)
    }

    /// Fetch a user by id, failing with `NotFound` if absent.
    #[instrument(skip(self))]
    pub async fn find_by_id(&self, id: &str) -> StoreResult<User> {
        let id = id.to_string();
        self.db
            .execute(move |conn| {
                conn.query_row(
                    "SELECT id, email, name, created_at FROM users WHERE id = ?1",
                    rusqlite::params![id],
                    map_user_row,
                )
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound {
                        entity: "user",
                        id: id.clone(),
                    },
                    other => StoreError::Sqlite(other),
                })
            })
            .await
    }

    /// Fetch a user by email. Returns `None` when no user has that email.
    #[instrument(skip(self))]
    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = email.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT id, email, name, created_at FROM users WHERE email = ?1",
                    rusqlite::params![email],
                    map_user_row,
                );
                match result {
                    Ok(user) => Ok(Some(user)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(StoreError::Sqlite(e)),
                }
            })
            .await
    }

    /// Look a user up by email, creating one lazily when absent.
    ///
    /// The display name of a lazily created user is the email local part
    /// (everything before `@`). Idempotent per email.
    #[instrument(skip(self))]
    pub async fn get_or_create_by_email(&self, email: &str) -> StoreResult<User> {
        if let Some(user) = self.find_by_email(email).await? {
            return Ok(user);
        }
        let local_part = email.split('@').next().unwrap_or(email);
        self.create(email, Some(local_part)).await
    }
}

fn map_user_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: row.get(3)?,
    })
}

// ── tests ────────────────────────────────────────────────────────────
