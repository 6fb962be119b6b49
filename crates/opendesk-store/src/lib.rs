//! # opendesk-store
//!
//! Storage layer for Opendesk.
//!
//! Provides SQLite-backed persistence for the chat domain (users,
//! conversations, messages) and read-only access to the commerce records
//! (orders, deliveries, invoices, refunds) that the responder tools query.
//!
//! All access goes through [`Database`], which wraps a single
//! `rusqlite::Connection` and dispatches work onto the blocking thread pool
//! so async callers never stall the runtime.

pub mod commerce;
pub mod conversations;
pub mod db;
pub mod error;
pub mod migration;
pub mod seed;
pub mod users;

// ── re-exports ───────────────────────────────────────────────────────

pub use commerce::{CommerceStore, Delivery, Invoice, Order, Refund};
pub use conversations::{
    AgentType, Conversation, ConversationPreview, ConversationStore, MessageRole, StoredMessage,
};
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use users::{User, UserStore};
